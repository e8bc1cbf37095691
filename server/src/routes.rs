//! Request routing

use hyper::Method;
use percent_encoding::percent_decode_str;

use check_relay_core::relay::check_run::RepoPath;

/// What an inbound request is asking for
#[derive(Debug, PartialEq)]
pub enum Route {
    Health,
    Webhook,
    CheckRuns(RepoPath),
    NotFound,
}

/// Match method and path; trailing slashes are ignored
///
/// Segments are percent-decoded after splitting, so an encoded `/` stays
/// inside its segment. A segment that does not decode to UTF-8 matches nothing.
pub fn resolve(method: &Method, path: &str) -> Route {
    let segments: Option<Vec<String>> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8().ok().map(|s| s.into_owned()))
        .collect();
    let Some(segments) = segments else {
        return Route::NotFound;
    };
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (method, segments.as_slice()) {
        (&Method::GET, []) => Route::Health,
        (&Method::POST, ["webhook"]) => Route::Webhook,
        (&Method::POST, ["repos", owner, repo, "check-runs"]) => {
            Route::CheckRuns(RepoPath::new(*owner, *repo))
        }
        _ => Route::NotFound,
    }
}
