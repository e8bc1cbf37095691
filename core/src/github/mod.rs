//! GitHub API module
//!
//! App authentication (the credential broker) and the REST calls the relay
//! makes on a tenant's behalf.

pub mod api;
pub mod auth;

/// Default GitHub REST API base URL
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = "check-relay";
const API_VERSION: &str = "2022-11-28";

/// Standard request headers for an authenticated GitHub API call
fn api_headers(authorization: &str) -> [(&str, &str); 4] {
    [
        ("Authorization", authorization),
        ("Accept", "application/vnd.github+json"),
        ("User-Agent", USER_AGENT),
        ("X-GitHub-Api-Version", API_VERSION),
    ]
}

/// Headers for a call that sends a JSON body
fn json_headers(authorization: &str) -> [(&str, &str); 5] {
    let [a, b, c, d] = api_headers(authorization);
    [a, b, c, d, ("Content-Type", "application/json")]
}

/// Best-effort upstream error text for logs and error bodies
fn error_text(response: &crate::platform::HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "unknown error".to_string())
}
