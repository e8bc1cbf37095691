//! Check-run relay
//!
//! Validates a create-check-run request against its URL, resolves the
//! repository's installation, acts as that installation to confirm the commit
//! exists, then creates the check run and relays GitHub's status.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ApiError, Result};
use crate::github::api::GitHubApi;
use crate::github::auth::{CredentialBroker, CredentialMode};

/// Longest accepted commit reference (a full SHA-1)
const MAX_SHA_LEN: usize = 40;

/// Shortest abbreviated SHA git will resolve
const MIN_SHA_LEN: usize = 4;

/// Inbound create-check-run payload
///
/// `owner` and `repo` must match the URL. Everything else except those two is
/// forwarded to GitHub untouched.
#[derive(Deserialize, Debug, Clone)]
pub struct CheckRunRequest {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CheckRunRequest {
    /// Body for GitHub's create-check-run call
    pub fn upstream_payload(&self) -> Value {
        let mut body = self.fields.clone();
        if let Some(sha) = &self.head_sha {
            body.insert("head_sha".to_string(), Value::String(sha.clone()));
        }
        Value::Object(body)
    }
}

/// Owner and repository taken from the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    pub owner: String,
    pub repo: String,
}

impl RepoPath {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

/// Handle a create-check-run request; returns the status GitHub answered with
pub async fn handle(
    request: &CheckRunRequest,
    path: &RepoPath,
    broker: &dyn CredentialBroker,
    github: &GitHubApi<'_>,
) -> Result<u16> {
    // 1. Validate locally before any credential is issued
    let head_sha = validate(request, path)?;
    let (owner, repo) = (path.owner.as_str(), path.repo.as_str());

    // 2. Resolve the installation that owns the repository
    let app_credential = broker.issue(CredentialMode::App).await?;
    let installation_id = github
        .get_repo_installation(owner, repo, &app_credential)
        .await?;

    // 3. Act as that installation
    let acting = broker
        .issue(CredentialMode::Installation(installation_id))
        .await?;

    // 4. The commit must exist before anything is created against it
    if github.get_commit(owner, repo, head_sha, &acting).await?.is_none() {
        warn!(owner, repo, head_sha, "commit not found");
        return Err(ApiError::invalid_request("invalid commit SHA"));
    }

    // 5. Create the check run and relay GitHub's status as-is
    let status = github
        .create_check_run(owner, repo, &request.upstream_payload(), &acting)
        .await?;

    info!(owner, repo, head_sha, installation_id, status, "check run created");
    Ok(status)
}

/// Local checks; returns the commit reference on success
fn validate<'r>(request: &'r CheckRunRequest, path: &RepoPath) -> Result<&'r str> {
    if request.owner != path.owner || request.repo != path.repo {
        warn!(
            path_owner = %path.owner,
            path_repo = %path.repo,
            body_owner = %request.owner,
            body_repo = %request.repo,
            "owner or repo mismatch"
        );
        return Err(ApiError::invalid_request("invalid owner or repo"));
    }

    if !is_valid_name(&path.owner) || !is_valid_name(&path.repo) {
        warn!(owner = %path.owner, repo = %path.repo, "malformed owner or repo");
        return Err(ApiError::invalid_request("invalid owner or repo"));
    }

    let head_sha = request
        .head_sha
        .as_deref()
        .filter(|sha| !sha.is_empty())
        .ok_or_else(|| {
            warn!("missing head_sha");
            ApiError::invalid_request("missing commit SHA")
        })?;

    if !is_valid_sha(head_sha) {
        warn!(head_sha, "malformed head_sha");
        return Err(ApiError::invalid_request("invalid commit SHA"));
    }

    Ok(head_sha)
}

/// GitHub account and repository names: ASCII alphanumerics, `-`, `_`, `.`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_valid_sha(sha: &str) -> bool {
    (MIN_SHA_LEN..=MAX_SHA_LEN).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}
