//! GitHub API client
//!
//! The three REST calls the relay makes: installation lookup, commit fetch
//! and check-run creation.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::platform::HttpClient;

use super::auth::{InstallationId, IssuedCredential};
use super::{api_headers, error_text, json_headers};

/// A git commit as returned by the git database API
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Commit {
    pub sha: String,
}

/// GitHub REST client bound to an API base URL
pub struct GitHubApi<'a> {
    http: &'a dyn HttpClient,
    api_base: &'a str,
}

impl<'a> GitHubApi<'a> {
    pub fn new(http: &'a dyn HttpClient, api_base: &'a str) -> Self {
        Self { http, api_base }
    }

    /// Find the installation that owns a repository (needs an app credential)
    pub async fn get_repo_installation(
        &self,
        owner: &str,
        repo: &str,
        credential: &IssuedCredential,
    ) -> Result<InstallationId> {
        let url = format!("{}/repos/{}/{}/installation", self.api_base, owner, repo);
        let authorization = credential.authorization();

        let response = self.http.get(&url, &api_headers(&authorization)).await?;

        if response.status != 200 {
            return Err(ApiError::upstream(
                response.status,
                format!(
                    "installation lookup for {}/{} failed: {}",
                    owner,
                    repo,
                    error_text(&response)
                ),
            ));
        }

        #[derive(Deserialize)]
        struct InstallationResponse {
            id: InstallationId,
        }

        let installation: InstallationResponse = response.json().map_err(|e| {
            ApiError::internal(format!("failed to parse installation response: {}", e))
        })?;

        Ok(installation.id)
    }

    /// Fetch a commit by SHA; `None` when GitHub does not know it
    pub async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        credential: &IssuedCredential,
    ) -> Result<Option<Commit>> {
        let url = format!(
            "{}/repos/{}/{}/git/commits/{}",
            self.api_base, owner, repo, sha
        );
        let authorization = credential.authorization();

        let response = self.http.get(&url, &api_headers(&authorization)).await?;

        match response.status {
            200 => response
                .json()
                .map(Some)
                .map_err(|e| ApiError::internal(format!("failed to parse commit: {}", e))),
            404 | 422 => Ok(None),
            status => Err(ApiError::upstream(
                status,
                format!("commit lookup failed: {}", error_text(&response)),
            )),
        }
    }

    /// Create a check run; returns the upstream status on success
    pub async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        payload: &Value,
        credential: &IssuedCredential,
    ) -> Result<u16> {
        let url = format!("{}/repos/{}/{}/check-runs", self.api_base, owner, repo);
        let authorization = credential.authorization();

        let body = serde_json::to_vec(payload)
            .map_err(|e| ApiError::internal(format!("failed to encode check run: {}", e)))?;

        let response = self
            .http
            .post(&url, &json_headers(&authorization), &body)
            .await?;

        if !response.is_success() {
            return Err(ApiError::upstream(
                response.status,
                format!("failed to create check run: {}", error_text(&response)),
            ));
        }

        Ok(response.status)
    }
}
