//! Platform abstraction traits
//!
//! These traits define the boundary between the relay core and the server
//! that hosts it (outbound HTTP, wall clock, environment, JWT signing).

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// HTTP client for outbound requests to the GitHub API
#[async_trait(?Send)]
pub trait HttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;
    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse>;
}

/// HTTP response from an outbound request
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Parse body as UTF-8 string
    pub fn text(&self) -> std::result::Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Parse body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Clock for current time (enables testing with deterministic timestamps)
pub trait Clock {
    fn now_secs(&self) -> u64;
}

/// Environment access
pub trait Environment {
    fn get_var(&self, name: &str) -> Result<String>;
}

/// Signs GitHub App JWTs
#[async_trait(?Send)]
pub trait JwtSigner {
    async fn sign_app_jwt(&self, now_secs: i64) -> Result<String>;
}
