//! Server platform implementations
//!
//! Implements core platform traits using native Rust libraries:
//! - HttpClient: reqwest
//! - Clock: std::time::SystemTime
//! - Environment: std::env

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use check_relay_core::error::{ApiError, Result};
use check_relay_core::platform::{Clock, Environment, HttpClient, HttpResponse};

/// reqwest-based HTTP client
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        mut builder: reqwest::RequestBuilder,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::UpstreamTimeout
    } else {
        ApiError::transport(err.to_string())
    }
}

#[async_trait(?Send)]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse> {
        self.send(self.client.post(url).body(body.to_vec()), headers)
            .await
    }
}

/// System clock using std::time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Process environment
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get_var(&self, name: &str) -> Result<String> {
        std::env::var(name)
            .map_err(|_| ApiError::config(format!("environment variable '{}' not set", name)))
    }
}
