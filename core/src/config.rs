//! Configuration loaded once at startup

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::allow_list::AllowList;
use crate::error::{ApiError, Result};
use crate::github::auth::AppIdentity;
use crate::github::GITHUB_API_BASE;
use crate::platform::Environment;

/// Port used when `PORT` is not set
pub const DEFAULT_PORT: u16 = 3000;

/// Immutable relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub App identity used for every credential exchange
    pub identity: AppIdentity,
    /// Callers permitted to reach the check-run endpoint
    pub allow_list: AllowList,
    /// Peers whose `X-Real-IP` header is honoured; `None` honours any peer
    pub trusted_proxies: Option<AllowList>,
    /// Listen port
    pub port: u16,
    /// GitHub REST API base URL, without trailing slash
    pub api_base: String,
    /// Outbound request timeout; `None` waits indefinitely
    pub upstream_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the platform environment
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let app_id = required(env, "APP_ID")?;
        let private_key = decode_private_key(&required(env, "PRIVATE_KEY")?)?;
        let allow_list = AllowList::parse(&required(env, "IP_ALLOW_LIST")?)?;
        let trusted_proxies = optional(env, "TRUSTED_PROXIES")
            .map(|raw| AllowList::parse(&raw))
            .transpose()?;

        let port = match optional(env, "PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ApiError::config(format!("PORT must be a number, got '{}'", raw)))?,
            None => DEFAULT_PORT,
        };

        let upstream_timeout_secs = optional(env, "UPSTREAM_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    ApiError::config(format!("UPSTREAM_TIMEOUT_SECS must be a number, got '{}'", raw))
                })
            })
            .transpose()?;

        let api_base = optional(env, "GITHUB_API_URL")
            .unwrap_or_else(|| GITHUB_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            identity: AppIdentity {
                app_id,
                private_key,
                client_id: optional(env, "CLIENT_ID"),
                client_secret: optional(env, "CLIENT_SECRET"),
            },
            allow_list,
            trusted_proxies,
            port,
            api_base,
            upstream_timeout_secs,
        })
    }
}

/// Empty values count as unset
fn optional(env: &dyn Environment, name: &str) -> Option<String> {
    env.get_var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(env: &dyn Environment, name: &str) -> Result<String> {
    optional(env, name).ok_or_else(|| ApiError::config(format!("{} not configured", name)))
}

/// Decode the base64-wrapped PEM key; line breaks in the encoded value are ignored
pub fn decode_private_key(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| ApiError::config(format!("PRIVATE_KEY is not valid base64: {}", e)))?;

    String::from_utf8(bytes).map_err(|_| ApiError::config("PRIVATE_KEY is not valid UTF-8"))
}
