//! GitHub App authentication
//!
//! The credential broker: turns the app's standing identity into either an
//! app JWT (application mode) or an installation access token
//! (installation mode).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient, JwtSigner};

use super::{api_headers, error_text};

/// Lifetime of an app JWT, in seconds past `now`
const APP_JWT_TTL_SECS: i64 = 600;

/// Backdate of `iat` to tolerate clock drift against GitHub
const APP_JWT_BACKDATE_SECS: i64 = 60;

/// GitHub installation identifier
pub type InstallationId = u64;

/// The relay's standing GitHub App identity
#[derive(Clone)]
pub struct AppIdentity {
    pub app_id: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AppIdentity {
    /// JWT issuer: the client ID when configured, else the app ID
    pub fn issuer(&self) -> &str {
        self.client_id.as_deref().unwrap_or(&self.app_id)
    }
}

impl fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("private_key", &"<redacted>")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// GitHub App JWT claims
#[derive(Serialize, Deserialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Installation token response from GitHub
#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// JWT signer that uses a local PEM private key
pub struct PemJwtSigner {
    pub issuer: String,
    pub pem_key: String,
}

impl PemJwtSigner {
    pub fn from_identity(identity: &AppIdentity) -> Self {
        Self {
            issuer: identity.issuer().to_string(),
            pem_key: identity.private_key.clone(),
        }
    }
}

#[async_trait(?Send)]
impl JwtSigner for PemJwtSigner {
    async fn sign_app_jwt(&self, now_secs: i64) -> Result<String> {
        use surrealdb_jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        let claims = AppJwtClaims {
            iat: now_secs - APP_JWT_BACKDATE_SECS,
            exp: now_secs + APP_JWT_TTL_SECS,
            iss: self.issuer.clone(),
        };

        let key = EncodingKey::from_rsa_pem(self.pem_key.as_bytes())
            .map_err(|e| ApiError::signing(format!("invalid private key: {}", e)))?;

        let header = Header::new(Algorithm::RS256);

        encode(&header, &claims, &key)
            .map_err(|e| ApiError::signing(format!("failed to encode JWT: {}", e)))
    }
}

/// Which identity a credential represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// The app itself; only good for app-level lookups
    App,
    /// A specific installation; good for tenant-scoped actions
    Installation(InstallationId),
}

/// A bearer credential, valid until `expires_at`
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub mode: CredentialMode,
}

impl IssuedCredential {
    /// `Authorization` header value
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Issues bearer credentials for the relay
#[async_trait(?Send)]
pub trait CredentialBroker {
    async fn issue(&self, mode: CredentialMode) -> Result<IssuedCredential>;
}

/// Broker backed by the GitHub App signing key
///
/// Holds no state of its own: every call signs a fresh JWT and, in
/// installation mode, performs a fresh token exchange.
pub struct AppCredentialBroker<'a> {
    signer: &'a dyn JwtSigner,
    http: &'a dyn HttpClient,
    clock: &'a dyn Clock,
    api_base: &'a str,
}

impl<'a> AppCredentialBroker<'a> {
    pub fn new(
        signer: &'a dyn JwtSigner,
        http: &'a dyn HttpClient,
        clock: &'a dyn Clock,
        api_base: &'a str,
    ) -> Self {
        Self {
            signer,
            http,
            clock,
            api_base,
        }
    }

    async fn app_credential(&self) -> Result<IssuedCredential> {
        let now = self.clock.now_secs() as i64;
        let token = self.signer.sign_app_jwt(now).await?;
        let expires_at = DateTime::<Utc>::from_timestamp(now + APP_JWT_TTL_SECS, 0)
            .ok_or_else(|| ApiError::internal("app JWT expiry out of range"))?;

        Ok(IssuedCredential {
            token,
            expires_at,
            mode: CredentialMode::App,
        })
    }
}

#[async_trait(?Send)]
impl CredentialBroker for AppCredentialBroker<'_> {
    async fn issue(&self, mode: CredentialMode) -> Result<IssuedCredential> {
        match mode {
            CredentialMode::App => {
                debug!("issuing app credential");
                self.app_credential().await
            }
            CredentialMode::Installation(installation_id) => {
                debug!(installation_id, "issuing installation credential");
                let app = self.app_credential().await?;
                create_installation_token(installation_id, &app, self.http, self.api_base).await
            }
        }
    }
}

/// Exchange an app credential for an installation access token
async fn create_installation_token(
    installation_id: InstallationId,
    app: &IssuedCredential,
    http: &dyn HttpClient,
    api_base: &str,
) -> Result<IssuedCredential> {
    let url = format!(
        "{}/app/installations/{}/access_tokens",
        api_base, installation_id
    );

    let authorization = app.authorization();
    let headers = api_headers(&authorization);

    let response = http.post(&url, &headers, &[]).await?;

    if response.status != 201 {
        return Err(ApiError::upstream(
            response.status,
            format!(
                "installation token exchange failed: {}",
                error_text(&response)
            ),
        ));
    }

    let token_response: InstallationTokenResponse = response.json().map_err(|e| {
        ApiError::internal(format!("failed to parse installation token response: {}", e))
    })?;

    Ok(IssuedCredential {
        token: token_response.token,
        expires_at: token_response.expires_at,
        mode: CredentialMode::Installation(installation_id),
    })
}
