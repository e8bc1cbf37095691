//! Error types and HTTP status mapping

use serde::Serialize;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Relay error
///
/// Variants that carry an HTTP status are relayed to the caller as-is. The
/// rest have no status of their own and go through the generic error path.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("upstream timeout")]
    UpstreamTimeout,

    #[error("signing failed: {message}")]
    Signing { message: String },

    #[error("upstream request failed: {message}")]
    Transport { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status to relay, or `None` when the error carries no status
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::InvalidRequest { .. } => Some(400),
            Self::AccessDenied { .. } => Some(403),
            Self::PayloadTooLarge => Some(413),
            Self::Upstream { status, .. } => Some(*status),
            Self::UpstreamTimeout => Some(504),
            Self::Signing { .. }
            | Self::Transport { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => None,
        }
    }

    /// Get the error key for this error
    pub fn error_key(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Upstream { .. } => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::Signing { .. } => "signing_error",
            Self::Transport { .. } => "transport_error",
            Self::Config { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Error response body
#[derive(Serialize, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    /// Body for errors without a status; details stay in the logs
    pub fn unclassified() -> Self {
        Self {
            error: "internal_error".to_string(),
            message: "internal server error".to_string(),
        }
    }
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.error_key().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_is_relayed_verbatim() {
        assert_eq!(ApiError::upstream(404, "not installed").status_code(), Some(404));
        assert_eq!(ApiError::upstream(422, "bad").status_code(), Some(422));
        assert_eq!(ApiError::upstream(503, "down").status_code(), Some(503));
    }

    #[test]
    fn test_errors_without_status() {
        assert_eq!(ApiError::signing("bad key").status_code(), None);
        assert_eq!(ApiError::transport("reset").status_code(), None);
        assert_eq!(ApiError::internal("oops").status_code(), None);
        assert_eq!(ApiError::config("missing").status_code(), None);
    }

    #[test]
    fn test_error_response_from_error() {
        let err = ApiError::invalid_request("invalid owner or repo");
        let body = ErrorResponse::from(&err);
        assert_eq!(body.error, "invalid_request");
        assert_eq!(body.message, "invalid request: invalid owner or repo");
    }

    #[test]
    fn test_unclassified_response_hides_details() {
        let body = ErrorResponse::unclassified();
        assert_eq!(body.error, "internal_error");
        assert!(!body.message.contains("key"));
    }
}
