//! Provider client error types.

use reel_models::ModelError;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{provider} unavailable ({status}): {message}")]
    ServiceUnavailable {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} rate limited, retry after {1}ms")]
    RateLimited(&'static str, u64),

    #[error("{0} rejected credentials")]
    Unauthorized(&'static str),

    #[error("{provider} request failed ({status}): {message}")]
    RequestFailed {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation task failed: {0}")]
    TaskFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid script: {0}")]
    Script(#[from] ModelError),
}

impl ProviderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(
        provider: &'static str,
        status: u16,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(provider),
            429 => Self::RateLimited(provider, retry_after_ms.unwrap_or(2000)),
            408 | 500..=599 => Self::ServiceUnavailable {
                provider,
                status,
                message,
            },
            _ => Self::RequestFailed {
                provider,
                status,
                message,
            },
        }
    }

    /// Network failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable { .. } | Self::RateLimited(..) | Self::Timeout(_) => true,
            Self::Network(e) => !e.is_builder() && !e.is_decode(),
            _ => false,
        }
    }

    /// The provider answered with 429 or 5xx, so the request was not acted on.
    ///
    /// Timeouts and dropped connections are excluded: the request may have
    /// been accepted before the response was lost.
    pub fn is_server_rejection(&self) -> bool {
        match self {
            Self::RateLimited(..) => true,
            Self::ServiceUnavailable { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(_, ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ServiceUnavailable { status, .. } | Self::RequestFailed { status, .. } => {
                Some(*status)
            }
            Self::RateLimited(..) => Some(429),
            Self::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderError::from_http_status("tts", 401, "", None),
            ProviderError::Unauthorized("tts")
        ));
        assert!(ProviderError::from_http_status("tts", 503, "down", None).is_retryable());
        assert!(ProviderError::from_http_status("tts", 429, "", Some(500)).is_retryable());
        assert!(!ProviderError::from_http_status("tts", 400, "bad voice", None).is_retryable());
        assert_eq!(
            ProviderError::from_http_status("llm", 429, "", None).retry_after_ms(),
            Some(2000)
        );
    }

    #[test]
    fn test_server_rejection() {
        assert!(ProviderError::from_http_status("video", 502, "bad gateway", None).is_server_rejection());
        assert!(ProviderError::from_http_status("video", 429, "", None).is_server_rejection());
        assert!(!ProviderError::from_http_status("video", 408, "", None).is_server_rejection());
        assert!(!ProviderError::from_http_status("video", 400, "bad prompt", None).is_server_rejection());
        assert!(!ProviderError::Timeout(30).is_server_rejection());
    }

    #[test]
    fn test_script_errors_are_final() {
        let err: ProviderError = ModelError::EmptyScript.into();
        assert!(!err.is_retryable());
    }
}
