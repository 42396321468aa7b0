//! Job store error types.

use reel_models::ModelError;
use thiserror::Error;

/// Result type for job store operations.
pub type JobStoreResult<T> = Result<T, JobStoreError>;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    /// The row changed underneath us or the status move is not allowed.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid job: {0}")]
    Model(ModelError),
}

impl From<ModelError> for JobStoreError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            other => Self::Model(other),
        }
    }
}

impl JobStoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            429 => Self::RateLimited(1000),
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status that corresponds to this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) | Self::Conflict(_) => Some(409),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(code, _) => Some(*code),
            Self::RequestFailed(_) => Some(400),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode(),
            Self::RateLimited(_) | Self::ServerError(..) => true,
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobStatus;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            JobStoreError::from_http_status(429, "slow down"),
            JobStoreError::RateLimited(_)
        ));
        assert!(JobStoreError::from_http_status(503, "unavailable").is_retryable());
        assert!(!JobStoreError::from_http_status(400, "bad").is_retryable());
        assert!(matches!(
            JobStoreError::from_http_status(409, "dup"),
            JobStoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            JobStoreError::from_http_status(403, "rls"),
            JobStoreError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let err: JobStoreError = ModelError::InvalidTransition {
            from: JobStatus::Complete,
            to: JobStatus::Stitching,
        }
        .into();
        assert!(matches!(err, JobStoreError::Conflict(_)));
        assert_eq!(err.http_status(), Some(409));
    }
}
