//! Worker error types.

use thiserror::Error;

use reel_models::JobStatus;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job is already {0}")]
    AlreadyFinished(JobStatus),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Job store error: {0}")]
    JobStore(#[from] reel_jobstore::JobStoreError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Provider error: {0}")]
    Provider(#[from] reel_providers::ProviderError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] reel_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether redelivering the dispatch message could succeed.
    ///
    /// Only errors raised before the job row was marked failed qualify;
    /// once a stage fails the job is terminal and a rerun is refused.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::JobStore(e) => e.is_retryable(),
            WorkerError::Storage(e) => !e.is_not_found() && !matches!(e, reel_storage::StorageError::ConfigError(_)),
            WorkerError::Queue(_) => true,
            _ => false,
        }
    }
}
