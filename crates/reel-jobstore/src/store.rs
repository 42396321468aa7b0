//! The job repository interface.

use async_trait::async_trait;
use reel_models::{Job, JobAssets, JobId, JobLogEntry, JobStatus};

use crate::error::{JobStoreError, JobStoreResult};

/// Persistent storage of job rows.
///
/// Status changes go through [`JobStore::transition`], [`JobStore::complete`],
/// [`JobStore::fail`] and [`JobStore::reset`], each of which refuses moves
/// that [`JobStatus::can_transition_to`] forbids with
/// [`JobStoreError::Conflict`]. Progress only ever increases.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn create(&self, job: &Job) -> JobStoreResult<Job>;

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>>;

    /// Jobs ordered newest first.
    async fn list(&self, limit: u32, offset: u32) -> JobStoreResult<Vec<Job>>;

    /// Overwrite a row. Status rules are the caller's responsibility.
    async fn update(&self, job: &Job) -> JobStoreResult<Job>;

    async fn delete(&self, id: &JobId) -> JobStoreResult<()>;

    async fn append_log(&self, id: &JobId, entry: JobLogEntry) -> JobStoreResult<()>;

    /// Move to `next` only if the current status is an allowed predecessor.
    async fn transition(&self, id: &JobId, next: JobStatus) -> JobStoreResult<Job>;

    /// Raise progress; lower values and terminal jobs are left untouched.
    async fn set_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()>;

    /// Merge generated blob pointers into the job.
    async fn record_assets(&self, id: &JobId, assets: JobAssets) -> JobStoreResult<()>;

    /// `stitching -> complete` with the final video key.
    async fn complete(&self, id: &JobId, output_key: &str) -> JobStoreResult<Job>;

    /// Any non-terminal status `-> error` with a message and log line.
    async fn fail(&self, id: &JobId, message: &str) -> JobStoreResult<Job>;

    /// `error -> pending` for a retry.
    async fn reset(&self, id: &JobId) -> JobStoreResult<Job>;

    async fn check_connectivity(&self) -> JobStoreResult<()>;

    /// Fetch a job that must exist.
    async fn require(&self, id: &JobId) -> JobStoreResult<Job> {
        self.get(id)
            .await?
            .ok_or_else(|| JobStoreError::not_found(id.to_string()))
    }
}
