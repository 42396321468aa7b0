//! In-memory job store for tests and single-process development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reel_models::{Job, JobAssets, JobId, JobLogEntry, JobStatus, ModelResult};
use tokio::sync::RwLock;

use crate::error::{JobStoreError, JobStoreResult};
use crate::store::JobStore;

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to a stored job under the write lock.
    async fn modify<F>(&self, id: &JobId, f: F) -> JobStoreResult<Job>
    where
        F: FnOnce(&mut Job) -> ModelResult<()> + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| JobStoreError::not_found(id.to_string()))?;

        // Work on a copy so a rejected change leaves the row intact
        let mut next = job.clone();
        f(&mut next)?;
        *job = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> JobStoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(JobStoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id.to_string(), job.clone());
        Ok(job.clone())
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id.as_str()).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> JobStoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update(&self, job: &Job) -> JobStoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs
            .get_mut(job.id.as_str())
            .ok_or_else(|| JobStoreError::not_found(job.id.to_string()))?;
        let mut stored = job.clone();
        stored.updated_at = Utc::now();
        *slot = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, id: &JobId) -> JobStoreResult<()> {
        self.jobs
            .write()
            .await
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| JobStoreError::not_found(id.to_string()))
    }

    async fn append_log(&self, id: &JobId, entry: JobLogEntry) -> JobStoreResult<()> {
        self.modify(id, |job| {
            job.logs.push(entry);
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn transition(&self, id: &JobId, next: JobStatus) -> JobStoreResult<Job> {
        self.modify(id, |job| job.advance(next)).await
    }

    async fn set_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()> {
        self.modify(id, |job| {
            if !job.status.is_terminal() {
                job.set_progress(progress);
            }
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn record_assets(&self, id: &JobId, assets: JobAssets) -> JobStoreResult<()> {
        self.modify(id, |job| {
            job.assets.merge(assets);
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn complete(&self, id: &JobId, output_key: &str) -> JobStoreResult<Job> {
        self.modify(id, |job| job.complete(output_key)).await
    }

    async fn fail(&self, id: &JobId, message: &str) -> JobStoreResult<Job> {
        self.modify(id, |job| job.fail(message)).await
    }

    async fn reset(&self, id: &JobId) -> JobStoreResult<Job> {
        self.modify(id, |job| job.reset_for_retry()).await
    }

    async fn check_connectivity(&self) -> JobStoreResult<()> {
        Ok(())
    }
}
