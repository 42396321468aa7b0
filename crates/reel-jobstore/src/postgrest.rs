//! PostgREST (Supabase) job table client.
//!
//! Rows map one-to-one onto [`Job`]; `logs` and `assets` are `jsonb`
//! columns. Status moves are conditional PATCHes filtered on the allowed
//! predecessor statuses, so two writers can never move a job backwards.
//! Read-modify-write operations (logs, assets, fail) use `updated_at` as an
//! optimistic precondition and re-read on a lost race.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reel_models::{Job, JobAssets, JobId, JobLogEntry, JobStatus, ModelResult};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info_span, Instrument};

use crate::error::{JobStoreError, JobStoreResult};
use crate::metrics::{record_conflict, record_request};
use crate::retry::{with_retry, RetryConfig};
use crate::store::JobStore;

/// Attempts for optimistic read-modify-write before reporting a conflict.
const OPTIMISTIC_ATTEMPTS: u32 = 5;

/// PostgREST client configuration.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// Service role key (sent as `apikey` and bearer token)
    pub api_key: String,
    /// Table name
    pub table: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl PostgrestConfig {
    /// Create config from environment variables.
    pub fn from_env() -> JobStoreResult<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| JobStoreError::Config("SUPABASE_URL not set".into()))?;
        let api_key = std::env::var("SUPABASE_SERVICE_KEY")
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .map_err(|_| JobStoreError::Config("SUPABASE_SERVICE_KEY not set".into()))?;

        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return Err(JobStoreError::Config(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY cannot be empty".into(),
            ));
        }

        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            table: std::env::var("JOBS_TABLE").unwrap_or_else(|_| "jobs".to_string()),
            timeout: Duration::from_secs(secs("JOBSTORE_TIMEOUT_SECS", 30)),
            connect_timeout: Duration::from_secs(secs("JOBSTORE_CONNECT_TIMEOUT_SECS", 5)),
            retry: RetryConfig::from_env(),
        })
    }
}

/// Job store backed by a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestJobStore {
    http: Client,
    config: PostgrestConfig,
    table_url: String,
}

type Query = Vec<(&'static str, String)>;

fn eq_id(id: &JobId) -> (&'static str, String) {
    ("id", format!("eq.{}", id))
}

fn status_in(statuses: &[JobStatus]) -> String {
    let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    format!("in.({})", names.join(","))
}

fn timestamp(ts: &chrono::DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl PostgrestJobStore {
    /// Create a new client.
    pub fn new(config: PostgrestConfig) -> JobStoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("reel-jobstore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let table_url = format!("{}/rest/v1/{}", config.base_url, config.table);

        Ok(Self {
            http,
            config,
            table_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> JobStoreResult<Self> {
        Self::new(PostgrestConfig::from_env()?)
    }

    /// Send one request with retry and metrics, returning the affected rows.
    async fn execute(
        &self,
        operation: &str,
        method: Method,
        query: &Query,
        body: Option<&Value>,
    ) -> JobStoreResult<Vec<Job>> {
        let span = info_span!("jobstore_request", operation = %operation, table = %self.config.table);
        let start = Instant::now();
        let method = &method;

        let result = with_retry(&self.config.retry, operation, move || async move {
            let mut request = self
                .http
                .request(method.clone(), &self.table_url)
                .header("apikey", &self.config.api_key)
                .bearer_auth(&self.config.api_key)
                .header("Prefer", "return=representation")
                .query(query);

            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            match status {
                StatusCode::OK | StatusCode::CREATED => {
                    let text = response.text().await?;
                    serde_json::from_str::<Vec<Job>>(&text).map_err(|e| {
                        JobStoreError::InvalidResponse(format!("{}: {}", e, truncate(&text)))
                    })
                }
                StatusCode::NO_CONTENT => Ok(Vec::new()),
                _ => Err(Self::error_from_response(status, response).await),
            }
        })
        .instrument(span)
        .await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, start.elapsed().as_millis() as f64);

        result
    }

    async fn error_from_response(status: StatusCode, response: reqwest::Response) -> JobStoreError {
        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body = response.text().await.unwrap_or_default();

        match (status, retry_after_ms) {
            (StatusCode::TOO_MANY_REQUESTS, Some(ms)) => JobStoreError::RateLimited(ms),
            _ => JobStoreError::from_http_status(status.as_u16(), truncate(&body)),
        }
    }

    /// Conditional PATCH; `None` when no row matched the filter.
    async fn patch_where(
        &self,
        operation: &str,
        query: Query,
        body: Value,
    ) -> JobStoreResult<Option<Job>> {
        let rows = self
            .execute(operation, Method::PATCH, &query, Some(&body))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Explain why a conditional write matched nothing.
    async fn miss_reason(&self, id: &JobId, wanted: &str) -> JobStoreError {
        match self.get(id).await {
            Ok(Some(job)) => {
                record_conflict(wanted);
                JobStoreError::conflict(format!(
                    "job {} is {}, cannot {}",
                    id, job.status, wanted
                ))
            }
            Ok(None) => JobStoreError::not_found(id.to_string()),
            Err(e) => e,
        }
    }

    /// Optimistic read-modify-write guarded by `updated_at`.
    async fn modify<F>(&self, operation: &str, id: &JobId, f: F) -> JobStoreResult<Job>
    where
        F: Fn(&mut Job) -> ModelResult<()> + Send + Sync,
    {
        for attempt in 0..OPTIMISTIC_ATTEMPTS {
            let current = self.require(id).await?;
            let mut next = current.clone();
            f(&mut next)?;
            next.updated_at = Utc::now();

            let query = vec![
                eq_id(id),
                ("updated_at", format!("eq.{}", timestamp(&current.updated_at))),
            ];
            match self.patch_where(operation, query, serde_json::to_value(&next)?).await? {
                Some(job) => return Ok(job),
                None => {
                    debug!(job_id = %id, attempt, operation, "Lost optimistic update, re-reading");
                    record_conflict(operation);
                }
            }
        }

        Err(JobStoreError::conflict(format!(
            "job {} kept changing during {}",
            id, operation
        )))
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[async_trait]
impl JobStore for PostgrestJobStore {
    async fn create(&self, job: &Job) -> JobStoreResult<Job> {
        let body = serde_json::to_value(job)?;
        let rows = self
            .execute("create", Method::POST, &Vec::new(), Some(&body))
            .await
            .map_err(|e| match e {
                JobStoreError::AlreadyExists(_) => JobStoreError::AlreadyExists(job.id.to_string()),
                other => other,
            })?;
        rows.into_iter()
            .next()
            .ok_or_else(|| JobStoreError::InvalidResponse("insert returned no row".into()))
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>> {
        let query = vec![eq_id(id), ("select", "*".to_string())];
        let rows = self.execute("get", Method::GET, &query, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, limit: u32, offset: u32) -> JobStoreResult<Vec<Job>> {
        let query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        self.execute("list", Method::GET, &query, None).await
    }

    async fn update(&self, job: &Job) -> JobStoreResult<Job> {
        let mut stored = job.clone();
        stored.updated_at = Utc::now();
        self.patch_where("update", vec![eq_id(&job.id)], serde_json::to_value(&stored)?)
            .await?
            .ok_or_else(|| JobStoreError::not_found(job.id.to_string()))
    }

    async fn delete(&self, id: &JobId) -> JobStoreResult<()> {
        let rows = self
            .execute("delete", Method::DELETE, &vec![eq_id(id)], None)
            .await?;
        if rows.is_empty() {
            return Err(JobStoreError::not_found(id.to_string()));
        }
        Ok(())
    }

    async fn append_log(&self, id: &JobId, entry: JobLogEntry) -> JobStoreResult<()> {
        self.modify("append_log", id, |job| {
            job.logs.push(entry.clone());
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn transition(&self, id: &JobId, next: JobStatus) -> JobStoreResult<Job> {
        let predecessors = next.allowed_predecessors();
        if predecessors.is_empty() {
            return Err(JobStoreError::conflict(format!("{} has no predecessors", next)));
        }

        let mut body = json!({
            "status": next,
            "updated_at": Utc::now(),
        });
        if next != JobStatus::Error {
            // Progress inside a stage never exceeds the next stage's floor
            body["progress"] = json!(next.stage_progress());
        }

        let query = vec![eq_id(id), ("status", status_in(&predecessors))];
        match self.patch_where("transition", query, body).await? {
            Some(job) => Ok(job),
            None => Err(self.miss_reason(id, &format!("move to {}", next)).await),
        }
    }

    async fn set_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()> {
        let progress = progress.min(100);
        let query = vec![
            eq_id(id),
            ("progress", format!("lt.{}", progress)),
            ("status", format!("not.{}", status_in(&[JobStatus::Complete, JobStatus::Error]))),
        ];
        let body = json!({ "progress": progress, "updated_at": Utc::now() });
        // No match means progress is already higher or the job is finished
        self.patch_where("set_progress", query, body).await?;
        Ok(())
    }

    async fn record_assets(&self, id: &JobId, assets: JobAssets) -> JobStoreResult<()> {
        self.modify("record_assets", id, |job| {
            job.assets.merge(assets.clone());
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn complete(&self, id: &JobId, output_key: &str) -> JobStoreResult<Job> {
        let query = vec![
            eq_id(id),
            ("status", format!("eq.{}", JobStatus::Stitching.as_str())),
        ];
        let body = json!({
            "status": JobStatus::Complete,
            "progress": 100,
            "output_video_key": output_key,
            "updated_at": Utc::now(),
        });
        match self.patch_where("complete", query, body).await? {
            Some(job) => Ok(job),
            None => Err(self.miss_reason(id, "complete").await),
        }
    }

    async fn fail(&self, id: &JobId, message: &str) -> JobStoreResult<Job> {
        self.modify("fail", id, |job| job.fail(message)).await
    }

    async fn reset(&self, id: &JobId) -> JobStoreResult<Job> {
        self.modify("reset", id, |job| job.reset_for_retry()).await
    }

    async fn check_connectivity(&self) -> JobStoreResult<()> {
        let query = vec![("select", "id".to_string()), ("limit", "1".to_string())];
        let response = self
            .http
            .get(&self.table_url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .query(&query)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response.status(), response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filter() {
        assert_eq!(
            status_in(&JobStatus::GeneratingImages.allowed_predecessors()),
            "in.(pending,generating_jsons,generating_voice)"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(400);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 515);
    }
}
