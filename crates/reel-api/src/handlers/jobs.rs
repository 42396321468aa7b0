//! Job CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use reel_models::{CreateJobRequest, Job, JobId, JobListResponse, JobLogEntry, JobStatus, JobSummary};
use reel_queue::DispatchJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Pagination for the job list.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Presigned download link for a finished video.
#[derive(Debug, Serialize)]
pub struct VideoUrlResponse {
    pub url: String,
    pub expires_in_secs: u64,
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    let id = JobId::from_string(raw.trim());
    if !id.is_valid() {
        return Err(ApiError::bad_request(format!("invalid job id: {}", raw)));
    }
    Ok(id)
}

/// Hand a stored job to the dispatcher.
///
/// A failed dispatch leaves nothing to pick the job up, so the row is marked
/// `error` before the failure is reported.
async fn dispatch_job(state: &AppState, job: &Job) -> ApiResult<Job> {
    let request = DispatchJob::new(job.id.clone()).with_attempt(job.attempt());
    let backend = state.dispatcher.name();

    match state.dispatcher.dispatch(&request).await {
        Ok(reference) => {
            metrics::record_job_dispatched(backend, true);
            info!(job_id = %job.id, backend, reference = %reference, "Job dispatched");
            state
                .jobs
                .append_log(
                    &job.id,
                    JobLogEntry::info(format!("Dispatched via {} ({})", backend, reference)),
                )
                .await?;
            Ok(state.jobs.require(&job.id).await?)
        }
        Err(e) => {
            metrics::record_job_dispatched(backend, false);
            warn!(job_id = %job.id, backend, error = %e, "Dispatch failed");
            let message = format!("Dispatch failed: {}", e);
            if let Err(store_err) = state.jobs.fail(&job.id, &message).await {
                warn!(job_id = %job.id, error = %store_err, "Could not mark job failed");
            }
            Err(ApiError::Dispatch(e.to_string()))
        }
    }
}

/// Create a job and dispatch it to a worker.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    request.validate()?;
    if !state.config.accepts_voice(&request.voice) {
        return Err(ApiError::Validation(format!(
            "unknown voice: {}",
            request.voice
        )));
    }

    let job = Job::new(request)?;
    let job = state.jobs.create(&job).await?;
    metrics::record_job_created();
    info!(job_id = %job.id, segments = job.segment_count, "Job created");

    let job = dispatch_job(&state, &job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// List job summaries, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let jobs = state.jobs.list(limit, offset).await?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(JobSummary::from).collect(),
        limit,
        offset,
    }))
}

/// Full job record including logs and asset pointers.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.jobs.require(&id).await?))
}

/// Delete a job row and its storage folder.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.require(&id).await?;

    if job.status.is_running() {
        return Err(ApiError::conflict(format!(
            "job {} is {}; wait for it to finish",
            id,
            job.status.as_str()
        )));
    }

    let removed = state
        .storage
        .delete_prefix(&format!("{}/", job.output_folder))
        .await?;
    state.jobs.delete(&id).await?;

    info!(job_id = %id, objects = removed, "Job deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Reset a failed job and dispatch it again.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.require(&id).await?;

    if job.status != JobStatus::Error {
        return Err(ApiError::conflict(format!(
            "only failed jobs can be retried (status: {})",
            job.status.as_str()
        )));
    }

    let job = state.jobs.reset(&id).await?;
    metrics::record_job_retried();
    info!(job_id = %id, attempt = job.attempt(), "Job reset for retry");

    Ok(Json(dispatch_job(&state, &job).await?))
}

/// Presigned URL for the finished video.
pub async fn get_job_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoUrlResponse>> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.require(&id).await?;

    let key = job
        .output_video_key
        .as_deref()
        .ok_or_else(|| ApiError::not_found(format!("job {} has no video yet", id)))?;

    let ttl = state.config.presign_ttl;
    let url = state.storage.presign_get(key, ttl).await?;

    Ok(Json(VideoUrlResponse {
        url,
        expires_in_secs: ttl.as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        assert!(parse_job_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(matches!(
            parse_job_id("../etc/passwd"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
