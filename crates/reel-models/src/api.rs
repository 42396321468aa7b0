//! API request and response schemas.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::{Job, MAX_SCRIPT_CHARS, MAX_SEGMENTS};
use crate::job_status::JobStatus;

fn default_segment_count() -> u32 {
    6
}

/// Request body for submitting a new job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CreateJobRequest {
    /// Script text to narrate
    #[validate(length(min = 1, max = "MAX_SCRIPT_CHARS"))]
    pub script: String,

    /// TTS voice identifier
    #[validate(length(min = 1, max = 128))]
    pub voice: String,

    /// Number of segments the script is split into
    #[serde(default = "default_segment_count")]
    #[validate(range(min = 1, max = "MAX_SEGMENTS"))]
    pub segment_count: u32,
}

/// Condensed job view for list pages.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub voice: String,
    pub segment_count: u32,
    /// First characters of the script
    pub script_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub has_video: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSummary {
    const PREVIEW_CHARS: usize = 80;
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        let mut preview: String = job.script.chars().take(Self::PREVIEW_CHARS).collect();
        if job.script.chars().count() > Self::PREVIEW_CHARS {
            preview.push('…');
        }

        Self {
            id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            voice: job.voice.clone(),
            segment_count: job.segment_count,
            script_preview: preview,
            error_message: job.error_message.clone(),
            has_video: job.output_video_key.is_some(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Paginated job list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub limit: u32,
    pub offset: u32,
}

/// A selectable narration voice.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
}
