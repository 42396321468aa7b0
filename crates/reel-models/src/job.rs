//! The job record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::api::CreateJobRequest;
use crate::error::{ModelError, ModelResult};
use crate::job_status::JobStatus;

/// Maximum accepted script length in characters.
pub const MAX_SCRIPT_CHARS: u64 = 20_000;

/// Maximum number of segments per job.
pub const MAX_SEGMENTS: u32 = 20;

const RETRY_LOG_MESSAGE: &str = "Job reset for retry";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is a well-formed UUID.
    pub fn is_valid(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Provider voice identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Severity of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

/// A free-form log line attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Storage keys of the JSON blobs produced by each stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobAssets {
    /// LLM output (`ScriptDocument`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments_key: Option<String>,
    /// Narration manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_key: Option<String>,
    /// Image manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_key: Option<String>,
    /// Video clip manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos_key: Option<String>,
}

impl JobAssets {
    /// Overlay the keys that are set in `other`.
    pub fn merge(&mut self, other: JobAssets) {
        if other.segments_key.is_some() {
            self.segments_key = other.segments_key;
        }
        if other.voice_key.is_some() {
            self.voice_key = other.voice_key;
        }
        if other.images_key.is_some() {
            self.images_key = other.images_key;
        }
        if other.videos_key.is_some() {
            self.videos_key = other.videos_key;
        }
    }
}

/// A script-to-video job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Input script text
    pub script: String,

    /// Selected TTS voice
    pub voice: String,

    /// Requested number of segments
    pub segment_count: u32,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Log entries, oldest first
    #[serde(default)]
    pub logs: Vec<JobLogEntry>,

    /// Generated JSON blob pointers
    #[serde(default)]
    pub assets: JobAssets,

    /// Storage folder holding every artifact of the job
    pub output_folder: String,

    /// Final video key (set on completion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video_key: Option<String>,

    /// Error message (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job from a validated request.
    pub fn new(request: CreateJobRequest) -> ModelResult<Self> {
        request
            .validate()
            .map_err(|e| ModelError::validation(e.to_string()))?;

        let script = request.script.trim().to_string();
        if script.is_empty() {
            return Err(ModelError::validation("script must not be blank"));
        }

        let id = JobId::new();
        let now = Utc::now();

        Ok(Self {
            output_folder: format!("jobs/{}", id),
            id,
            script,
            voice: request.voice.trim().to_string(),
            segment_count: request.segment_count,
            status: JobStatus::Pending,
            progress: 0,
            logs: vec![JobLogEntry::info("Job created")],
            assets: JobAssets::default(),
            output_video_key: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Voice selected for narration.
    pub fn voice_id(&self) -> VoiceId {
        VoiceId::new(self.voice.clone())
    }

    /// Move to the next status, enforcing forward-only progression.
    pub fn advance(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next != JobStatus::Error {
            self.progress = self.progress.max(next.stage_progress());
        }
        self.touch();
        Ok(())
    }

    /// Set progress without ever moving it backwards.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.touch();
    }

    /// Mark the job failed.
    pub fn fail(&mut self, message: impl Into<String>) -> ModelResult<()> {
        let message = message.into();
        self.advance(JobStatus::Error)?;
        self.push_log(LogLevel::Error, message.clone());
        self.error_message = Some(message);
        Ok(())
    }

    /// Mark the job complete.
    pub fn complete(&mut self, output_video_key: impl Into<String>) -> ModelResult<()> {
        self.advance(JobStatus::Complete)?;
        self.output_video_key = Some(output_video_key.into());
        self.progress = 100;
        Ok(())
    }

    /// Append a log entry.
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(JobLogEntry::new(level, message));
        self.touch();
    }

    /// Reset a failed job so it can be dispatched again.
    pub fn reset_for_retry(&mut self) -> ModelResult<()> {
        if self.status != JobStatus::Error {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: JobStatus::Pending,
            });
        }
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.error_message = None;
        self.output_video_key = None;
        self.assets = JobAssets::default();
        self.push_log(LogLevel::Info, RETRY_LOG_MESSAGE);
        Ok(())
    }

    /// Run number, counting the first run as 1.
    pub fn attempt(&self) -> u32 {
        1 + self
            .logs
            .iter()
            .filter(|l| l.message == RETRY_LOG_MESSAGE)
            .count() as u32
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateJobRequest {
        CreateJobRequest {
            script: "Once upon a time there was a lighthouse.".to_string(),
            voice: "rachel".to_string(),
            segment_count: 4,
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(request()).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.output_folder, format!("jobs/{}", job.id));
        assert!(job.id.is_valid());
        assert_eq!(job.logs.len(), 1);
    }

    #[test]
    fn test_new_job_validation() {
        let mut req = request();
        req.segment_count = 0;
        assert!(matches!(Job::new(req), Err(ModelError::Validation(_))));

        let mut req = request();
        req.segment_count = MAX_SEGMENTS + 1;
        assert!(Job::new(req).is_err());

        let mut req = request();
        req.voice = String::new();
        assert!(Job::new(req).is_err());

        let mut req = request();
        req.script = "   \n ".to_string();
        assert!(Job::new(req).is_err());
    }

    #[test]
    fn test_advance_bumps_progress() {
        let mut job = Job::new(request()).unwrap();
        job.advance(JobStatus::GeneratingJsons).unwrap();
        assert_eq!(job.progress, 5);
        job.advance(JobStatus::GeneratingImages).unwrap();
        assert_eq!(job.progress, 40);

        let err = job.advance(JobStatus::GeneratingVoice).unwrap_err();
        assert!(matches!(err, ModelError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::GeneratingImages);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = Job::new(request()).unwrap();
        job.set_progress(50);
        job.set_progress(30);
        assert_eq!(job.progress, 50);
        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_fail_and_retry() {
        let mut job = Job::new(request()).unwrap();
        job.advance(JobStatus::GeneratingJsons).unwrap();
        job.assets.segments_key = Some("jobs/x/segments.json".into());
        job.fail("LLM returned garbage").unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("LLM returned garbage"));
        assert_eq!(job.logs.last().unwrap().level, LogLevel::Error);

        // Failing twice is a transition out of a terminal status
        assert!(job.fail("again").is_err());

        assert_eq!(job.attempt(), 1);
        job.reset_for_retry().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error_message.is_none());
        assert!(job.assets.segments_key.is_none());
        assert_eq!(job.attempt(), 2);
    }

    #[test]
    fn test_reset_requires_error() {
        let mut job = Job::new(request()).unwrap();
        assert!(job.reset_for_retry().is_err());
    }

    #[test]
    fn test_complete_only_after_stitching() {
        let mut job = Job::new(request()).unwrap();
        assert!(job.complete("jobs/x/final.mp4").is_err());
        job.advance(JobStatus::Stitching).unwrap();
        job.complete("jobs/x/final.mp4").unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_video_key.as_deref(), Some("jobs/x/final.mp4"));
    }

    #[test]
    fn test_assets_merge() {
        let mut assets = JobAssets {
            segments_key: Some("a".into()),
            ..Default::default()
        };
        assets.merge(JobAssets {
            voice_key: Some("b".into()),
            ..Default::default()
        });
        assert_eq!(assets.segments_key.as_deref(), Some("a"));
        assert_eq!(assets.voice_key.as_deref(), Some("b"));
    }
}
