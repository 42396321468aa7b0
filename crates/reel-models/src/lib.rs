//! Shared data models for the ScriptReel backend.
//!
//! This crate provides Serde-serializable types for:
//! - The job record and its status state machine
//! - LLM script documents and per-stage asset manifests
//! - API request/response schemas

pub mod api;
pub mod error;
pub mod job;
pub mod job_status;
pub mod segment;

// Re-export common types
pub use api::{CreateJobRequest, JobListResponse, JobSummary, VoiceInfo};
pub use error::{ModelError, ModelResult};
pub use job::{
    Job, JobAssets, JobId, JobLogEntry, LogLevel, VoiceId, MAX_SCRIPT_CHARS, MAX_SEGMENTS,
};
pub use job_status::JobStatus;
pub use segment::{
    AssetManifest, ImageManifest, ScriptDocument, SegmentAsset, SegmentScript, VideoManifest,
    VoiceManifest,
};
