//! ScriptReel pipeline worker.
//!
//! This crate provides:
//! - The five-stage script-to-video [`Pipeline`]
//! - Reconciliation of partial assets into a render plan
//! - A Redis Streams executor with retries and a DLQ
//! - Per-job logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod plan;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, Outcome};
pub use logging::JobLogger;
pub use pipeline::{stage_progress, Pipeline, Providers};
pub use plan::{reconcile, PlannedSegment, SegmentPlan};
