//! Structured job logging.
//!
//! Every pipeline log line carries the job id and the stage so runs can be
//! filtered in aggregated logs.

use tracing::{error, info, warn, Span};

use reel_models::{JobId, JobStatus};

/// Logger scoped to one job and pipeline stage.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// The same job, a different stage.
    pub fn for_stage(&self, stage: JobStatus) -> Self {
        Self {
            job_id: self.job_id.clone(),
            stage: stage.as_str().to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Stage started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    /// Log a per-segment failure that the pipeline skips past.
    pub fn log_segment_failure(&self, segment: u32, message: &str) {
        warn!(
            job_id = %self.job_id,
            stage = %self.stage,
            segment,
            "Segment failed: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Stage completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Span to attach to a whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, stage = %self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_stage_switch() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "pipeline");
        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.stage(), "pipeline");

        let voice = logger.for_stage(JobStatus::GeneratingVoice);
        assert_eq!(voice.stage(), "generating_voice");
        assert_eq!(voice.job_id(), logger.job_id());
    }
}
