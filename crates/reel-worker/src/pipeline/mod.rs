//! The script-to-video pipeline.
//!
//! A run walks one job through the stages in order:
//!
//! 1. `generating_jsons`: the LLM splits the script into segments
//! 2. `generating_voice`: one narration clip per segment
//! 3. `generating_images`: one still per narrated segment
//! 4. `generating_videos`: optional clip per segment with an image
//! 5. `stitching`: reconcile, render, concat, align, upload
//!
//! Each stage transitions the job row first and records its manifest after,
//! so the row always points at what has been produced so far. Segment
//! failures are logged and skipped; anything else fails the job.

mod generate;
mod stitch;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn, Instrument};

use reel_jobstore::JobStore;
use reel_models::{Job, JobId, JobLogEntry, JobStatus};
use reel_providers::{ImageGenerator, ScriptWriter, SpeechSynthesizer, VideoGenerator};
use reel_storage::ObjectStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

pub use generate::is_segment_retryable;

/// The generation services a pipeline calls.
#[derive(Clone)]
pub struct Providers {
    pub writer: Arc<dyn ScriptWriter>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub images: Arc<dyn ImageGenerator>,
    /// `None` renders every segment from its still
    pub video: Option<Arc<dyn VideoGenerator>>,
}

impl Providers {
    /// Build the configured HTTP clients.
    ///
    /// A missing video API key only disables clip generation.
    pub fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        let video: Option<Arc<dyn VideoGenerator>> = if config.video_generation {
            match reel_providers::VideoClient::from_env() {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Video generation disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            writer: Arc::new(reel_providers::LlmClient::from_env()?),
            speech: reel_providers::speech_from_env()?,
            images: Arc::new(reel_providers::ImageClient::from_env()?),
            video,
        })
    }
}

/// Runs jobs end to end against a job store, object storage and providers.
pub struct Pipeline {
    config: WorkerConfig,
    jobs: Arc<dyn JobStore>,
    storage: Arc<dyn ObjectStore>,
    providers: Providers,
}

impl Pipeline {
    pub fn new(
        config: WorkerConfig,
        jobs: Arc<dyn JobStore>,
        storage: Arc<dyn ObjectStore>,
        providers: Providers,
    ) -> Self {
        Self {
            config,
            jobs,
            storage,
            providers,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Run a pending job to completion.
    ///
    /// Terminal jobs are refused untouched. A job found mid-pipeline was left
    /// behind by a crashed run and is failed so the user can retry it.
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<()> {
        let job = self.jobs.require(job_id).await?;
        let logger = JobLogger::new(job_id, "pipeline");

        if job.status.is_terminal() {
            logger.log_warning(&format!("Refusing to run a {} job", job.status));
            return Err(WorkerError::AlreadyFinished(job.status));
        }

        if job.status != JobStatus::Pending {
            let message = format!("Run interrupted while {}; retry the job", job.status);
            logger.log_error(&message);
            self.jobs.fail(job_id, &message).await?;
            return Err(WorkerError::job_failed(message));
        }

        let span = logger.create_span();
        let started = Instant::now();
        let result = self.execute(&job, &logger).instrument(span).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(output_key) => {
                metrics::record_job("complete", elapsed);
                logger.log_completion(&format!("final video at {}", output_key));
                Ok(())
            }
            Err(e) => {
                metrics::record_job("error", elapsed);
                let message = e.to_string();
                logger.log_error(&message);
                match self.jobs.fail(job_id, &message).await {
                    Ok(_) => Err(WorkerError::job_failed(message)),
                    Err(store_err) => {
                        // Row still shows a running stage; the next delivery fails it
                        warn!(job_id = %job_id, "Could not mark job failed: {}", store_err);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn execute(&self, job: &Job, logger: &JobLogger) -> WorkerResult<String> {
        info!(
            job_id = %job.id,
            segments = job.segment_count,
            attempt = job.attempt(),
            "Starting pipeline"
        );

        let doc = self.generate_jsons(job, logger).await?;
        let voice = self.generate_voice(job, &doc, logger).await?;
        let images = self.generate_images(job, &doc, &voice, logger).await?;
        let videos = self.generate_videos(job, &doc, &images, logger).await?;
        self.stitch(job, &doc, &voice, &images, &videos, logger).await
    }

    /// Transition into `stage` and note it in the job log.
    async fn enter(&self, job: &Job, stage: JobStatus, logger: &JobLogger) -> WorkerResult<Instant> {
        self.jobs.transition(&job.id, stage).await?;
        logger.for_stage(stage).log_start(stage.as_str());
        Ok(Instant::now())
    }

    fn leave(&self, stage: JobStatus, started: Instant) {
        metrics::record_stage(stage.as_str(), started.elapsed().as_secs_f64());
    }

    /// Append to the job's visible log. Failures only reach tracing.
    async fn note(&self, job: &Job, entry: JobLogEntry) {
        if let Err(e) = self.jobs.append_log(&job.id, entry).await {
            warn!(job_id = %job.id, "Failed to append job log: {}", e);
        }
    }

    /// Report `done` of `total` items finished within `stage`.
    async fn report_progress(&self, job: &Job, stage: JobStatus, done: usize, total: usize) {
        let progress = stage_progress(stage, done, total);
        if let Err(e) = self.jobs.set_progress(&job.id, progress).await {
            warn!(job_id = %job.id, "Failed to update progress: {}", e);
        }
    }
}

/// Progress after `done` of `total` items within `stage`.
///
/// Interpolates between the stage's floor and the next stage's floor,
/// stopping one point short so only the next transition reaches it.
pub fn stage_progress(stage: JobStatus, done: usize, total: usize) -> u8 {
    let floor = stage.stage_progress() as usize;
    let ceiling = (stage.stage_ceiling() as usize).saturating_sub(1).max(floor);
    if total == 0 {
        return floor as u8;
    }
    let done = done.min(total);
    (floor + (ceiling - floor) * done / total) as u8
}
