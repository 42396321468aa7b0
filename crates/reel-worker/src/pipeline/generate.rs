//! Generation stages: script, narration, images and clips.

use std::future::Future;

use reel_models::{
    AssetManifest, ImageManifest, Job, JobAssets, JobLogEntry, JobStatus, ScriptDocument,
    SegmentAsset, SegmentScript, VideoManifest, VoiceManifest,
};
use reel_providers::{ProviderError, VideoGenerator};
use reel_storage::keys;

use super::Pipeline;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async_when, RetryConfig, RetryResult};

/// Whether a failed segment call is worth another attempt.
///
/// Rejected credentials, bad configuration and 4xx answers other than
/// throttling fail the same way every time. A clip task the provider
/// failed or that outlived its wait is not resubmitted either; each
/// submission is billed.
pub fn is_segment_retryable(error: &WorkerError) -> bool {
    match error {
        WorkerError::Provider(e) => match e {
            ProviderError::Config(_)
            | ProviderError::Unauthorized(_)
            | ProviderError::Script(_)
            | ProviderError::TaskFailed(_)
            | ProviderError::Timeout(_) => false,
            other => other
                .http_status()
                .map_or(true, |s| s >= 500 || s == 408 || s == 429),
        },
        WorkerError::Storage(e) => !e.is_not_found(),
        WorkerError::ConfigError(_) | WorkerError::AlreadyFinished(_) => false,
        _ => true,
    }
}

impl Pipeline {
    fn segment_retry(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.config.segment_retries)
            .with_base_delay(self.config.retry_base_delay)
    }

    /// Stage 1: split the script into narrated segments.
    pub async fn generate_jsons(&self, job: &Job, logger: &JobLogger) -> WorkerResult<ScriptDocument> {
        let stage = JobStatus::GeneratingJsons;
        let started = self.enter(job, stage, logger).await?;

        // The writer retries and falls back across models on its own
        let doc = self
            .providers
            .writer
            .write_script(&job.script, job.segment_count)
            .await?;

        let key = keys::segments_json(&job.output_folder);
        reel_storage::upload_json(self.storage.as_ref(), &key, &doc).await?;
        self.jobs
            .record_assets(
                &job.id,
                JobAssets {
                    segments_key: Some(key),
                    ..Default::default()
                },
            )
            .await?;

        let message = if doc.title.is_empty() {
            format!("Script split into {} segments", doc.len())
        } else {
            format!("Script \"{}\" split into {} segments", doc.title, doc.len())
        };
        logger.for_stage(stage).log_completion(&message);
        self.note(job, JobLogEntry::info(message)).await;
        self.leave(stage, started);
        Ok(doc)
    }

    /// Stage 2: narrate every segment.
    pub async fn generate_voice(
        &self,
        job: &Job,
        doc: &ScriptDocument,
        logger: &JobLogger,
    ) -> WorkerResult<VoiceManifest> {
        let stage = JobStatus::GeneratingVoice;
        let started = self.enter(job, stage, logger).await?;

        let manifest = self
            .for_each_segment(job, stage, &doc.segments, logger, move |segment| {
                self.narrate_segment(job, segment)
            })
            .await;

        let key = keys::voice_json(&job.output_folder);
        self.save_manifest(job, &key, &manifest).await?;
        self.jobs
            .record_assets(
                &job.id,
                JobAssets {
                    voice_key: Some(key),
                    ..Default::default()
                },
            )
            .await?;

        self.finish_stage(job, stage, &manifest, "narration clips", logger)
            .await;
        self.leave(stage, started);

        if manifest.succeeded() == 0 {
            return Err(WorkerError::job_failed("no narration audio was generated"));
        }
        Ok(manifest)
    }

    /// Stage 3: one still per narrated segment.
    ///
    /// Segments without narration are dropped at stitching, so no image is
    /// requested for them.
    pub async fn generate_images(
        &self,
        job: &Job,
        doc: &ScriptDocument,
        voice: &VoiceManifest,
        logger: &JobLogger,
    ) -> WorkerResult<ImageManifest> {
        let stage = JobStatus::GeneratingImages;
        let started = self.enter(job, stage, logger).await?;

        let narrated: Vec<SegmentScript> = doc
            .segments
            .iter()
            .filter(|s| voice.key_for(s.index).is_some())
            .cloned()
            .collect();

        let manifest = self
            .for_each_segment(job, stage, &narrated, logger, move |segment| {
                self.illustrate_segment(job, segment)
            })
            .await;

        let key = keys::images_json(&job.output_folder);
        self.save_manifest(job, &key, &manifest).await?;
        self.jobs
            .record_assets(
                &job.id,
                JobAssets {
                    images_key: Some(key),
                    ..Default::default()
                },
            )
            .await?;

        self.finish_stage(job, stage, &manifest, "images", logger).await;
        self.leave(stage, started);
        Ok(manifest)
    }

    /// Stage 4: animate segments that have their own image.
    pub async fn generate_videos(
        &self,
        job: &Job,
        doc: &ScriptDocument,
        images: &ImageManifest,
        logger: &JobLogger,
    ) -> WorkerResult<VideoManifest> {
        let stage = JobStatus::GeneratingVideos;
        let started = self.enter(job, stage, logger).await?;

        let Some(generator) = self.providers.video.as_deref() else {
            let message = "Video generation disabled; rendering stills";
            logger.for_stage(stage).log_progress(message);
            self.note(job, JobLogEntry::info(message)).await;
            self.leave(stage, started);
            return Ok(VideoManifest::default());
        };

        let illustrated: Vec<SegmentScript> = doc
            .segments
            .iter()
            .filter(|s| images.key_for(s.index).is_some())
            .cloned()
            .collect();

        let manifest = self
            .for_each_segment(job, stage, &illustrated, logger, move |segment| {
                self.animate_segment(job, segment, images, generator)
            })
            .await;

        let key = keys::videos_json(&job.output_folder);
        self.save_manifest(job, &key, &manifest).await?;
        self.jobs
            .record_assets(
                &job.id,
                JobAssets {
                    videos_key: Some(key),
                    ..Default::default()
                },
            )
            .await?;

        self.finish_stage(job, stage, &manifest, "clips", logger).await;
        self.leave(stage, started);
        Ok(manifest)
    }

    /// Run `op` for each segment in order with a pause between calls.
    ///
    /// Each segment is retried on its own; one that still fails is recorded
    /// as failed in the manifest and the loop moves on.
    async fn for_each_segment<'a, F, Fut>(
        &self,
        job: &Job,
        stage: JobStatus,
        segments: &'a [SegmentScript],
        logger: &JobLogger,
        op: F,
    ) -> AssetManifest
    where
        F: Fn(&'a SegmentScript) -> Fut,
        Fut: Future<Output = WorkerResult<SegmentAsset>>,
    {
        let logger = logger.for_stage(stage);
        let retry = self.segment_retry(stage.as_str());
        let mut manifest = AssetManifest::default();

        for (n, segment) in segments.iter().enumerate() {
            if n > 0 && !self.config.segment_delay.is_zero() {
                tokio::time::sleep(self.config.segment_delay).await;
            }

            match retry_async_when(&retry, || op(segment), is_segment_retryable).await {
                RetryResult::Success(asset) => {
                    logger.log_progress(&format!("segment {} done", segment.index));
                    manifest.push(asset);
                }
                RetryResult::Failed { error, attempts } => {
                    let message = error.to_string();
                    logger.log_segment_failure(segment.index, &message);
                    metrics::record_segment_failure(stage.as_str());
                    self.note(
                        job,
                        JobLogEntry::warn(format!(
                            "Segment {} failed after {} attempt(s): {}",
                            segment.index + 1,
                            attempts,
                            message
                        )),
                    )
                    .await;
                    manifest.push(SegmentAsset::failed(segment.index, message));
                }
            }

            self.report_progress(job, stage, n + 1, segments.len()).await;
        }

        manifest
    }

    async fn save_manifest(&self, job: &Job, key: &str, manifest: &AssetManifest) -> WorkerResult<()> {
        reel_storage::upload_json(self.storage.as_ref(), key, manifest).await?;
        tracing::debug!(job_id = %job.id, key, "Saved manifest");
        Ok(())
    }

    async fn finish_stage(
        &self,
        job: &Job,
        stage: JobStatus,
        manifest: &AssetManifest,
        what: &str,
        logger: &JobLogger,
    ) {
        let message = format!(
            "Generated {}/{} {}",
            manifest.succeeded(),
            manifest.segments.len(),
            what
        );
        logger.for_stage(stage).log_completion(&message);
        let entry = if manifest.failed() > 0 {
            JobLogEntry::warn(message)
        } else {
            JobLogEntry::info(message)
        };
        self.note(job, entry).await;
    }

    async fn narrate_segment(&self, job: &Job, segment: &SegmentScript) -> WorkerResult<SegmentAsset> {
        let media = self
            .providers
            .speech
            .synthesize(&segment.narration, &job.voice_id())
            .await?;

        let key = keys::audio_segment(&job.output_folder, segment.index);
        self.storage
            .upload_bytes(media.bytes, &key, keys::content_type_for(&key))
            .await?;
        Ok(SegmentAsset::ok(segment.index, key))
    }

    async fn illustrate_segment(&self, job: &Job, segment: &SegmentScript) -> WorkerResult<SegmentAsset> {
        let media = self
            .providers
            .images
            .generate_image(&segment.image_prompt)
            .await?;

        let key = keys::image_segment(&job.output_folder, segment.index, &media.extension);
        self.storage
            .upload_bytes(media.bytes, &key, keys::content_type_for(&key))
            .await?;
        Ok(SegmentAsset::ok(segment.index, key))
    }

    async fn animate_segment(
        &self,
        job: &Job,
        segment: &SegmentScript,
        images: &ImageManifest,
        generator: &dyn VideoGenerator,
    ) -> WorkerResult<SegmentAsset> {
        let image_key = images.key_for(segment.index).ok_or_else(|| {
            WorkerError::processing_failed(format!("segment {} has no image", segment.index))
        })?;
        let reference = self
            .storage
            .presign_get(image_key, self.config.reference_url_ttl)
            .await?;

        let media = generator
            .generate_clip(segment.video_prompt_or_image(), Some(&reference))
            .await?;

        let key = keys::video_segment(&job.output_folder, segment.index);
        self.storage
            .upload_bytes(media.bytes, &key, keys::content_type_for(&key))
            .await?;
        Ok(SegmentAsset::ok(segment.index, key))
    }
}
