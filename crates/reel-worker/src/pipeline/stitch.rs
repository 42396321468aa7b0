//! Stage 5: assemble the final video.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use reel_media::{
    align_to_voiceover, concat_audio, concat_segments, mix_background_music,
    render_still_segment, render_video_segment, FfmpegRunner,
};
use reel_models::{ImageManifest, Job, JobLogEntry, JobStatus, ScriptDocument, VideoManifest, VoiceManifest};
use reel_storage::keys;

use super::Pipeline;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::plan::{reconcile, PlannedSegment};

/// Downloads for one run, keyed by storage key so borrowed images are
/// fetched once.
struct AssetCache<'a> {
    pipeline: &'a Pipeline,
    folder: &'a str,
    dir: PathBuf,
    files: HashMap<String, PathBuf>,
}

impl<'a> AssetCache<'a> {
    fn new(pipeline: &'a Pipeline, folder: &'a str, dir: PathBuf) -> Self {
        Self {
            pipeline,
            folder,
            dir,
            files: HashMap::new(),
        }
    }

    async fn fetch(&mut self, key: &str) -> WorkerResult<PathBuf> {
        if let Some(path) = self.files.get(key) {
            return Ok(path.clone());
        }

        let relative = key
            .strip_prefix(self.folder)
            .unwrap_or(key)
            .trim_start_matches('/')
            .replace('/', "_");
        let path = self.dir.join(relative);
        self.pipeline.storage.download_file(key, &path).await?;
        self.files.insert(key.to_string(), path.clone());
        Ok(path)
    }
}

impl Pipeline {
    /// Render, join and upload the final video. Returns its storage key.
    pub async fn stitch(
        &self,
        job: &Job,
        doc: &ScriptDocument,
        voice: &VoiceManifest,
        images: &ImageManifest,
        videos: &VideoManifest,
        logger: &JobLogger,
    ) -> WorkerResult<String> {
        let stage = JobStatus::Stitching;
        let started = self.enter(job, stage, logger).await?;
        let logger = logger.for_stage(stage);

        let plan = reconcile(doc.len() as u32, voice, images, videos)?;
        if !plan.dropped.is_empty() {
            let numbers: Vec<String> = plan.dropped.iter().map(|i| (i + 1).to_string()).collect();
            self.note(
                job,
                JobLogEntry::warn(format!(
                    "Dropping segment(s) {} without narration",
                    numbers.join(", ")
                )),
            )
            .await;
        }
        if plan.borrowed() > 0 {
            self.note(
                job,
                JobLogEntry::warn(format!(
                    "{} segment(s) reuse a neighbouring image",
                    plan.borrowed()
                )),
            )
            .await;
        }
        logger.log_progress(&format!(
            "rendering {} segments ({} from clips)",
            plan.len(),
            plan.clips()
        ));

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir_in(&self.config.work_dir)?;

        let result = self.render_and_upload(job, &plan.segments, &work, &logger).await;

        if self.config.keep_work_dir {
            let kept = work.into_path();
            info!(job_id = %job.id, path = %kept.display(), "Keeping work dir");
        }

        self.leave(stage, started);
        let output_key = result?;
        self.jobs.complete(&job.id, &output_key).await?;
        self.note(job, JobLogEntry::info("Final video uploaded")).await;
        Ok(output_key)
    }

    async fn render_and_upload(
        &self,
        job: &Job,
        segments: &[PlannedSegment],
        work: &TempDir,
        logger: &JobLogger,
    ) -> WorkerResult<String> {
        let assets_dir = work.path().join("assets");
        let render_dir = work.path().join("render");
        tokio::fs::create_dir_all(&assets_dir).await?;
        tokio::fs::create_dir_all(&render_dir).await?;

        let runner = FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout.as_secs());
        let mut cache = AssetCache::new(self, &job.output_folder, assets_dir);

        let mut rendered = Vec::with_capacity(segments.len());
        let mut narration = Vec::with_capacity(segments.len());

        // Rendering takes the first 90% of the stage; the rest is joining
        let render_units = segments.len() * 10 / 9 + 1;

        for (n, segment) in segments.iter().enumerate() {
            let output = render_dir.join(format!("segment_{:03}.mp4", segment.index));
            match self
                .render_segment(&runner, &mut cache, segment, &output)
                .await
            {
                Ok((audio, duration)) => {
                    debug!(segment = segment.index, duration, "Rendered segment");
                    rendered.push(output);
                    narration.push(audio);
                }
                Err(e) => {
                    let message = e.to_string();
                    logger.log_segment_failure(segment.index, &message);
                    metrics::record_segment_failure(JobStatus::Stitching.as_str());
                    self.note(
                        job,
                        JobLogEntry::warn(format!(
                            "Segment {} skipped at render: {}",
                            segment.index + 1,
                            message
                        )),
                    )
                    .await;
                }
            }
            self.report_progress(job, JobStatus::Stitching, n + 1, render_units)
                .await;
        }

        if rendered.is_empty() {
            return Err(WorkerError::job_failed("no segment could be rendered"));
        }

        let joined = work.path().join("joined.mp4");
        concat_segments(&runner, &rendered, &joined).await?;

        let voiceover = work.path().join("voiceover.m4a");
        concat_audio(&runner, &narration, &voiceover).await?;

        let aligned = work.path().join("aligned.mp4");
        let factor = align_to_voiceover(
            &runner,
            &joined,
            &voiceover,
            &aligned,
            self.config.align_mode,
            &self.config.render,
        )
        .await?;
        if (factor - 1.0).abs() > f64::EPSILON {
            logger.log_progress(&format!("retimed by {:.3}", factor));
        }

        let final_path = match self.config.music_key.as_deref() {
            Some(music_key) => {
                self.add_music(&runner, &mut cache, music_key, &aligned, work.path(), logger)
                    .await
            }
            None => aligned,
        };

        let output_key = keys::final_video(&job.output_folder);
        self.storage.upload_file(&final_path, &output_key).await?;
        info!(job_id = %job.id, key = %output_key, segments = rendered.len(), "Uploaded final video");
        Ok(output_key)
    }

    /// Render one planned segment. Returns its narration file and duration.
    async fn render_segment(
        &self,
        runner: &FfmpegRunner,
        cache: &mut AssetCache<'_>,
        segment: &PlannedSegment,
        output: &Path,
    ) -> WorkerResult<(PathBuf, f64)> {
        let index = segment.index as usize;
        let audio = cache.fetch(&segment.audio_key).await?;
        let image = cache.fetch(&segment.image_key).await?;
        let settings = &self.config.render;

        if let Some(clip_key) = &segment.clip_key {
            let clip = cache.fetch(clip_key).await;
            let rendered = match clip {
                Ok(clip) => render_video_segment(runner, index, &clip, &audio, output, settings)
                    .await
                    .map_err(WorkerError::from),
                Err(e) => Err(e),
            };
            match rendered {
                Ok(duration) => return Ok((audio, duration)),
                Err(e) => {
                    warn!(
                        segment = segment.index,
                        "Clip render failed, using still: {}", e
                    );
                }
            }
        }

        let duration = render_still_segment(runner, index, &image, &audio, output, settings).await?;
        Ok((audio, duration))
    }

    /// Mix background music under `video`, returning the mixed file.
    ///
    /// A missing or broken track leaves the video as it was.
    async fn add_music(
        &self,
        runner: &FfmpegRunner,
        cache: &mut AssetCache<'_>,
        music_key: &str,
        video: &Path,
        dir: &Path,
        logger: &JobLogger,
    ) -> PathBuf {
        let music = match cache.fetch(music_key).await {
            Ok(path) => path,
            Err(e) => {
                logger.log_warning(&format!("background music unavailable: {}", e));
                return video.to_path_buf();
            }
        };

        let mixed = dir.join("mixed.mp4");
        match mix_background_music(
            runner,
            video,
            &music,
            &mixed,
            self.config.music_gains,
            &self.config.render,
        )
        .await
        {
            Ok(()) => mixed,
            Err(e) => {
                logger.log_warning(&format!("music mix failed: {}", e));
                video.to_path_buf()
            }
        }
    }
}
