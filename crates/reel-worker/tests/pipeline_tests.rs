//! Pipeline runs against in-memory backends and scripted providers.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;

use reel_jobstore::{JobStore, MemoryJobStore};
use reel_models::{
    CreateJobRequest, Job, JobStatus, LogLevel, ScriptDocument, SegmentScript, VoiceId,
};
use reel_providers::{
    GeneratedMedia, ImageGenerator, ProviderError, ProviderResult, ScriptWriter,
    SpeechSynthesizer, VideoGenerator,
};
use reel_storage::{MemoryStore, ObjectStore};
use reel_worker::{JobLogger, Pipeline, Providers, WorkerConfig, WorkerError};

struct FakeWriter {
    fail: bool,
}

#[async_trait]
impl ScriptWriter for FakeWriter {
    async fn write_script(&self, script: &str, segment_count: u32) -> ProviderResult<ScriptDocument> {
        if self.fail {
            return Err(ProviderError::Unauthorized("openrouter"));
        }
        let segments = script
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, line)| SegmentScript {
                index: i as u32,
                narration: line.to_string(),
                image_prompt: format!("illustration of {}", line),
                video_prompt: None,
            })
            .collect();
        Ok(ScriptDocument {
            title: "Test".to_string(),
            segments,
        }
        .normalize(segment_count as usize)?)
    }
}

/// Narrates everything except text containing "mute"; the first call can
/// be made to fail once with a 503.
struct FakeSpeech {
    calls: AtomicUsize,
    flaky_first_call: bool,
    media: Option<Vec<u8>>,
}

impl FakeSpeech {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            flaky_first_call: false,
            media: None,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> ProviderResult<GeneratedMedia> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.flaky_first_call && call == 0 {
            return Err(ProviderError::from_http_status("tts", 503, "busy", None));
        }
        if text.contains("mute") {
            return Err(ProviderError::from_http_status("tts", 400, "rejected text", None));
        }
        let bytes = self
            .media
            .clone()
            .unwrap_or_else(|| format!("{}:{}", voice, text).into_bytes());
        Ok(GeneratedMedia::new(bytes, "mp3"))
    }
}

struct FakeImages {
    fail_all: bool,
    calls: AtomicUsize,
    media: Option<Vec<u8>>,
}

impl FakeImages {
    fn new(fail_all: bool) -> Self {
        Self {
            fail_all,
            calls: AtomicUsize::new(0),
            media: None,
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate_image(&self, prompt: &str) -> ProviderResult<GeneratedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(ProviderError::from_http_status("image", 400, "content policy", None));
        }
        let bytes = self.media.clone().unwrap_or_else(|| prompt.as_bytes().to_vec());
        Ok(GeneratedMedia::new(bytes, "png"))
    }
}

#[derive(Default)]
struct FakeVideo {
    references: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl VideoGenerator for FakeVideo {
    async fn generate_clip(&self, prompt: &str, image_url: Option<&str>) -> ProviderResult<GeneratedMedia> {
        if let Some(url) = image_url {
            self.references.lock().unwrap().push(url.to_string());
        }
        Ok(GeneratedMedia::new(prompt.as_bytes().to_vec(), "mp4"))
    }
}

/// Fails every task the way a moderation filter does.
#[derive(Default)]
struct RejectingVideo {
    calls: AtomicUsize,
}

#[async_trait]
impl VideoGenerator for RejectingVideo {
    async fn generate_clip(&self, _: &str, _: Option<&str>) -> ProviderResult<GeneratedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::TaskFailed(
            "task t1: content moderation rejected prompt".to_string(),
        ))
    }
}

/// Returns bytes no decoder accepts.
struct BrokenClips;

#[async_trait]
impl VideoGenerator for BrokenClips {
    async fn generate_clip(&self, _: &str, _: Option<&str>) -> ProviderResult<GeneratedMedia> {
        Ok(GeneratedMedia::new(b"not a video".to_vec(), "mp4"))
    }
}

fn test_config() -> WorkerConfig {
    WorkerConfig {
        segment_delay: Duration::ZERO,
        segment_retries: 1,
        retry_base_delay: Duration::from_millis(1),
        ..WorkerConfig::default()
    }
}

struct Harness {
    pipeline: Pipeline,
    jobs: Arc<MemoryJobStore>,
    storage: Arc<MemoryStore>,
}

fn harness(config: WorkerConfig, providers: Providers) -> Harness {
    let jobs = Arc::new(MemoryJobStore::new());
    let storage = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        config,
        jobs.clone() as Arc<dyn JobStore>,
        storage.clone() as Arc<dyn ObjectStore>,
        providers,
    );
    Harness {
        pipeline,
        jobs,
        storage,
    }
}

fn providers(speech: FakeSpeech, images: FakeImages, video: Option<Arc<FakeVideo>>) -> Providers {
    Providers {
        writer: Arc::new(FakeWriter { fail: false }),
        speech: Arc::new(speech),
        images: Arc::new(images),
        video: video.map(|v| v as Arc<dyn VideoGenerator>),
    }
}

async fn create_job(jobs: &MemoryJobStore, script: &str, segment_count: u32) -> Job {
    let job = Job::new(CreateJobRequest {
        script: script.to_string(),
        voice: "voice-1".to_string(),
        segment_count,
    })
    .unwrap();
    jobs.create(&job).await.unwrap()
}

#[tokio::test]
async fn test_generation_stages_skip_failed_segment() {
    let video = Arc::new(FakeVideo::default());
    let h = harness(
        test_config(),
        providers(FakeSpeech::new(), FakeImages::new(false), Some(video.clone())),
    );
    let job = create_job(&h.jobs, "A fox runs. The mute owl sleeps. Morning comes.", 3).await;
    let logger = JobLogger::new(&job.id, "test");

    let doc = h.pipeline.generate_jsons(&job, &logger).await.unwrap();
    assert_eq!(doc.len(), 3);

    let voice = h.pipeline.generate_voice(&job, &doc, &logger).await.unwrap();
    assert_eq!(voice.succeeded(), 2);
    assert_eq!(voice.failed(), 1);
    assert!(voice.key_for(1).is_none());

    let images = h.pipeline.generate_images(&job, &doc, &voice, &logger).await.unwrap();
    // The unnarrated segment gets no image
    assert_eq!(images.segments.len(), 2);
    assert!(images.key_for(0).unwrap().ends_with("images/000.png"));

    let videos = h.pipeline.generate_videos(&job, &doc, &images, &logger).await.unwrap();
    assert_eq!(videos.succeeded(), 2);
    let references = video.references.lock().unwrap().clone();
    assert_eq!(references.len(), 2);
    assert!(references[0].starts_with("memory://"));

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::GeneratingVideos);
    assert!(stored.assets.segments_key.is_some());
    assert!(stored.assets.voice_key.is_some());
    assert!(stored.assets.images_key.is_some());
    assert!(stored.assets.videos_key.is_some());
    assert!(stored
        .logs
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.message.starts_with("Segment 2 failed")));

    let keys = h.storage.list_keys(&job.output_folder).await.unwrap();
    for expected in ["segments.json", "voice.json", "images.json", "videos.json", "audio/000.mp3", "videos/002.mp4"] {
        assert!(
            keys.iter().any(|k| k.ends_with(expected)),
            "missing {} in {:?}",
            expected,
            keys
        );
    }
}

#[tokio::test]
async fn test_transient_segment_failure_is_retried() {
    let mut speech = FakeSpeech::new();
    speech.flaky_first_call = true;
    let h = harness(test_config(), providers(speech, FakeImages::new(false), None));
    let job = create_job(&h.jobs, "One. Two.", 2).await;
    let logger = JobLogger::new(&job.id, "test");

    let doc = h.pipeline.generate_jsons(&job, &logger).await.unwrap();
    let voice = h.pipeline.generate_voice(&job, &doc, &logger).await.unwrap();
    assert_eq!(voice.succeeded(), 2);
}

#[tokio::test]
async fn test_video_stage_disabled() {
    let images = FakeImages::new(false);
    let h = harness(test_config(), providers(FakeSpeech::new(), images, None));
    let job = create_job(&h.jobs, "One. Two.", 2).await;
    let logger = JobLogger::new(&job.id, "test");

    let doc = h.pipeline.generate_jsons(&job, &logger).await.unwrap();
    let voice = h.pipeline.generate_voice(&job, &doc, &logger).await.unwrap();
    let images = h.pipeline.generate_images(&job, &doc, &voice, &logger).await.unwrap();
    let videos = h.pipeline.generate_videos(&job, &doc, &images, &logger).await.unwrap();

    assert!(videos.segments.is_empty());
    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::GeneratingVideos);
    assert!(stored.assets.videos_key.is_none());
    assert!(stored.logs.iter().any(|l| l.message.contains("disabled")));
}

#[tokio::test]
async fn test_failed_clip_task_is_not_resubmitted() {
    let video = Arc::new(RejectingVideo::default());
    let mut p = providers(FakeSpeech::new(), FakeImages::new(false), None);
    p.video = Some(video.clone());
    let mut config = test_config();
    config.segment_retries = 2;
    let h = harness(config, p);
    let job = create_job(&h.jobs, "Only line.", 1).await;
    let logger = JobLogger::new(&job.id, "test");

    let doc = h.pipeline.generate_jsons(&job, &logger).await.unwrap();
    let voice = h.pipeline.generate_voice(&job, &doc, &logger).await.unwrap();
    let images = h.pipeline.generate_images(&job, &doc, &voice, &logger).await.unwrap();
    let videos = h.pipeline.generate_videos(&job, &doc, &images, &logger).await.unwrap();

    assert_eq!(video.calls.load(Ordering::SeqCst), 1);
    assert_eq!(videos.succeeded(), 0);
    assert_eq!(videos.failed(), 1);
}

#[tokio::test]
async fn test_script_failure_fails_job() {
    let mut p = providers(FakeSpeech::new(), FakeImages::new(false), None);
    p.writer = Arc::new(FakeWriter { fail: true });
    let h = harness(test_config(), p);
    let job = create_job(&h.jobs, "Anything at all.", 1).await;

    let err = h.pipeline.run(&job.id).await.unwrap_err();
    assert!(matches!(err, WorkerError::JobFailed(_)));

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("openrouter"));
}

#[tokio::test]
async fn test_all_voice_failures_fail_job() {
    let images = FakeImages::new(false);
    let h = harness(test_config(), providers(FakeSpeech::new(), images, None));
    let job = create_job(&h.jobs, "The mute start. The mute end.", 2).await;

    h.pipeline.run(&job.id).await.unwrap_err();

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("no narration audio"));
}

#[tokio::test]
async fn test_no_images_fails_job_before_rendering() {
    let h = harness(test_config(), providers(FakeSpeech::new(), FakeImages::new(true), None));
    let job = create_job(&h.jobs, "First. Second.", 2).await;

    h.pipeline.run(&job.id).await.unwrap_err();

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("no images"));
    assert!(stored.output_video_key.is_none());
}

#[tokio::test]
async fn test_finished_job_is_refused() {
    let h = harness(test_config(), providers(FakeSpeech::new(), FakeImages::new(false), None));
    let job = create_job(&h.jobs, "Done already.", 1).await;
    h.jobs.fail(&job.id, "earlier failure").await.unwrap();

    let err = h.pipeline.run(&job.id).await.unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyFinished(JobStatus::Error)));

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.error_message.as_deref(), Some("earlier failure"));
}

#[tokio::test]
async fn test_interrupted_job_is_failed() {
    let images = FakeImages::new(false);
    let h = harness(test_config(), providers(FakeSpeech::new(), images, None));
    let job = create_job(&h.jobs, "Half done.", 1).await;
    h.jobs.transition(&job.id, JobStatus::GeneratingVoice).await.unwrap();

    h.pipeline.run(&job.id).await.unwrap_err();

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("interrupted"));
}

fn synth(args: &[&str], out: &Path) -> Vec<u8> {
    let status = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi"])
        .args(args)
        .arg(out)
        .status()
        .unwrap();
    assert!(status.success());
    std::fs::read(out).unwrap()
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_full_run_produces_video() {
    let tmp = tempfile::tempdir().unwrap();
    let tone = synth(&["-i", "sine=frequency=440:duration=1.5"], &tmp.path().join("tone.mp3"));
    let still = synth(
        &["-i", "color=c=steelblue:s=320x240", "-frames:v", "1"],
        &tmp.path().join("still.png"),
    );

    let mut speech = FakeSpeech::new();
    speech.media = Some(tone);
    let mut images = FakeImages::new(false);
    images.media = Some(still);

    let mut config = test_config();
    config.work_dir = tmp.path().join("work");
    config.render.width = 320;
    config.render.height = 240;
    config.render.preset = "ultrafast".to_string();

    let h = harness(config, providers(speech, images, None));
    let job = create_job(&h.jobs, "Opening line. The mute middle. Closing line.", 3).await;

    h.pipeline.run(&job.id).await.unwrap();

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert_eq!(stored.progress, 100);
    let key = stored.output_video_key.unwrap();
    assert!(key.ends_with("final.mp4"));
    assert!(!h.storage.download_bytes(&key).await.unwrap().is_empty());
    assert!(stored.logs.iter().any(|l| l.message.contains("Dropping segment(s) 2")));
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_unplayable_clip_falls_back_to_still() {
    let tmp = tempfile::tempdir().unwrap();
    let tone = synth(&["-i", "sine=frequency=440:duration=1.5"], &tmp.path().join("tone.mp3"));
    let still = synth(
        &["-i", "color=c=darkgreen:s=320x240", "-frames:v", "1"],
        &tmp.path().join("still.png"),
    );

    let mut speech = FakeSpeech::new();
    speech.media = Some(tone);
    let mut images = FakeImages::new(false);
    images.media = Some(still);
    let mut p = providers(speech, images, None);
    p.video = Some(Arc::new(BrokenClips));

    let mut config = test_config();
    config.work_dir = tmp.path().join("work");
    config.render.width = 320;
    config.render.height = 240;
    config.render.preset = "ultrafast".to_string();

    let h = harness(config, p);
    let job = create_job(&h.jobs, "First scene. Second scene.", 2).await;

    h.pipeline.run(&job.id).await.unwrap();

    let stored = h.jobs.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert!(stored.assets.videos_key.is_some());
    assert!(!stored.logs.iter().any(|l| l.message.contains("skipped at render")));
    let key = stored.output_video_key.unwrap();
    assert!(!h.storage.download_bytes(&key).await.unwrap().is_empty());
}

#[test]
fn test_failed_stitch_still_records_stage_time() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let tmp = tempfile::tempdir().unwrap();

    let mut config = test_config();
    config.work_dir = tmp.path().join("work");
    // Narration and images are not decodable, so no segment renders
    let h = harness(config, providers(FakeSpeech::new(), FakeImages::new(false), None));
    let stored = metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let job = create_job(&h.jobs, "Only line.", 1).await;
            h.pipeline.run(&job.id).await.unwrap_err();
            h.jobs.require(&job.id).await.unwrap()
        })
    });

    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("no segment could be rendered"));
    let rendered = handle.render();
    let stitching = rendered.lines().any(|line| {
        line.starts_with("reel_worker_stage_duration_seconds")
            && line.contains("stage=\"stitching\"")
    });
    assert!(stitching, "{}", rendered);
}
