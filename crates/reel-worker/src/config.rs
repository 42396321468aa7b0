//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_media::{AlignMode, MixGains, RenderSettings};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Keep each job's temp dir after the run (debugging)
    pub keep_work_dir: bool,
    /// Pause between per-segment provider calls
    pub segment_delay: Duration,
    /// Extra attempts per segment after a failed provider call
    pub segment_retries: u32,
    /// Base delay of the per-segment backoff
    pub retry_base_delay: Duration,
    /// Output format of rendered video
    pub render: RenderSettings,
    /// Generate clips with the video API (stills only when false)
    pub video_generation: bool,
    /// Which stream is retimed when aligning video and voiceover
    pub align_mode: AlignMode,
    /// Storage key of a background music track
    pub music_key: Option<String>,
    /// Gains used when mixing background music
    pub music_gains: MixGains,
    /// Lifetime of presigned reference-image URLs sent to the video API
    pub reference_url_ttl: Duration,
    /// Timeout of a single ffmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Timeout of one whole pipeline run
    pub job_timeout: Duration,
    /// How often the worker scans for messages left by crashed workers
    pub claim_interval: Duration,
    /// How long a queue read blocks waiting for new jobs
    pub poll_block: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("scriptreel"),
            keep_work_dir: false,
            segment_delay: Duration::from_millis(1500),
            segment_retries: 2,
            retry_base_delay: Duration::from_secs(2),
            render: RenderSettings::default(),
            video_generation: true,
            align_mode: AlignMode::default(),
            music_key: None,
            music_gains: MixGains::default(),
            reference_url_ttl: Duration::from_secs(3600),
            ffmpeg_timeout: Duration::from_secs(900),
            job_timeout: Duration::from_secs(3 * 3600),
            claim_interval: Duration::from_secs(60),
            poll_block: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |name: &str, default: Duration| {
            env_parse::<u64>(name)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let render = RenderSettings {
            width: env_parse("RENDER_WIDTH").unwrap_or(d.render.width),
            height: env_parse("RENDER_HEIGHT").unwrap_or(d.render.height),
            fps: env_parse("RENDER_FPS").unwrap_or(d.render.fps),
            max_zoom: env_parse("KEN_BURNS_MAX_ZOOM").unwrap_or(d.render.max_zoom),
            crf: env_parse("RENDER_CRF").unwrap_or(d.render.crf),
            preset: std::env::var("RENDER_PRESET").unwrap_or(d.render.preset.clone()),
            audio_bitrate: d.render.audio_bitrate.clone(),
        };

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.work_dir),
            keep_work_dir: env_bool("WORKER_KEEP_WORK_DIR").unwrap_or(d.keep_work_dir),
            segment_delay: env_parse::<u64>("SEGMENT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.segment_delay),
            segment_retries: env_parse("SEGMENT_RETRIES").unwrap_or(d.segment_retries),
            retry_base_delay: env_parse::<u64>("SEGMENT_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.retry_base_delay),
            render,
            video_generation: env_bool("VIDEO_GENERATION").unwrap_or(d.video_generation),
            align_mode: env_parse("ALIGN_MODE").unwrap_or(d.align_mode),
            music_key: std::env::var("BACKGROUND_MUSIC_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            music_gains: MixGains {
                voice: d.music_gains.voice,
                music: env_parse("BACKGROUND_MUSIC_VOLUME").unwrap_or(d.music_gains.music),
            },
            reference_url_ttl: secs("REFERENCE_URL_TTL_SECS", d.reference_url_ttl),
            ffmpeg_timeout: secs("FFMPEG_TIMEOUT_SECS", d.ffmpeg_timeout),
            job_timeout: secs("WORKER_JOB_TIMEOUT", d.job_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", d.claim_interval),
            poll_block: secs("WORKER_POLL_BLOCK_SECS", d.poll_block),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", d.shutdown_timeout),
        }
    }
}

/// Backends the worker shares with the API: the job table and the bucket.
pub const BACKEND_VARS: [&str; 2] = ["SUPABASE_URL", "STORAGE_BUCKET"];

/// Fail unless every [`BACKEND_VARS`] entry is set.
///
/// The worker has no in-memory fallback; jobs it cannot see stay pending
/// and videos it cannot share are lost.
pub fn require_backends() -> WorkerResult<()> {
    let missing: Vec<&str> = BACKEND_VARS
        .iter()
        .copied()
        .filter(|name| std::env::var(name).map_or(true, |v| v.trim().is_empty()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkerError::config_error(format!(
            "missing required env var(s): {}",
            missing.join(", ")
        )))
    }
}
