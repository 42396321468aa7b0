//! FFmpeg CLI wrapper for ScriptReel rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Ken Burns and speed-matching filter builders
//! - Stitching primitives used by the worker

pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod kenburns;
pub mod mix;
pub mod probe;
pub mod progress;
pub mod settings;
pub mod speed;
pub mod stitch;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use kenburns::{KenBurns, KenBurnsDirection};
pub use mix::MixGains;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use settings::RenderSettings;
pub use speed::{atempo_chain, setpts_expr, AlignMode, SpeedMatch};
pub use stitch::{
    align_to_voiceover, concat_audio, concat_segments, mix_background_music,
    render_still_segment, render_video_segment,
};
