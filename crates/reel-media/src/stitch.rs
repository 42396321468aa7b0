//! Stitching primitives: per-segment renders, concat, alignment, music.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::concat_with_fallback;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_nonempty, move_file};
use crate::kenburns::KenBurns;
use crate::mix::{amix_filter, MixGains, MIX_OUTPUT_LABEL};
use crate::probe::get_duration;
use crate::settings::RenderSettings;
use crate::speed::{AlignMode, SpeedMatch};

fn encode_video(cmd: FfmpegCommand, settings: &RenderSettings) -> FfmpegCommand {
    cmd.video_codec("libx264")
        .preset(settings.preset.clone())
        .crf(settings.crf)
        .pixel_format("yuv420p")
        .frame_rate(settings.fps)
}

fn encode_audio(cmd: FfmpegCommand, settings: &RenderSettings) -> FfmpegCommand {
    // Fixed sample layout so stream-copy concat works across segments
    cmd.audio_codec("aac")
        .audio_bitrate(settings.audio_bitrate.clone())
        .output_args(["-ar", "44100", "-ac", "2"])
}

/// Render a still image as a Ken Burns clip muxed with its narration.
///
/// Returns the rendered duration in seconds.
pub async fn render_still_segment(
    runner: &FfmpegRunner,
    index: usize,
    image: &Path,
    audio: &Path,
    output: &Path,
    settings: &RenderSettings,
) -> MediaResult<f64> {
    let duration = get_duration(audio).await?;
    let kb = KenBurns::new(duration, index, settings)?;
    debug!(
        segment = index,
        frames = kb.frames,
        direction = ?kb.direction,
        "Rendering still segment"
    );

    let cmd = FfmpegCommand::new(output)
        .input(image)
        .input(audio)
        .filter_complex(format!("[0:v]{}[v]", kb.filter()))
        .map("[v]")
        .map("1:a");
    let cmd = encode_audio(encode_video(cmd, settings), settings)
        .duration(duration)
        .faststart();

    runner.run(&cmd).await?;
    ensure_nonempty(output).await?;
    Ok(duration)
}

/// Render a generated clip retimed to its narration.
///
/// The clip is sped up or slowed down with `setpts`, scaled to cover the
/// output frame, padded by cloning its last frame and cut to the narration
/// length. The clip's own audio is discarded.
pub async fn render_video_segment(
    runner: &FfmpegRunner,
    index: usize,
    clip: &Path,
    audio: &Path,
    output: &Path,
    settings: &RenderSettings,
) -> MediaResult<f64> {
    let audio_duration = get_duration(audio).await?;
    let clip_duration = get_duration(clip).await?;
    let speed = SpeedMatch::new(clip_duration, audio_duration)?;
    debug!(
        segment = index,
        factor = speed.factor(),
        "Rendering video segment"
    );

    let mut chain = Vec::new();
    if speed.needs_adjustment() {
        chain.push(speed.video_filter());
    }
    chain.push(settings.cover_filter());
    chain.push(format!("fps={}", settings.fps));
    chain.push(format!(
        "tpad=stop_mode=clone:stop_duration={:.3}",
        audio_duration
    ));
    chain.push("format=yuv420p".to_string());

    let cmd = FfmpegCommand::new(output)
        .input(clip)
        .input(audio)
        .filter_complex(format!("[0:v]{}[v]", chain.join(",")))
        .map("[v]")
        .map("1:a");
    let cmd = encode_audio(encode_video(cmd, settings), settings)
        .duration(audio_duration)
        .faststart();

    runner.run(&cmd).await?;
    ensure_nonempty(output).await?;
    Ok(audio_duration)
}

/// Concatenate rendered segments in order.
///
/// The inputs are consumed: a single segment is moved into place as is.
pub async fn concat_segments(
    runner: &FfmpegRunner,
    segments: &[PathBuf],
    output: &Path,
) -> MediaResult<()> {
    match segments {
        [] => return Err(MediaError::invalid_input("no segments to concatenate")),
        [only] => move_file(only, output).await?,
        _ => concat_with_fallback(runner, segments, output).await?,
    }
    ensure_nonempty(output).await?;
    Ok(())
}

/// Concatenate narration clips into one voiceover track.
pub async fn concat_audio(
    runner: &FfmpegRunner,
    clips: &[PathBuf],
    output: &Path,
) -> MediaResult<()> {
    let list = output.with_extension("concat.txt");
    crate::concat::write_concat_list(clips, &list).await?;

    // Always re-encode: TTS providers mix sample rates between calls
    let cmd = FfmpegCommand::new(output)
        .concat_demuxer()
        .input(&list)
        .output_arg("-vn")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-ar", "44100", "-ac", "2"]);
    let result = runner.run(&cmd).await;
    let _ = tokio::fs::remove_file(&list).await;
    result?;

    ensure_nonempty(output).await?;
    Ok(())
}

/// Replace the audio of `video` with `voice`, retiming one onto the other.
///
/// Returns the speed factor that was applied (1.0 when within tolerance).
pub async fn align_to_voiceover(
    runner: &FfmpegRunner,
    video: &Path,
    voice: &Path,
    output: &Path,
    mode: AlignMode,
    settings: &RenderSettings,
) -> MediaResult<f64> {
    let video_duration = get_duration(video).await?;
    let voice_duration = get_duration(voice).await?;
    let speed = SpeedMatch::new(video_duration, voice_duration)?;

    let base = FfmpegCommand::new(output).input(video).input(voice);

    let cmd = if !speed.needs_adjustment() {
        encode_audio(base.map("0:v").map("1:a").video_codec("copy"), settings).shortest()
    } else {
        match mode {
            AlignMode::VideoToAudio => {
                let cmd = base
                    .filter_complex(format!("[0:v]{}[v]", speed.video_filter()))
                    .map("[v]")
                    .map("1:a");
                encode_audio(encode_video(cmd, settings), settings).duration(voice_duration)
            }
            AlignMode::AudioToVideo => {
                let cmd = base
                    .filter_complex(format!("[1:a]{}[a]", speed.audio_filter()?))
                    .map("0:v")
                    .map("[a]")
                    .video_codec("copy");
                encode_audio(cmd, settings).duration(video_duration)
            }
        }
    };

    runner.run(&cmd.faststart()).await?;
    ensure_nonempty(output).await?;

    let applied = if speed.needs_adjustment() {
        speed.factor()
    } else {
        1.0
    };
    info!(
        video_duration,
        voice_duration,
        factor = applied,
        mode = ?mode,
        "Aligned video to voiceover"
    );
    Ok(applied)
}

/// Mix looped background music under the existing audio track.
pub async fn mix_background_music(
    runner: &FfmpegRunner,
    video: &Path,
    music: &Path,
    output: &Path,
    gains: MixGains,
    settings: &RenderSettings,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .input(video)
        .stream_loop()
        .input(music)
        .filter_complex(amix_filter(gains))
        .map("0:v")
        .map(MIX_OUTPUT_LABEL)
        .video_codec("copy");
    let cmd = encode_audio(cmd, settings).faststart();

    runner.run(&cmd).await?;
    ensure_nonempty(output).await?;
    Ok(())
}
