//! Concat demuxer helpers.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Render the body of a concat list, one `file '...'` line per input.
///
/// Single quotes in paths are closed, escaped and reopened as the concat
/// demuxer expects.
pub fn concat_list_contents(paths: &[PathBuf]) -> String {
    let mut body = String::new();
    for path in paths {
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        body.push_str("file '");
        body.push_str(&escaped);
        body.push_str("'\n");
    }
    body
}

/// Write a concat list file.
pub async fn write_concat_list(paths: &[PathBuf], list_path: impl AsRef<Path>) -> MediaResult<()> {
    if paths.is_empty() {
        return Err(MediaError::invalid_input("Nothing to concatenate"));
    }
    for path in paths {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
    }
    fs::write(list_path.as_ref(), concat_list_contents(paths)).await?;
    Ok(())
}

/// Concatenate the files named in `list` into `output`.
///
/// With `reencode` false the streams are copied, which requires every input
/// to share codecs and parameters.
pub async fn concat_files(
    runner: &FfmpegRunner,
    list: impl AsRef<Path>,
    output: impl AsRef<Path>,
    reencode: bool,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(output.as_ref())
        .concat_demuxer()
        .input(list.as_ref());

    cmd = if reencode {
        cmd.video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .pixel_format("yuv420p")
            .audio_codec("aac")
            .audio_bitrate("192k")
    } else {
        cmd.stream_copy()
    };

    runner.run(&cmd).await
}

/// Concatenate with stream copy, re-encoding if the copy fails.
pub async fn concat_with_fallback(
    runner: &FfmpegRunner,
    paths: &[PathBuf],
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let output = output.as_ref();
    let list = output.with_extension("concat.txt");
    write_concat_list(paths, &list).await?;

    let result = match concat_files(runner, &list, output, false).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Concat with stream copy failed, re-encoding: {}", e.summary());
            concat_files(runner, &list, output, true).await
        }
    };

    let _ = fs::remove_file(&list).await;

    if result.is_ok() {
        info!(
            inputs = paths.len(),
            output = %output.display(),
            "Concatenated media"
        );
    }
    result
}
