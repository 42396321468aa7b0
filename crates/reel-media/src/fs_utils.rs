//! Filesystem helpers for render outputs.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a file, falling back to copy+delete across filesystems.
///
/// The fallback copies into a sibling temp file and renames it, so the
/// destination never holds a partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            let staging = dst.with_extension("partial");
            fs::copy(src, &staging).await?;
            if let Err(e) = fs::rename(&staging, dst).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!(src = %src.display(), "Failed to remove moved source: {}", e);
            }
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Fail unless `path` exists and is non-empty.
///
/// ffmpeg occasionally exits 0 after writing nothing (e.g. every input
/// stream filtered away), so outputs are checked before use.
pub async fn ensure_nonempty(path: impl AsRef<Path>) -> MediaResult<u64> {
    let path = path.as_ref();
    let meta = fs::metadata(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
    if meta.len() == 0 {
        return Err(MediaError::InvalidMedia(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(meta.len())
}
