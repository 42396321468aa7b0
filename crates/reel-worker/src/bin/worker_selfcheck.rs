//! Preflight for worker hosts: work dir, ffmpeg, backends and provider credentials.

use std::path::Path;

use anyhow::{bail, Context};

use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = reel_media::check_ffmpeg().context("ffmpeg not available")?;
    let ffprobe = reel_media::check_ffprobe().context("ffprobe not available")?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    reel_worker::config::require_backends()?;
    ensure_any_env(&["SUPABASE_SERVICE_KEY", "SUPABASE_KEY"])?;
    ensure_env_present(&["STORAGE_ENDPOINT_URL", "STORAGE_ACCESS_KEY_ID", "STORAGE_SECRET_ACCESS_KEY"])?;

    ensure_env_present(&["OPENROUTER_API_KEY"])?;
    ensure_any_env(&["IMAGE_API_KEY", "OPENAI_API_KEY"])?;
    match std::env::var("TTS_PROVIDER").as_deref() {
        Ok("openai") => ensure_env_present(&["OPENAI_API_KEY"])?,
        _ => ensure_env_present(&["ELEVENLABS_API_KEY"])?,
    }
    if config.video_generation && std::env::var("VIDEO_API_KEY").is_err() {
        println!("worker-selfcheck: VIDEO_API_KEY not set, clips will be stills");
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .with_context(|| format!("{} is not writable", path.display()))?;
    tokio::fs::remove_file(&probe).await.ok();
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            bail!("missing required env var {}", var);
        }
    }
    Ok(())
}

fn ensure_any_env(vars: &[&str]) -> anyhow::Result<()> {
    if vars.iter().any(|v| std::env::var(v).is_ok()) {
        return Ok(());
    }
    bail!("one of {} must be set", vars.join(", "))
}
