//! Object key layout.
//!
//! Every artifact of a job lives under its output folder:
//!
//! ```text
//! jobs/{job_id}/segments.json
//! jobs/{job_id}/voice.json
//! jobs/{job_id}/images.json
//! jobs/{job_id}/videos.json
//! jobs/{job_id}/audio/000.mp3
//! jobs/{job_id}/images/000.png
//! jobs/{job_id}/videos/000.mp4
//! jobs/{job_id}/final.mp4
//! ```

use reel_models::JobId;

/// Root prefix of all job folders.
pub const JOBS_PREFIX: &str = "jobs";

/// Output folder of a job.
pub fn job_folder(job_id: &JobId) -> String {
    format!("{}/{}", JOBS_PREFIX, job_id)
}

fn join(folder: &str, rest: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), rest)
}

pub fn segments_json(folder: &str) -> String {
    join(folder, "segments.json")
}

pub fn voice_json(folder: &str) -> String {
    join(folder, "voice.json")
}

pub fn images_json(folder: &str) -> String {
    join(folder, "images.json")
}

pub fn videos_json(folder: &str) -> String {
    join(folder, "videos.json")
}

pub fn audio_segment(folder: &str, index: u32) -> String {
    join(folder, &format!("audio/{:03}.mp3", index))
}

pub fn image_segment(folder: &str, index: u32, extension: &str) -> String {
    join(folder, &format!("images/{:03}.{}", index, extension))
}

pub fn video_segment(folder: &str, index: u32) -> String {
    join(folder, &format!("videos/{:03}.mp4", index))
}

pub fn final_video(folder: &str) -> String {
    join(folder, "final.mp4")
}

/// Content type for a key, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) => match ext.as_str() {
            "json" => "application/json",
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "m4a" => "audio/mp4",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "mp4" => "video/mp4",
            _ => "application/octet-stream",
        },
        None => "application/octet-stream",
    }
}

/// File name component of a key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let folder = job_folder(&JobId::from_string("abc"));
        assert_eq!(folder, "jobs/abc");
        assert_eq!(segments_json(&folder), "jobs/abc/segments.json");
        assert_eq!(audio_segment(&folder, 3), "jobs/abc/audio/003.mp3");
        assert_eq!(image_segment(&folder, 12, "png"), "jobs/abc/images/012.png");
        assert_eq!(video_segment("jobs/abc/", 0), "jobs/abc/videos/000.mp4");
        assert_eq!(final_video(&folder), "jobs/abc/final.mp4");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a/b.MP4"), "video/mp4");
        assert_eq!(content_type_for("voice.json"), "application/json");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(file_name("jobs/abc/audio/003.mp3"), "003.mp3");
    }
}
