//! FFmpeg `-progress` output parsing.

use serde::{Deserialize, Serialize};

/// Snapshot of an encode, emitted once per `progress=` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Feed one `key=value` line. Returns a snapshot when a block ends.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // ffmpeg reports microseconds under both names
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }

    /// Whether a stderr line belongs to the progress stream.
    pub fn is_progress_line(line: &str) -> bool {
        const KEYS: [&str; 12] = [
            "frame", "fps", "stream_", "bitrate", "total_size", "out_time", "dup_frames",
            "drop_frames", "speed", "progress", "out_time_us", "out_time_ms",
        ];
        match line.split_once('=') {
            Some((key, _)) => KEYS.iter().any(|k| key.starts_with(k)),
            None => false,
        }
    }

    /// Fraction of `total_secs` already encoded, in `[0, 1]`.
    pub fn fraction(&self, total_secs: f64) -> f64 {
        if self.is_complete {
            return 1.0;
        }
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / 1000.0 / total_secs).clamp(0.0, 1.0)
    }
}

/// Map a fraction onto a `[floor, ceiling]` percentage band.
pub fn scale_into(fraction: f64, floor: u8, ceiling: u8) -> u8 {
    let span = ceiling.saturating_sub(floor) as f64;
    floor.saturating_add((fraction.clamp(0.0, 1.0) * span).round() as u8).min(ceiling)
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(FfmpegProgress) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_parsing() {
        let mut progress = FfmpegProgress::default();
        assert!(progress.apply_line("frame=48").is_none());
        assert!(progress.apply_line("out_time_us=2000000").is_none());
        assert!(progress.apply_line("speed=1.5x").is_none());

        let snapshot = progress.apply_line("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 48);
        assert_eq!(snapshot.out_time_ms, 2000);
        assert!((snapshot.speed - 1.5).abs() < 1e-9);
        assert!(!snapshot.is_complete);

        progress.apply_line("speed=N/A");
        assert!((progress.speed - 1.5).abs() < 1e-9);
        assert!(progress.apply_line("progress=end").unwrap().is_complete);
    }

    #[test]
    fn test_fraction() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.fraction(10.0) - 0.5).abs() < 1e-9);
        assert!((progress.fraction(2.0) - 1.0).abs() < 1e-9);
        assert_eq!(progress.fraction(0.0), 0.0);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(FfmpegProgress::is_progress_line("out_time=00:00:01.000000"));
        assert!(FfmpegProgress::is_progress_line("stream_0_0_q=28.0"));
        assert!(!FfmpegProgress::is_progress_line("Error opening input file"));
    }

    #[test]
    fn test_scale_into() {
        assert_eq!(scale_into(0.0, 85, 100), 85);
        assert_eq!(scale_into(0.5, 85, 100), 93);
        assert_eq!(scale_into(2.0, 85, 100), 100);
    }
}
