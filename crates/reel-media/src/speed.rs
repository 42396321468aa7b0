//! Speed matching between video and narration.
//!
//! With `factor = video / audio`:
//! - `setpts=PTS/factor` retimes the video to the audio length;
//! - `atempo=1/factor` retimes the audio to the video length, chained
//!   because a single `atempo` only accepts `[0.5, 2.0]`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{MediaError, MediaResult};

/// Relative difference below which no retiming is applied.
pub const SPEED_TOLERANCE: f64 = 0.01;

/// Bounds of a single `atempo` stage.
pub const ATEMPO_MIN: f64 = 0.5;
pub const ATEMPO_MAX: f64 = 2.0;

/// Which stream is stretched to match the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    /// Retime the video to the narration (`setpts`)
    #[default]
    VideoToAudio,
    /// Retime the narration to the video (`atempo`)
    AudioToVideo,
}

impl FromStr for AlignMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video_to_audio" | "video" => Ok(Self::VideoToAudio),
            "audio_to_video" | "audio" => Ok(Self::AudioToVideo),
            other => Err(MediaError::invalid_input(format!("Unknown align mode: {other}"))),
        }
    }
}

/// Speed relationship between a video and its narration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedMatch {
    pub video_duration: f64,
    pub audio_duration: f64,
}

impl SpeedMatch {
    pub fn new(video_duration: f64, audio_duration: f64) -> MediaResult<Self> {
        for (name, value) in [("video", video_duration), ("audio", audio_duration)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MediaError::invalid_input(format!(
                    "{name} duration must be positive, got {value}"
                )));
            }
        }
        Ok(Self {
            video_duration,
            audio_duration,
        })
    }

    /// `video / audio`. Above 1 the video must speed up.
    pub fn factor(&self) -> f64 {
        self.video_duration / self.audio_duration
    }

    /// Tempo that stretches the audio onto the video.
    pub fn audio_tempo(&self) -> f64 {
        self.audio_duration / self.video_duration
    }

    pub fn needs_adjustment(&self) -> bool {
        (self.factor() - 1.0).abs() > SPEED_TOLERANCE
    }

    /// Video filter retiming the video onto the audio.
    pub fn video_filter(&self) -> String {
        setpts_expr(self.factor())
    }

    /// Audio filter retiming the audio onto the video.
    pub fn audio_filter(&self) -> MediaResult<String> {
        atempo_filter(self.audio_tempo())
    }
}

/// `setpts` expression dividing timestamps by `factor`.
pub fn setpts_expr(factor: f64) -> String {
    format!("setpts=PTS/{:.6}", factor)
}

/// Split `tempo` into `atempo` stages that each stay within bounds.
pub fn atempo_chain(tempo: f64) -> MediaResult<Vec<f64>> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(MediaError::invalid_input(format!(
            "atempo must be positive, got {tempo}"
        )));
    }

    let mut remaining = tempo;
    let mut chain = Vec::new();
    while remaining > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    chain.push(remaining);
    Ok(chain)
}

/// Comma-joined `atempo` filter chain.
pub fn atempo_filter(tempo: f64) -> MediaResult<String> {
    Ok(atempo_chain(tempo)?
        .iter()
        .map(|t| format!("atempo={:.6}", t))
        .collect::<Vec<_>>()
        .join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(chain: &[f64]) -> f64 {
        chain.iter().product()
    }

    #[test]
    fn test_factor_and_tolerance() {
        let m = SpeedMatch::new(33.0, 30.0).unwrap();
        assert!((m.factor() - 1.1).abs() < 1e-9);
        assert!(m.needs_adjustment());
        assert_eq!(m.video_filter(), "setpts=PTS/1.100000");

        let m = SpeedMatch::new(30.2, 30.0).unwrap();
        assert!(!m.needs_adjustment());
    }

    #[test]
    fn test_atempo_chain_in_range() {
        assert_eq!(atempo_chain(1.25).unwrap(), vec![1.25]);
        assert_eq!(atempo_chain(2.0).unwrap(), vec![2.0]);
        assert_eq!(atempo_chain(0.5).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_atempo_chain_splits() {
        for tempo in [5.0, 4.0, 2.5, 0.3, 0.1, 0.26] {
            let chain = atempo_chain(tempo).unwrap();
            assert!(chain.len() > 1, "tempo {tempo}");
            assert!(chain
                .iter()
                .all(|t| (ATEMPO_MIN..=ATEMPO_MAX).contains(t)));
            assert!((product(&chain) - tempo).abs() < 1e-9, "tempo {tempo}");
        }
    }

    #[test]
    fn test_atempo_filter_text() {
        assert_eq!(
            atempo_filter(3.0).unwrap(),
            "atempo=2.000000,atempo=1.500000"
        );
        assert!(atempo_filter(0.0).is_err());
    }

    #[test]
    fn test_audio_tempo_inverts_factor() {
        let m = SpeedMatch::new(20.0, 50.0).unwrap();
        assert!((m.factor() * m.audio_tempo() - 1.0).abs() < 1e-12);
        // 2.5x needs two stages
        assert_eq!(m.audio_filter().unwrap().matches("atempo").count(), 2);
    }

    #[test]
    fn test_rejects_zero_durations() {
        assert!(SpeedMatch::new(0.0, 1.0).is_err());
        assert!(SpeedMatch::new(1.0, -1.0).is_err());
    }

    #[test]
    fn test_align_mode_parse() {
        assert_eq!("audio_to_video".parse::<AlignMode>().unwrap(), AlignMode::AudioToVideo);
        assert_eq!("VIDEO".parse::<AlignMode>().unwrap(), AlignMode::VideoToAudio);
        assert!("sideways".parse::<AlignMode>().is_err());
    }
}
