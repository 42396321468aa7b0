//! Pan/zoom parameters for still images.
//!
//! Each still is held for exactly as many frames as its narration needs and
//! animated with `zoompan`. Motion alternates by segment index so that
//! consecutive stills do not all push in the same way.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};
use crate::settings::RenderSettings;

/// Upscale factor applied before `zoompan`. Sub-pixel crop offsets on a
/// larger canvas remove the visible stair-step jitter.
pub const PRESCALE_FACTOR: u32 = 4;

/// Motion applied to one still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsDirection {
    ZoomInCenter,
    ZoomInPanRight,
    ZoomOut,
    ZoomInPanLeft,
}

impl KenBurnsDirection {
    const CYCLE: [KenBurnsDirection; 4] = [
        KenBurnsDirection::ZoomInCenter,
        KenBurnsDirection::ZoomInPanRight,
        KenBurnsDirection::ZoomOut,
        KenBurnsDirection::ZoomInPanLeft,
    ];

    /// Direction for a segment index.
    pub fn for_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }
}

/// Computed `zoompan` parameters for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KenBurns {
    pub frames: u64,
    pub zoom_step: f64,
    pub max_zoom: f64,
    pub direction: KenBurnsDirection,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl KenBurns {
    /// Compute parameters for a still shown for `duration_secs`.
    pub fn new(duration_secs: f64, index: usize, settings: &RenderSettings) -> MediaResult<Self> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(MediaError::invalid_input(format!(
                "Ken Burns duration must be positive, got {}",
                duration_secs
            )));
        }
        if settings.fps == 0 {
            return Err(MediaError::invalid_input("fps must be positive"));
        }

        let max_zoom = settings.max_zoom.max(1.0);
        let frames = ((duration_secs * settings.fps as f64).ceil() as u64).max(1);
        let zoom_step = (max_zoom - 1.0) / frames as f64;

        Ok(Self {
            frames,
            zoom_step,
            max_zoom,
            direction: KenBurnsDirection::for_index(index),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
        })
    }

    /// Output duration implied by the frame count.
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.fps as f64
    }

    fn zoom_expr(&self) -> String {
        match self.direction {
            KenBurnsDirection::ZoomOut => {
                format!("max({:.4}-{:.8}*on,1)", self.max_zoom, self.zoom_step)
            }
            _ => format!("min(1+{:.8}*on,{:.4})", self.zoom_step, self.max_zoom),
        }
    }

    fn x_expr(&self) -> String {
        match self.direction {
            KenBurnsDirection::ZoomInPanRight => format!("(iw-iw/zoom)*on/{}", self.frames),
            KenBurnsDirection::ZoomInPanLeft => format!("(iw-iw/zoom)*(1-on/{})", self.frames),
            _ => "iw/2-(iw/zoom/2)".to_string(),
        }
    }

    fn y_expr(&self) -> &'static str {
        "ih/2-(ih/zoom/2)"
    }

    /// The `zoompan` filter alone.
    pub fn zoompan(&self) -> String {
        format!(
            "zoompan=z='{}':x='{}':y='{}':d={}:s={}x{}:fps={}",
            self.zoom_expr(),
            self.x_expr(),
            self.y_expr(),
            self.frames,
            self.width,
            self.height,
            self.fps
        )
    }

    /// Full video filter chain: pre-scale, crop to aspect, zoompan.
    pub fn filter(&self) -> String {
        let pw = self.width * PRESCALE_FACTOR;
        let ph = self.height * PRESCALE_FACTOR;
        format!(
            "scale={pw}:{ph}:force_original_aspect_ratio=increase,crop={pw}:{ph},{},setsar=1,format=yuv420p",
            self.zoompan()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RenderSettings {
        RenderSettings {
            width: 1280,
            height: 720,
            fps: 30,
            max_zoom: 1.25,
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_count_rounds_up() {
        let kb = KenBurns::new(3.01, 0, &settings()).unwrap();
        assert_eq!(kb.frames, 91);
        assert!(kb.duration_secs() >= 3.01);

        let kb = KenBurns::new(0.001, 0, &settings()).unwrap();
        assert_eq!(kb.frames, 1);
    }

    #[test]
    fn test_zoom_step_reaches_max() {
        let kb = KenBurns::new(4.0, 0, &settings()).unwrap();
        assert_eq!(kb.frames, 120);
        assert!((kb.zoom_step * kb.frames as f64 - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_direction_alternates() {
        let dirs: Vec<_> = (0..5).map(KenBurnsDirection::for_index).collect();
        assert_eq!(
            dirs,
            vec![
                KenBurnsDirection::ZoomInCenter,
                KenBurnsDirection::ZoomInPanRight,
                KenBurnsDirection::ZoomOut,
                KenBurnsDirection::ZoomInPanLeft,
                KenBurnsDirection::ZoomInCenter,
            ]
        );
    }

    #[test]
    fn test_filter_text() {
        let kb = KenBurns::new(2.0, 2, &settings()).unwrap();
        let filter = kb.filter();
        assert!(filter.starts_with("scale=5120:2880:force_original_aspect_ratio=increase"));
        assert!(filter.contains("z='max(1.2500-"));
        assert!(filter.contains(":d=60:s=1280x720:fps=30"));

        let kb = KenBurns::new(2.0, 1, &settings()).unwrap();
        assert!(kb.zoompan().contains("x='(iw-iw/zoom)*on/60'"));
    }

    #[test]
    fn test_invalid_duration() {
        assert!(KenBurns::new(0.0, 0, &settings()).is_err());
        assert!(KenBurns::new(f64::NAN, 0, &settings()).is_err());
    }
}
