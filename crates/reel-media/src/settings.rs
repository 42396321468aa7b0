//! Output encoding settings shared by every render step.

use serde::{Deserialize, Serialize};

/// Target format of rendered segments and the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Peak zoom of the Ken Burns effect (1.0 disables zoom)
    pub max_zoom: f64,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            max_zoom: 1.2,
            crf: 20,
            preset: "veryfast".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl RenderSettings {
    /// `WxH` as used by `zoompan` and `scale`.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Scale-and-crop chain that fills the frame without letterboxing.
    pub fn cover_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
            w = self.width,
            h = self.height
        )
    }
}
