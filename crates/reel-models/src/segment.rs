//! Script segments and per-stage asset manifests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// One narrated segment as produced by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentScript {
    #[serde(default)]
    pub index: u32,
    /// Text read by the TTS voice
    pub narration: String,
    /// Prompt for the still image
    #[serde(default)]
    pub image_prompt: String,
    /// Prompt for the video clip, falls back to the image prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
}

impl SegmentScript {
    /// Prompt to use for video generation.
    pub fn video_prompt_or_image(&self) -> &str {
        self.video_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.image_prompt)
    }
}

/// Structured LLM output for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptDocument {
    #[serde(default)]
    pub title: String,
    pub segments: Vec<SegmentScript>,
}

impl ScriptDocument {
    /// Parse a document from raw JSON text.
    pub fn from_json(text: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Drop blank segments, keep at most `expected` and re-index from 0.
    pub fn normalize(mut self, expected: usize) -> ModelResult<Self> {
        self.segments.retain(|s| !s.narration.trim().is_empty());
        self.segments.truncate(expected);

        if self.segments.is_empty() {
            return Err(ModelError::EmptyScript);
        }

        for (i, segment) in self.segments.iter_mut().enumerate() {
            segment.index = i as u32;
            segment.narration = segment.narration.trim().to_string();
            if segment.image_prompt.trim().is_empty() {
                segment.image_prompt = segment.narration.clone();
            }
        }

        self.title = self.title.trim().to_string();
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Outcome of one segment within a generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentAsset {
    pub index: u32,
    /// Storage key of the generated file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Failure message when generation was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl SegmentAsset {
    pub fn ok(index: u32, key: impl Into<String>) -> Self {
        Self {
            index,
            key: Some(key.into()),
            error: None,
            duration_secs: None,
        }
    }

    pub fn failed(index: u32, error: impl Into<String>) -> Self {
        Self {
            index,
            key: None,
            error: Some(error.into()),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.key.is_some()
    }
}

/// Per-stage list of segment outcomes, stored as JSON next to the assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetManifest {
    pub segments: Vec<SegmentAsset>,
}

/// Narration audio manifest.
pub type VoiceManifest = AssetManifest;
/// Still image manifest.
pub type ImageManifest = AssetManifest;
/// Generated clip manifest.
pub type VideoManifest = AssetManifest;

impl AssetManifest {
    pub fn push(&mut self, asset: SegmentAsset) {
        self.segments.push(asset);
    }

    /// Look up the entry for a segment index.
    pub fn get(&self, index: u32) -> Option<&SegmentAsset> {
        self.segments.iter().find(|s| s.index == index)
    }

    /// Storage key for a segment, if it was generated.
    pub fn key_for(&self, index: u32) -> Option<&str> {
        self.get(index).and_then(|s| s.key.as_deref())
    }

    pub fn succeeded(&self) -> usize {
        self.segments.iter().filter(|s| s.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.segments.len() - self.succeeded()
    }
}
