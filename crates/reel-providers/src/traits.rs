//! Generation interfaces the worker pipeline is generic over.

use async_trait::async_trait;
use reel_models::{ScriptDocument, VoiceId};

use crate::error::ProviderResult;

/// Encoded media returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMedia {
    pub bytes: Vec<u8>,
    /// File extension without the dot (`mp3`, `png`, `mp4`, ...)
    pub extension: String,
}

impl GeneratedMedia {
    pub fn new(bytes: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            bytes,
            extension: extension.into(),
        }
    }
}

/// Splits a raw script into narrated segments.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, script: &str, segment_count: u32) -> ProviderResult<ScriptDocument>;
}

/// Text to narration audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> ProviderResult<GeneratedMedia>;
}

/// Prompt to still image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> ProviderResult<GeneratedMedia>;
}

/// Prompt (plus an optional reference image URL) to a short clip.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate_clip(
        &self,
        prompt: &str,
        image_url: Option<&str>,
    ) -> ProviderResult<GeneratedMedia>;
}

/// Guess an image extension from its magic bytes.
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_image_extension() {
        assert_eq!(sniff_image_extension(&[0x89, b'P', b'N', b'G', 0x0D]), "png");
        assert_eq!(sniff_image_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), "jpg");
        assert_eq!(sniff_image_extension(b"RIFF\0\0\0\0WEBPVP8 "), "webp");
        assert_eq!(sniff_image_extension(b""), "png");
    }
}
