//! Text-to-speech clients.
//!
//! Two HTTP dialects are supported: ElevenLabs (`POST
//! /v1/text-to-speech/{voice}`) and OpenAI (`POST /audio/speech`). Both
//! return MP3 bytes. [`speech_from_env`] picks one from `TTS_PROVIDER`.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use reel_models::VoiceId;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{check_response, required_env, with_retry, HttpSettings};
use crate::traits::{GeneratedMedia, SpeechSynthesizer};

/// Which TTS API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    #[default]
    ElevenLabs,
    OpenAi,
}

impl FromStr for TtsProvider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" | "11labs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAi),
            other => Err(ProviderError::config(format!("unknown TTS_PROVIDER: {}", other))),
        }
    }
}

/// Build the configured speech synthesizer.
pub fn speech_from_env() -> ProviderResult<Arc<dyn SpeechSynthesizer>> {
    let provider = match std::env::var("TTS_PROVIDER") {
        Ok(v) => v.parse()?,
        Err(_) => TtsProvider::default(),
    };

    Ok(match provider {
        TtsProvider::ElevenLabs => Arc::new(TtsClient::from_env()?),
        TtsProvider::OpenAi => Arc::new(OpenAiTts::from_env()?),
    })
}

// ElevenLabs

const ELEVENLABS: &str = "elevenlabs";

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    /// e.g. `mp3_44100_128`
    pub output_format: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub http: HttpSettings,
}

impl TtsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            output_format: "mp3_44100_128".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            http: HttpSettings::default(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let mut config = Self::new(required_env("ELEVENLABS_API_KEY")?);
        if let Ok(url) = std::env::var("ELEVENLABS_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("ELEVENLABS_MODEL") {
            config.model_id = model;
        }
        config.http = HttpSettings::from_env("TTS", HttpSettings::default());
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// ElevenLabs-compatible TTS client.
pub struct TtsClient {
    http: Client,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> ProviderResult<Self> {
        let http = config.http.build_client("tts")?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(TtsConfig::from_env()?)
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> ProviderResult<GeneratedMedia> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url,
            urlencoding::encode(voice.as_str())
        );
        let body = ElevenLabsRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };
        let (url, body) = (&url, &body);

        let bytes = with_retry(ELEVENLABS, &self.config.http, move || async move {
            let response = self
                .http
                .post(url)
                .query(&[("output_format", self.config.output_format.as_str())])
                .header("xi-api-key", &self.config.api_key)
                .header(reqwest::header::ACCEPT, "audio/mpeg")
                .json(body)
                .send()
                .await?;
            Ok(check_response(ELEVENLABS, response).await?.bytes().await?)
        })
        .await?;

        audio_result(ELEVENLABS, bytes.to_vec(), text)
    }
}

// OpenAI

const OPENAI: &str = "openai-tts";

#[derive(Debug, Clone)]
pub struct OpenAiTtsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub speed: f32,
    pub http: HttpSettings,
}

impl OpenAiTtsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "tts-1".to_string(),
            speed: 1.0,
            http: HttpSettings::default(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let mut config = Self::new(required_env("OPENAI_API_KEY")?);
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("OPENAI_TTS_MODEL") {
            config.model = model;
        }
        config.http = HttpSettings::from_env("TTS", HttpSettings::default());
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    speed: f32,
}

/// OpenAI `audio/speech` client.
pub struct OpenAiTts {
    http: Client,
    config: OpenAiTtsConfig,
}

impl OpenAiTts {
    pub fn new(config: OpenAiTtsConfig) -> ProviderResult<Self> {
        let http = config.http.build_client("tts")?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(OpenAiTtsConfig::from_env()?)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> ProviderResult<GeneratedMedia> {
        let url = format!("{}/audio/speech", self.config.base_url);
        let body = OpenAiSpeechRequest {
            model: &self.config.model,
            input: text,
            voice: voice.as_str(),
            response_format: "mp3",
            speed: self.config.speed,
        };
        let (url, body) = (&url, &body);

        let bytes = with_retry(OPENAI, &self.config.http, move || async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send()
                .await?;
            Ok(check_response(OPENAI, response).await?.bytes().await?)
        })
        .await?;

        audio_result(OPENAI, bytes.to_vec(), text)
    }
}

fn audio_result(provider: &str, bytes: Vec<u8>, text: &str) -> ProviderResult<GeneratedMedia> {
    if bytes.is_empty() {
        return Err(ProviderError::invalid_response(format!(
            "{} returned empty audio",
            provider
        )));
    }
    debug!(provider, bytes = bytes.len(), chars = text.len(), "Speech synthesized");
    Ok(GeneratedMedia::new(bytes, "mp3"))
}
