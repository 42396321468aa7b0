//! OpenAI-compatible `images/generations` client.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{check_response, download, required_env, with_retry, HttpSettings};
use crate::traits::{sniff_image_extension, GeneratedMedia, ImageGenerator};

const PROVIDER: &str = "images";

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// `WIDTHxHEIGHT` as the API expects it
    pub size: String,
    /// Appended to every prompt to keep the look consistent across segments
    pub style_suffix: Option<String>,
    pub http: HttpSettings,
}

impl ImageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "dall-e-3".to_string(),
            size: "1792x1024".to_string(),
            style_suffix: None,
            http: HttpSettings::default(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = required_env("IMAGE_API_KEY").or_else(|_| required_env("OPENAI_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("IMAGE_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("IMAGE_MODEL") {
            config.model = model;
        }
        if let Ok(size) = std::env::var("IMAGE_SIZE") {
            config.size = size;
        }
        config.style_suffix = std::env::var("IMAGE_STYLE").ok().filter(|s| !s.trim().is_empty());
        config.http = HttpSettings::from_env("IMAGE", HttpSettings::default());
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct ImageClient {
    http: Client,
    config: ImageConfig,
}

impl ImageClient {
    pub fn new(config: ImageConfig) -> ProviderResult<Self> {
        let http = config.http.build_client("images")?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ImageConfig::from_env()?)
    }

    fn full_prompt(&self, prompt: &str) -> String {
        match &self.config.style_suffix {
            Some(style) => format!("{}. {}", prompt.trim().trim_end_matches('.'), style),
            None => prompt.trim().to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for ImageClient {
    async fn generate_image(&self, prompt: &str) -> ProviderResult<GeneratedMedia> {
        let url = format!("{}/images/generations", self.config.base_url);
        let prompt = self.full_prompt(prompt);
        let body = ImageRequest {
            model: &self.config.model,
            prompt: &prompt,
            n: 1,
            size: &self.config.size,
            response_format: "b64_json",
        };
        let (url, body) = (&url, &body);

        let response: ImageResponse = with_retry(PROVIDER, &self.config.http, move || async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send()
                .await?;
            Ok(check_response(PROVIDER, response).await?.json().await?)
        })
        .await?;

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no image in response"))?;

        let bytes = match (data.b64_json, data.url) {
            (Some(b64), _) => base64::engine::general_purpose::STANDARD.decode(b64.trim())?,
            (None, Some(url)) => {
                let url = &url;
                with_retry(PROVIDER, &self.config.http, move || async move {
                    download(&self.http, PROVIDER, url).await
                })
                .await?
            }
            (None, None) => {
                return Err(ProviderError::invalid_response(
                    "image response has neither b64_json nor url",
                ))
            }
        };

        let extension = sniff_image_extension(&bytes);
        debug!(bytes = bytes.len(), extension, "Image generated");
        Ok(GeneratedMedia::new(bytes, extension))
    }
}
