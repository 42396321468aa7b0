//! OpenRouter chat-completions client that turns a script into segments.

use async_trait::async_trait;
use reel_models::ScriptDocument;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{check_response, required_env, truncate, with_retry, HttpSettings};
use crate::traits::ScriptWriter;

const PROVIDER: &str = "openrouter";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// LLM client configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Primary model
    pub model: String,
    /// Tried in order when the primary model fails
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub http: HttpSettings,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            fallback_models: Vec::new(),
            temperature: 0.7,
            max_tokens: 4096,
            http: HttpSettings::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let mut config = Self::new(required_env("OPENROUTER_API_KEY")?);

        if let Ok(url) = std::env::var("OPENROUTER_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.model = model;
        }
        config.fallback_models = std::env::var("OPENROUTER_FALLBACK_MODELS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        config.http = HttpSettings::from_env("OPENROUTER", HttpSettings::default());

        Ok(config)
    }

    fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.model.as_str())
            .chain(self.fallback_models.iter().map(String::as_str))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter client.
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> ProviderResult<Self> {
        let http = config.http.build_client("llm")?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(LlmConfig::from_env()?)
    }

    /// Split `script` into `segment_count` narrated segments.
    ///
    /// Each configured model is tried in turn; a model whose output does not
    /// parse counts as a failure and the next one is asked.
    pub async fn generate_script(
        &self,
        script: &str,
        segment_count: u32,
    ) -> ProviderResult<ScriptDocument> {
        let prompt = build_prompt(script, segment_count);
        let mut last_error = None;

        for model in self.config.models() {
            info!(model, segment_count, "Requesting script segmentation");
            match self.complete(model, &prompt).await.and_then(|text| {
                let document = ScriptDocument::from_json(strip_code_fences(&text))?;
                Ok(document.normalize(segment_count as usize)?)
            }) {
                Ok(document) => {
                    info!(model, segments = document.len(), "Script segmented");
                    return Ok(document);
                }
                Err(e) => {
                    warn!(model, "Script generation failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::config("no LLM model configured")))
    }

    /// One chat completion, returning the assistant text.
    async fn complete(&self, model: &str, prompt: &str) -> ProviderResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let request = &request;
        let url = &url;

        let response: ChatResponse = with_retry(PROVIDER, &self.config.http, move || async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.config.api_key)
                .header("X-Title", "ScriptReel")
                .json(request)
                .send()
                .await?;
            Ok(check_response(PROVIDER, response).await?.json().await?)
        })
        .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::invalid_response("no content in completion"))?;

        debug!(model, preview = %truncate(&text, 120), "Completion received");
        Ok(text)
    }
}

#[async_trait]
impl ScriptWriter for LlmClient {
    async fn write_script(&self, script: &str, segment_count: u32) -> ProviderResult<ScriptDocument> {
        self.generate_script(script, segment_count).await
    }
}

const SYSTEM_PROMPT: &str = "You turn scripts into narrated video storyboards. \
Reply with a single JSON object and nothing else.";

fn build_prompt(script: &str, segment_count: u32) -> String {
    format!(
        "Split the script below into exactly {count} consecutive segments.\n\
         For every segment write:\n\
         - \"narration\": the exact words the narrator reads, taken from the script\n\
         - \"image_prompt\": a vivid, self-contained description of one still image\n\
         - \"video_prompt\": a short description of camera and subject motion\n\n\
         Respond as JSON: {{\"title\": string, \"segments\": [{{\"narration\": string, \
         \"image_prompt\": string, \"video_prompt\": string}}]}}\n\n\
         SCRIPT:\n{script}",
        count = segment_count,
        script = script.trim()
    )
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
    }

    #[test]
    fn test_prompt_mentions_count() {
        let prompt = build_prompt("  Once upon a time.  ", 4);
        assert!(prompt.contains("exactly 4 consecutive segments"));
        assert!(prompt.ends_with("SCRIPT:\nOnce upon a time."));
    }

    #[test]
    fn test_models_order() {
        let mut config = LlmConfig::new("key");
        config.fallback_models = vec!["b".into(), "c".into()];
        let models: Vec<&str> = config.models().collect();
        assert_eq!(models, vec![DEFAULT_MODEL, "b", "c"]);
    }
}
