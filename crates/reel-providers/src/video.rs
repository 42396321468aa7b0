//! Task-based video generation client.
//!
//! `POST {base}/tasks` starts a generation and returns a task id. The task
//! is polled with `GET {base}/tasks/{id}` every `poll_interval` until it
//! reports `succeeded` or `failed`, or `max_wait` elapses. The finished
//! clip is downloaded from the returned output URL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{
    check_response, download, required_env, with_retry, with_retry_when, HttpSettings,
};
use crate::traits::{GeneratedMedia, VideoGenerator};

const PROVIDER: &str = "video";

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Requested clip length
    pub duration_secs: u32,
    pub ratio: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub http: HttpSettings,
}

impl VideoConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: "gen4_turbo".to_string(),
            duration_secs: 5,
            ratio: "1280:720".to_string(),
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
            http: HttpSettings::default(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let mut config = Self::new(required_env("VIDEO_API_KEY")?, required_env("VIDEO_BASE_URL")?);
        let num = |name: &str| -> Option<u64> { std::env::var(name).ok().and_then(|s| s.parse().ok()) };

        if let Ok(model) = std::env::var("VIDEO_MODEL") {
            config.model = model;
        }
        if let Ok(ratio) = std::env::var("VIDEO_RATIO") {
            config.ratio = ratio;
        }
        if let Some(secs) = num("VIDEO_DURATION_SECS") {
            config.duration_secs = secs as u32;
        }
        if let Some(secs) = num("VIDEO_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = num("VIDEO_MAX_WAIT_SECS") {
            config.max_wait = Duration::from_secs(secs);
        }
        config.http = HttpSettings::from_env("VIDEO", HttpSettings::default());
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    duration: u32,
    ratio: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    id: String,
}

/// Remote task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub status: TaskStatus,
    /// Result URLs once succeeded
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct VideoClient {
    http: Client,
    config: VideoConfig,
}

impl VideoClient {
    pub fn new(config: VideoConfig) -> ProviderResult<Self> {
        let http = config.http.build_client("video")?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(VideoConfig::from_env()?)
    }

    /// Start a generation task, returning its id.
    pub async fn create_task(&self, prompt: &str, image_url: Option<&str>) -> ProviderResult<String> {
        let url = format!("{}/tasks", self.config.base_url);
        let body = CreateTaskRequest {
            model: &self.config.model,
            prompt,
            image_url,
            duration: self.config.duration_secs,
            ratio: &self.config.ratio,
        };
        let (url, body) = (&url, &body);

        // Each accepted task is billed; resubmit only when the provider refused it
        let created: CreateTaskResponse = with_retry_when(
            PROVIDER,
            &self.config.http,
            move || async move {
                let response = self
                    .http
                    .post(url)
                    .bearer_auth(&self.config.api_key)
                    .json(body)
                    .send()
                    .await?;
                Ok(check_response(PROVIDER, response).await?.json().await?)
            },
            ProviderError::is_server_rejection,
        )
        .await?;

        Ok(created.id)
    }

    pub async fn task_state(&self, task_id: &str) -> ProviderResult<TaskState> {
        let url = format!(
            "{}/tasks/{}",
            self.config.base_url,
            urlencoding::encode(task_id)
        );
        let url = &url;

        with_retry(PROVIDER, &self.config.http, move || async move {
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;
            Ok(check_response(PROVIDER, response).await?.json().await?)
        })
        .await
    }

    /// Poll until the task finishes and return its first output URL.
    pub async fn wait_for_task(&self, task_id: &str) -> ProviderResult<String> {
        let started = Instant::now();

        loop {
            let state = self.task_state(task_id).await?;
            debug!(task_id, status = ?state.status, "Polled video task");

            match state.status {
                TaskStatus::Succeeded => {
                    return state.output.into_iter().next().ok_or_else(|| {
                        ProviderError::invalid_response(format!("task {} has no output", task_id))
                    });
                }
                TaskStatus::Failed | TaskStatus::Cancelled => {
                    return Err(ProviderError::TaskFailed(format!(
                        "task {}: {}",
                        task_id,
                        state.error.as_deref().unwrap_or("no reason given")
                    )));
                }
                _ => {}
            }

            if started.elapsed() + self.config.poll_interval > self.config.max_wait {
                return Err(ProviderError::Timeout(self.config.max_wait.as_secs()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl VideoGenerator for VideoClient {
    async fn generate_clip(
        &self,
        prompt: &str,
        image_url: Option<&str>,
    ) -> ProviderResult<GeneratedMedia> {
        let task_id = self.create_task(prompt, image_url).await?;
        info!(task_id = %task_id, "Video task started");

        let output_url = self.wait_for_task(&task_id).await?;
        let output_url = &output_url;
        let bytes = with_retry(PROVIDER, &self.config.http, move || async move {
            download(&self.http, PROVIDER, output_url).await
        })
        .await?;

        info!(task_id = %task_id, bytes = bytes.len(), "Video clip downloaded");
        Ok(GeneratedMedia::new(bytes, "mp4"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_parse() {
        let state: TaskState = serde_json::from_str(
            r#"{"id":"t1","status":"THROTTLED"}"#.to_lowercase().as_str(),
        )
        .unwrap();
        assert_eq!(state.status, TaskStatus::Unknown);
        assert!(!state.status.is_finished());
        assert!(TaskStatus::Failed.is_finished());
    }
}
