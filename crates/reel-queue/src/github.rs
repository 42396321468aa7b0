//! GitHub Actions `workflow_dispatch` trigger.
//!
//! Each job becomes one workflow run that executes `reel-worker once
//! --job-id <id>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::error::{QueueError, QueueResult};
use crate::job::DispatchJob;

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
    /// `owner/repo`
    pub repository: String,
    /// Workflow file name, e.g. `render.yml`
    pub workflow: String,
    /// Branch or tag the workflow runs on
    pub git_ref: String,
    pub timeout: Duration,
}

impl GithubConfig {
    pub fn from_env() -> QueueResult<Self> {
        let required = |name: &str| match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(QueueError::config(format!("{} not set", name))),
        };

        let repository = required("GITHUB_REPOSITORY")?;
        if repository.split('/').filter(|p| !p.is_empty()).count() != 2 {
            return Err(QueueError::config(format!(
                "GITHUB_REPOSITORY must be owner/repo, got {}",
                repository
            )));
        }

        Ok(Self {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            token: required("GITHUB_TOKEN")?,
            repository,
            workflow: std::env::var("GITHUB_WORKFLOW_FILE").unwrap_or_else(|_| "render.yml".to_string()),
            git_ref: std::env::var("GITHUB_DISPATCH_REF").unwrap_or_else(|_| "main".to_string()),
            timeout: Duration::from_secs(30),
        })
    }
}

pub struct GithubDispatcher {
    http: Client,
    config: GithubConfig,
}

impl GithubDispatcher {
    pub fn new(config: GithubConfig) -> QueueResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("reel-queue/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(GithubConfig::from_env()?)
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.config.api_url, self.config.repository, self.config.workflow
        )
    }
}

#[async_trait]
impl Dispatcher for GithubDispatcher {
    async fn dispatch(&self, job: &DispatchJob) -> QueueResult<String> {
        // workflow_dispatch inputs must be strings
        let body = json!({
            "ref": self.config.git_ref,
            "inputs": {
                "job_id": job.job_id.as_str(),
                "attempt": job.attempt.to_string(),
            }
        });

        let response = self
            .http
            .post(self.dispatch_url())
            .bearer_auth(&self.config.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT && !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueueError::DispatchFailed {
                status: status.as_u16(),
                message,
            });
        }

        info!(job_id = %job.job_id, workflow = %self.config.workflow, "Workflow dispatched");
        Ok(format!("github:{}:{}", self.config.workflow, job.job_id))
    }

    fn name(&self) -> &'static str {
        "github"
    }
}
