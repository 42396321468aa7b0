//! The dispatch seam between the API and the workers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{QueueError, QueueResult};
use crate::github::GithubDispatcher;
use crate::job::DispatchJob;
use crate::queue::JobQueue;

/// Hands a job to whatever runs the pipeline.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Dispatch a job, returning a backend-specific reference.
    async fn dispatch(&self, job: &DispatchJob) -> QueueResult<String>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// How jobs reach a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Redis Streams consumed by long-running workers
    #[default]
    Redis,
    /// A GitHub Actions workflow run per job
    Github,
}

impl FromStr for DispatchMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "github" | "github_actions" => Ok(Self::Github),
            other => Err(QueueError::config(format!("unknown DISPATCH_MODE: {}", other))),
        }
    }
}

impl DispatchMode {
    /// Read `DISPATCH_MODE`, defaulting to Redis.
    pub fn from_env() -> QueueResult<Self> {
        match std::env::var("DISPATCH_MODE") {
            Ok(v) if !v.trim().is_empty() => v.parse(),
            _ => Ok(Self::default()),
        }
    }
}

/// Build the configured dispatcher.
pub async fn dispatcher_from_env() -> QueueResult<Arc<dyn Dispatcher>> {
    Ok(match DispatchMode::from_env()? {
        DispatchMode::Redis => {
            let queue = JobQueue::from_env()?;
            queue.init().await?;
            Arc::new(queue)
        }
        DispatchMode::Github => Arc::new(GithubDispatcher::from_env()?),
    })
}

/// Dispatcher that only records what it was given.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    dispatched: Mutex<Vec<DispatchJob>>,
    fail_with: Option<String>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            dispatched: Mutex::default(),
            fail_with: Some(message.into()),
        }
    }

    pub async fn dispatched(&self) -> Vec<DispatchJob> {
        self.dispatched.lock().await.clone()
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn dispatch(&self, job: &DispatchJob) -> QueueResult<String> {
        if let Some(message) = &self.fail_with {
            return Err(QueueError::enqueue_failed(message.clone()));
        }
        let mut dispatched = self.dispatched.lock().await;
        dispatched.push(job.clone());
        Ok(format!("memory-{}", dispatched.len()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
