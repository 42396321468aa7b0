//! Application state.

use std::sync::Arc;

use reel_jobstore::JobStore;
use reel_queue::Dispatcher;
use reel_storage::{MemoryStore, ObjectStore, StorageClient};
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn JobStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        jobs: Arc<dyn JobStore>,
        storage: Arc<dyn ObjectStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            config,
            jobs,
            storage,
            dispatcher,
        }
    }

    /// Wire the configured backends.
    pub async fn from_env(config: ApiConfig) -> ApiResult<Self> {
        let jobs = reel_jobstore::from_env().map_err(|e| ApiError::internal(e.to_string()))?;

        let storage: Arc<dyn ObjectStore> = if std::env::var("STORAGE_BUCKET").is_ok() {
            Arc::new(StorageClient::from_env()?)
        } else {
            warn!("STORAGE_BUCKET not set, using in-memory object store");
            Arc::new(MemoryStore::new())
        };

        let dispatcher = reel_queue::dispatcher_from_env()
            .await
            .map_err(|e| ApiError::internal(format!("dispatcher: {}", e)))?;

        Ok(Self::new(config, jobs, storage, dispatcher))
    }
}
