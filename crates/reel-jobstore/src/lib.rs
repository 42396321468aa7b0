//! Job table repository for ScriptReel.
//!
//! This crate provides:
//! - The [`JobStore`] trait with monotonic status transitions
//! - A PostgREST (Supabase) implementation with retry and metrics
//! - An in-memory implementation for tests and local runs

pub mod error;
pub mod memory;
pub mod metrics;
pub mod postgrest;
pub mod retry;
pub mod store;

use std::sync::Arc;

pub use error::{JobStoreError, JobStoreResult};
pub use memory::MemoryJobStore;
pub use postgrest::{PostgrestConfig, PostgrestJobStore};
pub use retry::RetryConfig;
pub use store::JobStore;

/// Build the configured job store.
///
/// Uses PostgREST when `SUPABASE_URL` is set, otherwise an in-memory store
/// that only lives as long as the process.
pub fn from_env() -> JobStoreResult<Arc<dyn JobStore>> {
    if std::env::var("SUPABASE_URL").is_ok() {
        Ok(Arc::new(PostgrestJobStore::from_env()?))
    } else {
        tracing::warn!("SUPABASE_URL not set, using in-memory job store");
        Ok(Arc::new(MemoryJobStore::new()))
    }
}
