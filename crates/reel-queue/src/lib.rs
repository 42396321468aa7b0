//! Job dispatch for ScriptReel.
//!
//! This crate provides:
//! - The [`Dispatcher`] seam used by the API
//! - A Redis Streams queue with retry counters and a DLQ
//! - GitHub Actions workflow dispatch for one-shot worker runs

pub mod dispatch;
pub mod error;
pub mod github;
pub mod job;
pub mod queue;

pub use dispatch::{dispatcher_from_env, DispatchMode, Dispatcher, MemoryDispatcher};
pub use error::{QueueError, QueueResult};
pub use github::{GithubConfig, GithubDispatcher};
pub use job::DispatchJob;
pub use queue::{JobQueue, QueueConfig};
