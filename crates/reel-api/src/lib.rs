//! Axum HTTP API for ScriptReel.
//!
//! This crate provides:
//! - Job create/list/get/delete/retry endpoints and presigned video links
//! - The embedded polling UI
//! - Optional bearer-token auth, per-IP rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
