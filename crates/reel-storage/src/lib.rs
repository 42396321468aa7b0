//! S3-compatible object storage for ScriptReel.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait with an S3 client and an in-memory store
//! - JSON upload/download helpers
//! - The per-job key layout

pub mod client;
pub mod error;
pub mod keys;
pub mod store;

pub use client::{StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use store::{download_json, upload_json, MemoryStore, ObjectStore};
