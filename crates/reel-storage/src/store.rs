//! Object store abstraction shared by the API and the worker.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::keys::content_type_for;

/// Key/value blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()>;

    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete every object under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u32>;

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn check_connectivity(&self) -> StorageResult<()>;

    /// Upload a local file; the content type is derived from the key.
    async fn upload_file(&self, path: &Path, key: &str) -> StorageResult<()> {
        let data = tokio::fs::read(path).await?;
        self.upload_bytes(data, key, content_type_for(key)).await
    }

    /// Download an object into a local file, creating parent directories.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let data = self.download_bytes(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

/// Serialize `value` as pretty JSON under `key`.
pub async fn upload_json<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    store.upload_bytes(body, key, "application/json").await
}

/// Fetch and deserialize a JSON object.
pub async fn download_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> StorageResult<T> {
    let body = store.download_bytes(key).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// In-process store for tests and local runs without S3.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for a key.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u32> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|k, _| !k.starts_with(prefix));
        Ok((before - objects.len()) as u32)
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if !self.objects.read().await.contains_key(key) {
            return Err(StorageError::not_found(key));
        }
        Ok(format!("memory://{}?expires={}", key, expires_in.as_secs()))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u32,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        upload_json(&store, "jobs/a/segments.json", &Doc { n: 3 })
            .await
            .unwrap();

        let doc: Doc = download_json(&store, "jobs/a/segments.json").await.unwrap();
        assert_eq!(doc, Doc { n: 3 });
        assert_eq!(
            store.content_type("jobs/a/segments.json").await.as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_folder() {
        let store = MemoryStore::new();
        for key in ["jobs/a/x.mp3", "jobs/a/y.png", "jobs/ab/z.mp4"] {
            store.upload_bytes(vec![1], key, "x").await.unwrap();
        }

        assert_eq!(store.delete_prefix("jobs/a/").await.unwrap(), 2);
        assert_eq!(store.list_keys("jobs/").await.unwrap(), vec!["jobs/ab/z.mp4"]);
    }

    #[tokio::test]
    async fn test_file_round_trip_and_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("in.mp3");
        tokio::fs::write(&src, b"ID3").await.unwrap();

        let store = MemoryStore::new();
        store.upload_file(&src, "jobs/a/audio/000.mp3").await.unwrap();
        assert_eq!(
            store.content_type("jobs/a/audio/000.mp3").await.as_deref(),
            Some("audio/mpeg")
        );

        let dst = dir.path().join("nested").join("out.mp3");
        store.download_file("jobs/a/audio/000.mp3", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"ID3");

        let err = store.download_bytes("jobs/a/nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store
            .presign_get("jobs/a/nope", Duration::from_secs(60))
            .await
            .is_err());
    }
}
