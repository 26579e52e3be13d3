//! File-backed checkpoint store.
//!
//! Keeps all checkpoint keys in one small JSON document and persists it with
//! a write-to-temp-then-rename so a crash mid-write can never leave a torn
//! checkpoint behind. Any durable key-value store satisfies the contract;
//! this is the one the relay ships with.

use async_trait::async_trait;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::checkpoint::CheckpointStore;
use crate::error::{CheckpointError, CorruptSnafu, ReadSnafu, WriteSnafu};

/// Checkpoint store persisting to a local JSON file.
pub struct FileCheckpointStore {
    path: PathBuf,
    // get/set is a read-modify-write on the shared document.
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, CheckpointError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context(CorruptSnafu {
                path: self.path.display().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).context(ReadSnafu {
                key: self.path.display().to_string(),
            }),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), CheckpointError> {
        let key = self.path.display().to_string();
        let bytes = serde_json::to_vec_pretty(entries).expect("string map serializes");

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .context(WriteSnafu { key: key.clone() })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .context(WriteSnafu { key })
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CheckpointError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_key_reads_as_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
        assert_eq!(store.get("vpsa/host/last-forwarded-id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        store.set("vpsa/a/last-forwarded-id", "17").await.unwrap();
        store.set("vpsa/b/last-forwarded-id", "3").await.unwrap();
        store.set("vpsa/a/last-forwarded-id", "42").await.unwrap();

        assert_eq!(
            store.get("vpsa/a/last-forwarded-id").await.unwrap(),
            Some("42".to_string())
        );
        assert_eq!(
            store.get("vpsa/b/last-forwarded-id").await.unwrap(),
            Some("3".to_string())
        );
    }

    #[tokio::test]
    async fn value_survives_a_new_store_instance() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let store = FileCheckpointStore::new(&path);
        store.set("key", "1005").await.unwrap();
        drop(store);

        let recovered = FileCheckpointStore::new(&path);
        assert_eq!(recovered.get("key").await.unwrap(), Some("1005".to_string()));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileCheckpointStore::new(&path);
        let err = store.get("key").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }
}
