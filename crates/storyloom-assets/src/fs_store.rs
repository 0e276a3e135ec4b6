//! File-backed durable asset store
//!
//! One JSON-encoded [`AssetRecord`] per key under
//! `<dir>/<hex(story)>_<scene>_<kind>.json`. Writes go to a uniquely named
//! temp file in the same directory and are renamed over the target, so the
//! target is either absent or complete.

use crate::error::{StoreError, StoreResult};
use crate::key::SceneAssetKey;
use crate::record::AssetRecord;
use crate::store::{AssetStore, DisabledStore, SharedAssetStore};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RECORD_EXTENSION: &str = "json";

/// Durable store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Open (creating if needed) a store rooted at `root`
    ///
    /// # Errors
    /// - `StoreError::Io` if the directory cannot be created
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io_error(&root, e))?;
        tracing::debug!(root = %root.display(), "opened asset store");
        Ok(Self { root })
    }

    /// Open a store, degrading to [`DisabledStore`] on failure
    ///
    /// Initialisation failure is logged and never propagated.
    pub async fn open_or_disabled(root: impl Into<PathBuf>) -> SharedAssetStore {
        let root = root.into();
        match Self::open(&root).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "asset store disabled");
                Arc::new(DisabledStore::new(e.to_string()))
            }
        }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `key`
    #[inline]
    #[must_use]
    pub fn record_path(&self, key: &SceneAssetKey) -> PathBuf {
        self.root
            .join(format!("{}.{RECORD_EXTENSION}", key.storage_name()))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn get(&self, key: &SceneAssetKey) -> StoreResult<Option<AssetRecord>> {
        let path = self.record_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_error(path, e)),
        };

        let record: AssetRecord = serde_json::from_slice(&bytes)?;
        if &record.key != key {
            return Err(StoreError::KeyMismatch {
                expected: key.to_string(),
                found: record.key.to_string(),
            });
        }
        Ok(Some(record))
    }

    async fn put(&self, record: &AssetRecord) -> StoreResult<()> {
        let bytes = serde_json::to_vec(record)?;
        let root = self.root.clone();
        let target = self.record_path(&record.key);

        tokio::task::spawn_blocking(move || persist_atomically(&root, &target, &bytes))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

fn persist_atomically(root: &Path, target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| StoreError::io_error(root, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io_error(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| StoreError::io_error(target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::AssetKind;

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::open(dir.path()).await.unwrap();
        let key = SceneAssetKey::new("clever-rabbit", 4, AssetKind::Audio);

        assert!(store.get(&key).await.unwrap().is_none());

        let record = AssetRecord::new(key.clone(), "data:audio/wav;base64,UklGRg==");
        store.put(&record).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(record));
        assert!(store.record_path(&key).exists());
    }

    #[tokio::test]
    async fn fs_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = SceneAssetKey::new("talkative-turtle", 0, AssetKind::Image);
        {
            let store = FsAssetStore::open(dir.path()).await.unwrap();
            store.put(&AssetRecord::new(key.clone(), "img")).await.unwrap();
        }

        let reopened = FsAssetStore::open(dir.path()).await.unwrap();
        let record = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(record.payload.as_str(), "img");
    }

    #[tokio::test]
    async fn fs_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::open(dir.path()).await.unwrap();
        for scene in 0..3 {
            let key = SceneAssetKey::new("s", scene, AssetKind::Image);
            store.put(&AssetRecord::new(key, "x")).await.unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.ends_with(".json")));
    }

    #[tokio::test]
    async fn corrupt_record_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::open(dir.path()).await.unwrap();
        let key = SceneAssetKey::new("s", 0, AssetKind::Image);
        std::fs::write(store.record_path(&key), b"{not json").unwrap();

        assert!(matches!(store.get(&key).await, Err(StoreError::Codec(_))));
    }

    #[tokio::test]
    async fn open_or_disabled_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = FsAssetStore::open_or_disabled(blocker.join("assets")).await;
        assert!(!store.is_available());
    }
}
