//! Durable asset store contract and in-process implementations
//!
//! The durable tier survives process restarts. It is keyed by
//! [`SceneAssetKey`] and holds whole [`AssetRecord`]s; a reader never sees a
//! partially written record.

use crate::error::{StoreError, StoreResult};
use crate::key::SceneAssetKey;
use crate::record::AssetRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Durable key-value persistence for generated media
#[async_trait]
pub trait AssetStore: Send + Sync + Debug {
    /// Fetch a record, `None` when absent
    async fn get(&self, key: &SceneAssetKey) -> StoreResult<Option<AssetRecord>>;

    /// Persist a record under its own key
    async fn put(&self, record: &AssetRecord) -> StoreResult<()>;

    /// Whether the store is actually persisting anything
    fn is_available(&self) -> bool {
        true
    }
}

/// Shared handle to a durable store
pub type SharedAssetStore = Arc<dyn AssetStore>;

/// Process-local durable store
///
/// Used when no asset directory is configured and as the default in tests.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    records: DashMap<SceneAssetKey, AssetRecord>,
}

impl MemoryAssetStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn get(&self, key: &SceneAssetKey) -> StoreResult<Option<AssetRecord>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, record: &AssetRecord) -> StoreResult<()> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

/// Stand-in for a store that failed to initialise
///
/// Every read is a miss and every write reports [`StoreError::Unavailable`].
#[derive(Debug, Clone)]
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    /// Create with the initialisation failure reason
    #[inline]
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the store is disabled
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl AssetStore for DisabledStore {
    async fn get(&self, _key: &SceneAssetKey) -> StoreResult<Option<AssetRecord>> {
        Ok(None)
    }

    async fn put(&self, _record: &AssetRecord) -> StoreResult<()> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
