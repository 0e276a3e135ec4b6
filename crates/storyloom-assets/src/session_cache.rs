//! Session memory cache using moka
//!
//! Process-lifetime shadow of the durable tier, keyed per scene and holding a
//! partial entry (image and/or audio). Synchronous and infallible; keys are
//! namespaced by story id so entries from other stories are simply never
//! read.

use crate::key::{AssetKind, SceneAssetKey, SceneKey};
use crate::record::AssetRecord;
use moka::sync::Cache;

/// Cached media for one scene
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaEntry {
    /// Illustration, if resolved
    pub image: Option<AssetRecord>,
    /// Narration, if resolved
    pub audio: Option<AssetRecord>,
}

impl MediaEntry {
    /// Entry holding one record in the slot for its kind
    #[must_use]
    pub fn from_record(record: AssetRecord) -> Self {
        let kind = record.key.kind;
        let mut entry = Self::default();
        *entry.slot_mut(kind) = Some(record);
        entry
    }

    /// Record for `kind`
    #[inline]
    #[must_use]
    pub fn get(&self, kind: AssetKind) -> Option<&AssetRecord> {
        match kind {
            AssetKind::Image => self.image.as_ref(),
            AssetKind::Audio => self.audio.as_ref(),
        }
    }

    #[inline]
    fn slot_mut(&mut self, kind: AssetKind) -> &mut Option<AssetRecord> {
        match kind {
            AssetKind::Image => &mut self.image,
            AssetKind::Audio => &mut self.audio,
        }
    }

    /// Overlay the populated fields of `partial`
    #[must_use]
    pub fn merged(mut self, partial: MediaEntry) -> Self {
        if partial.image.is_some() {
            self.image = partial.image;
        }
        if partial.audio.is_some() {
            self.audio = partial.audio;
        }
        self
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCacheStats {
    /// Approximate number of scenes cached
    pub entry_count: u64,
}

/// Session-lifetime media cache
///
/// Cloning shares the underlying cache. Unbounded for the session; cleared
/// only by [`SessionCache::clear`].
#[derive(Debug, Clone)]
pub struct SessionCache {
    inner: Cache<SceneKey, MediaEntry>,
}

impl SessionCache {
    /// Create an unbounded cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    /// Record for one asset
    #[must_use]
    pub fn get(&self, key: &SceneAssetKey) -> Option<AssetRecord> {
        self.inner
            .get(&key.scene())
            .and_then(|entry| entry.get(key.kind).cloned())
    }

    /// Everything cached for a scene
    #[inline]
    #[must_use]
    pub fn get_scene(&self, scene: &SceneKey) -> Option<MediaEntry> {
        self.inner.get(scene)
    }

    /// Merge populated fields into the scene entry
    pub fn merge(&self, scene: SceneKey, partial: MediaEntry) {
        self.inner
            .entry(scene)
            .and_upsert_with(|existing| match existing {
                Some(entry) => entry.into_value().merged(partial),
                None => partial,
            });
    }

    /// Store a single record
    #[inline]
    pub fn insert(&self, record: AssetRecord) {
        let scene = record.key.scene();
        self.merge(scene, MediaEntry::from_record(record));
    }

    /// Drop every entry (full reset)
    #[inline]
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        self.inner.run_pending_tasks();
        SessionCacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
