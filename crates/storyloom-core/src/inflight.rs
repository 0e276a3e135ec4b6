//! In-flight deduplication registry
//!
//! Guarantees at most one concurrent resolution per [`SceneAssetKey`]. A key
//! is claimed synchronously before the resolution's first suspension point
//! and released when the [`InFlightClaim`] drops, on every exit path.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use storyloom_assets::SceneAssetKey;
use tokio::sync::Notify;

/// Process-wide set of keys currently being resolved
///
/// Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    entries: Arc<DashMap<SceneAssetKey, Arc<Notify>>>,
}

impl InFlightRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for a new resolution
    ///
    /// Returns `None` when another resolution already holds it; the caller
    /// must not duplicate the work.
    #[must_use]
    pub fn try_claim(&self, key: &SceneAssetKey) -> Option<InFlightClaim> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let promote = Arc::new(Notify::new());
                slot.insert(Arc::clone(&promote));
                Some(InFlightClaim {
                    registry: self.clone(),
                    key: key.clone(),
                    promote,
                })
            }
        }
    }

    /// Ask the holder of `key` to stop waiting on its scheduling delay
    ///
    /// Returns whether a holder existed. A promotion sent before the holder
    /// starts waiting is kept and consumed by its next wait.
    pub fn promote(&self, key: &SceneAssetKey) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                entry.value().notify_one();
                true
            }
            None => false,
        }
    }

    /// Whether `key` is being resolved
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &SceneAssetKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of active resolutions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in flight
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusive right to resolve one key
///
/// Dropping the claim removes the key from the registry.
#[derive(Debug)]
pub struct InFlightClaim {
    registry: InFlightRegistry,
    key: SceneAssetKey,
    promote: Arc<Notify>,
}

impl InFlightClaim {
    /// Claimed key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &SceneAssetKey {
        &self.key
    }

    /// Resolves once another submission promotes this key
    pub async fn promoted(&self) {
        self.promote.notified().await;
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let promote = &self.promote;
        self.registry
            .entries
            .remove_if(&self.key, |_, held| Arc::ptr_eq(held, promote));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storyloom_assets::AssetKind;

    fn key(scene: usize) -> SceneAssetKey {
        SceneAssetKey::new("story", scene, AssetKind::Image)
    }

    #[test]
    fn second_claim_is_refused() {
        let registry = InFlightRegistry::new();
        let claim = registry.try_claim(&key(0)).unwrap();

        assert!(registry.try_claim(&key(0)).is_none());
        assert!(registry.contains(&key(0)));
        assert_eq!(claim.key(), &key(0));
    }

    #[test]
    fn drop_releases_key() {
        let registry = InFlightRegistry::new();
        {
            let _claim = registry.try_claim(&key(1)).unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        assert!(registry.try_claim(&key(1)).is_some());
    }

    #[test]
    fn distinct_keys_are_independent() {
        let registry = InFlightRegistry::new();
        let _a = registry.try_claim(&key(0)).unwrap();
        let _b = registry.try_claim(&key(0).with_kind(AssetKind::Audio)).unwrap();
        let _c = registry.try_claim(&key(1)).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn promote_without_holder() {
        let registry = InFlightRegistry::new();
        assert!(!registry.promote(&key(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn promotion_before_wait_is_kept() {
        let registry = InFlightRegistry::new();
        let claim = registry.try_claim(&key(2)).unwrap();

        assert!(registry.promote(&key(2)));

        tokio::select! {
            () = claim.promoted() => {}
            () = tokio::time::sleep(Duration::from_secs(60)) => panic!("promotion lost"),
        }
    }
}
