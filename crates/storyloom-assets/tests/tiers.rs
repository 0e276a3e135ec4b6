//! Tier integration tests
//!
//! Exercises the durable store and session cache together the way the
//! resolution pipeline writes through them.

use std::sync::Arc;
use storyloom_assets::{
    AssetKind, AssetRecord, AssetStore, FsAssetStore, MemoryAssetStore, SceneAssetKey,
    SceneKey, SessionCache, SharedAssetStore,
};

async fn write_through(store: &SharedAssetStore, cache: &SessionCache, record: AssetRecord) {
    store.put(&record).await.unwrap();
    cache.insert(record);
}

#[tokio::test]
async fn write_through_populates_both_tiers() {
    let store: SharedAssetStore = Arc::new(MemoryAssetStore::new());
    let cache = SessionCache::new();
    let key = SceneAssetKey::new("monkey-crocodile", 1, AssetKind::Image);

    write_through(&store, &cache, AssetRecord::new(key.clone(), "img-1")).await;

    assert_eq!(
        store.get(&key).await.unwrap().unwrap().payload.as_str(),
        "img-1"
    );
    assert_eq!(cache.get(&key).unwrap().payload.as_str(), "img-1");
}

#[tokio::test]
async fn durable_tier_outlives_session_cache() {
    let dir = tempfile::tempdir().unwrap();
    let key = SceneAssetKey::new("blue-jackal", 2, AssetKind::Audio);

    {
        let store: SharedAssetStore = Arc::new(FsAssetStore::open(dir.path()).await.unwrap());
        let cache = SessionCache::new();
        write_through(&store, &cache, AssetRecord::new(key.clone(), "aud-2")).await;
    }

    // New process: empty session cache, same directory.
    let cache = SessionCache::new();
    assert!(cache.get(&key).is_none());

    let store = FsAssetStore::open(dir.path()).await.unwrap();
    let record = store.get(&key).await.unwrap().unwrap();
    cache.insert(record);
    assert!(cache.get_scene(&SceneKey::new("blue-jackal", 2)).unwrap().audio.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_distinct_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsAssetStore::open(dir.path()).await.unwrap());

    let mut handles = Vec::new();
    for scene in 0..16 {
        for kind in AssetKind::ALL {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = SceneAssetKey::new("musical-donkey", scene, kind);
                store
                    .put(&AssetRecord::new(key, format!("{kind}-{scene}")))
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for scene in 0..16 {
        for kind in AssetKind::ALL {
            let key = SceneAssetKey::new("musical-donkey", scene, kind);
            let record = store.get(&key).await.unwrap().unwrap();
            assert_eq!(record.payload.as_str(), format!("{kind}-{scene}"));
        }
    }
}
