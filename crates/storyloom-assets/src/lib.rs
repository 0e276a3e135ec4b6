//! Storyloom asset tiers
//!
//! The leaf layer of the asset orchestration stack:
//!
//! - [`SceneAssetKey`]: `(story, scene, kind)` identity shared by every tier
//! - [`AssetStore`]: durable persistence that survives restarts
//!   ([`FsAssetStore`], [`MemoryAssetStore`], [`DisabledStore`])
//! - [`SessionCache`]: synchronous, process-lifetime shadow cache
//!
//! # Architecture
//!
//! ```text
//! resolve(key) → AssetStore (durable) → SessionCache → backend generation
//!                     ↑_____________________↑______________↓ write-back
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod fs_store;
pub mod key;
pub mod record;
pub mod session_cache;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use fs_store::FsAssetStore;
pub use key::{AssetKind, SceneAssetKey, SceneKey, UnknownAssetKind};
pub use record::{AssetPayload, AssetRecord};
pub use session_cache::{MediaEntry, SessionCache, SessionCacheStats};
pub use store::{AssetStore, DisabledStore, MemoryAssetStore, SharedAssetStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
