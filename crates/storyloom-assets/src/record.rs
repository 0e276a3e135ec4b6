//! Asset records and payload references

use crate::key::SceneAssetKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque encoded media reference (data URI or blob reference)
///
/// Payloads can be large base64 strings; clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPayload(Arc<str>);

impl AssetPayload {
    /// Wrap an encoded reference
    #[inline]
    #[must_use]
    pub fn new(reference: impl Into<Arc<str>>) -> Self {
        Self(reference.into())
    }

    /// Borrow the reference
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the reference is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leading part of the reference, at most `max_bytes` long
    ///
    /// Cut on a char boundary; returns the whole reference when it fits.
    #[must_use]
    pub fn preview(&self, max_bytes: usize) -> &str {
        if self.0.len() <= max_bytes {
            return &self.0;
        }
        let cut = (0..=max_bytes)
            .rev()
            .find(|i| self.0.is_char_boundary(*i))
            .unwrap_or(0);
        &self.0[..cut]
    }
}

impl fmt::Debug for AssetPayload {
    // Data URIs run to megabytes; keep logs readable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 32;
        if self.0.len() <= PREVIEW {
            write!(f, "AssetPayload({:?})", &*self.0)
        } else {
            write!(f, "AssetPayload({:?}.. {} bytes)", self.preview(PREVIEW), self.0.len())
        }
    }
}

impl fmt::Display for AssetPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetPayload {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetPayload {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A resolved asset
///
/// Immutable once written. The durable store is the long-lived owner; the
/// session cache holds a disposable shadow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Identity
    pub key: SceneAssetKey,
    /// Encoded media reference
    pub payload: AssetPayload,
    /// When the asset was first produced
    pub created_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Create a record stamped now
    #[inline]
    #[must_use]
    pub fn new(key: SceneAssetKey, payload: impl Into<AssetPayload>) -> Self {
        Self {
            key,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }
}
