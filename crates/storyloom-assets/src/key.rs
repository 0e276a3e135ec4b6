//! Scene asset identity
//!
//! Every cache tier and the in-flight registry address assets by the same
//! composite key: `(story id, scene index, kind)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of generated media attached to a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Scene illustration
    Image,
    /// Narrated audio clip
    Audio,
}

impl AssetKind {
    /// Both kinds, image first
    pub const ALL: [AssetKind; 2] = [AssetKind::Image, AssetKind::Audio];

    /// Stable suffix used in storage keys
    #[inline]
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for AssetKind {
    type Err = UnknownAssetKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(AssetKind::Image),
            "audio" => Ok(AssetKind::Audio),
            other => Err(UnknownAssetKind(other.to_string())),
        }
    }
}

/// Unrecognised asset kind suffix
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset kind: '{0}'")]
pub struct UnknownAssetKind(pub String);

/// Composite identity of one logical asset
///
/// The story id is reference counted; keys are cloned into every tier and
/// every in-flight claim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneAssetKey {
    /// Owning story
    pub story_id: Arc<str>,
    /// Zero-based scene position
    pub scene_index: usize,
    /// Image or audio
    pub kind: AssetKind,
}

impl SceneAssetKey {
    /// Create new key
    #[inline]
    #[must_use]
    pub fn new(story_id: impl Into<Arc<str>>, scene_index: usize, kind: AssetKind) -> Self {
        Self {
            story_id: story_id.into(),
            scene_index,
            kind,
        }
    }

    /// Same scene, other kind
    #[inline]
    #[must_use]
    pub fn with_kind(&self, kind: AssetKind) -> Self {
        Self {
            story_id: Arc::clone(&self.story_id),
            scene_index: self.scene_index,
            kind,
        }
    }

    /// Key of the scene this asset belongs to
    #[inline]
    #[must_use]
    pub fn scene(&self) -> SceneKey {
        SceneKey {
            story_id: Arc::clone(&self.story_id),
            scene_index: self.scene_index,
        }
    }

    /// File-system safe storage name
    ///
    /// The story id is hex encoded so arbitrary ids never escape the store
    /// directory or collide after sanitising.
    #[must_use]
    pub fn storage_name(&self) -> String {
        format!(
            "{}_{}_{}",
            hex::encode(self.story_id.as_bytes()),
            self.scene_index,
            self.kind.suffix()
        )
    }
}

impl fmt::Display for SceneAssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.story_id, self.scene_index, self.kind)
    }
}

/// Story and scene without a kind (session cache granularity)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneKey {
    /// Owning story
    pub story_id: Arc<str>,
    /// Zero-based scene position
    pub scene_index: usize,
}

impl SceneKey {
    /// Create new scene key
    #[inline]
    #[must_use]
    pub fn new(story_id: impl Into<Arc<str>>, scene_index: usize) -> Self {
        Self {
            story_id: story_id.into(),
            scene_index,
        }
    }

    /// Asset key for one kind of this scene
    #[inline]
    #[must_use]
    pub fn asset(&self, kind: AssetKind) -> SceneAssetKey {
        SceneAssetKey {
            story_id: Arc::clone(&self.story_id),
            scene_index: self.scene_index,
            kind,
        }
    }
}
