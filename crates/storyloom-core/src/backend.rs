//! Generation backend adapter contract
//!
//! The expensive, rate-limited synthesis calls. Prompt templates and
//! provider request shapes live behind this trait; the orchestrator only
//! sees normalised payloads and classified errors.

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use storyloom_assets::{AssetKind, AssetPayload};

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Response tokens
    pub response_tokens: u64,
    /// Total billed tokens
    pub total_tokens: u64,
}

/// Successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Encoded media reference
    pub payload: AssetPayload,
    /// Provider usage metadata, if any
    pub usage: Option<TokenUsage>,
}

impl Generated {
    /// Payload without usage metadata
    #[inline]
    #[must_use]
    pub fn new(payload: impl Into<AssetPayload>) -> Self {
        Self {
            payload: payload.into(),
            usage: None,
        }
    }

    /// With usage metadata
    #[inline]
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Image and speech synthesis
#[async_trait]
pub trait GenerationBackend: Send + Sync + Debug {
    /// Illustrate a scene from its image prompt
    async fn generate_image(&self, prompt: &str) -> Result<Generated, GenerationError>;

    /// Narrate a scene's text
    async fn generate_speech(&self, text: &str) -> Result<Generated, GenerationError>;
}

/// Shared handle to a backend
pub type SharedBackend = Arc<dyn GenerationBackend>;

/// Per-kind behaviour table
///
/// The pipeline is written once over [`AssetKind`]; everything that differs
/// between images and narration is looked up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindBehavior {
    /// Kind this entry describes
    pub kind: AssetKind,
    /// Operation name used in logs and retry warnings
    pub operation: &'static str,
    /// Audit ledger label
    pub audit_label: &'static str,
}

impl KindBehavior {
    const IMAGE: KindBehavior = KindBehavior {
        kind: AssetKind::Image,
        operation: "generate_scene_image",
        audit_label: "Scene Illustration",
    };

    const AUDIO: KindBehavior = KindBehavior {
        kind: AssetKind::Audio,
        operation: "generate_speech",
        audit_label: "Narration",
    };

    /// Behaviour entry for a kind
    #[inline]
    #[must_use]
    pub fn of(kind: AssetKind) -> &'static KindBehavior {
        match kind {
            AssetKind::Image => &Self::IMAGE,
            AssetKind::Audio => &Self::AUDIO,
        }
    }

    /// Storage suffix for the kind
    #[inline]
    #[must_use]
    pub fn cache_key_suffix(&self) -> &'static str {
        self.kind.suffix()
    }

    /// Invoke the backend operation for this kind
    ///
    /// # Errors
    /// Whatever the backend reports
    pub async fn fetch(
        &self,
        backend: &dyn GenerationBackend,
        source_text: &str,
    ) -> Result<Generated, GenerationError> {
        match self.kind {
            AssetKind::Image => backend.generate_image(source_text).await,
            AssetKind::Audio => backend.generate_speech(source_text).await,
        }
    }
}
