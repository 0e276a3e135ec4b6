//! Storyloom Core - storybook asset orchestration
//!
//! Keeps a reader's next pages ready without wasting generation budget:
//! - Resolves scene illustrations and narration through durable store,
//!   session cache and rate-limited backend, in that order
//! - Deduplicates concurrent resolutions per asset
//! - Schedules a staggered lookahead window from reader navigation
//! - Fences late results from abandoned sessions by epoch
//! - Authors custom stories and keeps a generation audit ledger
//!
//! # Example
//!
//! ```rust,ignore
//! use storyloom_core::prelude::*;
//!
//! # async fn example(backend: SharedBackend) -> StoryloomResult<()> {
//! let orchestrator = Orchestrator::open(OrchestratorConfig::new(), backend).await?;
//! orchestrator.open_story("blue-jackal").await?;
//! orchestrator.scheduler().start_reading()?;
//! orchestrator.scheduler().advance()?;
//! orchestrator.scheduler().settle().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod audit;
pub mod authoring;
pub mod backend;
pub mod config;
pub mod error;
pub mod inflight;
pub mod library;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod session;

pub use audit::{AuditEntry, AuditKind, AuditLog, AuditTotals};
pub use authoring::{Authored, GeneratedStory, StoryAuthor, StoryRequest, StoryWorkshop};
pub use backend::{Generated, GenerationBackend, KindBehavior, SharedBackend, TokenUsage};
pub use config::{OrchestratorConfig, RetrySettings};
pub use error::{
    AuthoringError, ConfigError, GenerationError, NavigationError, StoryloomError, StoryloomResult,
};
pub use inflight::{InFlightClaim, InFlightRegistry};
pub use library::{builtin_library, find_builtin, SceneScript, Story};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    AssetPipeline, Priority, ResolveOutcome, ResolveRequest, ResolvedFrom, SkipReason, Submission,
};
pub use retry::{RetryClassifier, RetryPolicy};
pub use scheduler::{LookaheadScheduler, Step};
pub use session::{
    AppPhase, AssetSlot, Delivery, ReadingCursor, ReadingSceneState, ReadingSession, ScenePatch,
    SessionView,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a reading session
    pub use crate::{
        AppPhase, AssetPipeline, GenerationBackend, GenerationError, LookaheadScheduler,
        Orchestrator, OrchestratorConfig, ReadingSession, SharedBackend, Step, Story,
        StoryloomResult,
    };
    pub use storyloom_assets::{AssetKind, SceneAssetKey};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
