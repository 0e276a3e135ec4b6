//! Orchestrator facade
//!
//! Wires the tiers, pipeline, scheduler and workshop from one
//! [`OrchestratorConfig`] with an explicit lifetime: everything is created
//! here at startup and shared through `Arc`s afterwards.

use crate::audit::AuditLog;
use crate::authoring::{StoryAuthor, StoryRequest, StoryWorkshop};
use crate::backend::SharedBackend;
use crate::config::OrchestratorConfig;
use crate::error::{AuthoringError, NavigationError, StoryloomResult};
use crate::library::{builtin_library, Story};
use crate::pipeline::AssetPipeline;
use crate::scheduler::LookaheadScheduler;
use crate::session::ReadingSession;
use std::sync::Arc;
use storyloom_assets::{FsAssetStore, MemoryAssetStore, SharedAssetStore};

/// Fully wired storybook orchestrator
#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    scheduler: Arc<LookaheadScheduler>,
    workshop: Option<StoryWorkshop>,
    library: Vec<Arc<Story>>,
}

impl Orchestrator {
    /// Open the durable tier named by the config and wire everything up
    ///
    /// A durable directory that cannot be opened degrades to a disabled
    /// store rather than failing.
    ///
    /// # Errors
    /// Invalid configuration
    pub async fn open(config: OrchestratorConfig, backend: SharedBackend) -> StoryloomResult<Self> {
        config.validate()?;
        let durable: SharedAssetStore = match &config.asset_dir {
            Some(dir) => FsAssetStore::open_or_disabled(dir.clone()).await,
            None => Arc::new(MemoryAssetStore::new()),
        };
        Ok(Self::with_store(config, durable, backend))
    }

    /// Wire up over an existing durable store
    #[must_use]
    pub fn with_store(config: OrchestratorConfig, durable: SharedAssetStore, backend: SharedBackend) -> Self {
        let pipeline = AssetPipeline::new(durable, backend, ReadingSession::new())
            .with_retry(config.retry.policy())
            .with_audit(Arc::new(AuditLog::new(config.audit_capacity)));
        let scheduler = Arc::new(LookaheadScheduler::new(Arc::new(pipeline), &config));
        Self {
            config,
            scheduler,
            workshop: None,
            library: builtin_library(),
        }
    }

    /// With a story author enabling the workshop
    #[must_use]
    pub fn with_author(mut self, author: Arc<dyn StoryAuthor>) -> Self {
        self.workshop = Some(StoryWorkshop::new(
            author,
            self.config.authoring_retry.policy(),
            Arc::clone(&self.scheduler),
        ));
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Scheduler driving the session
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Arc<LookaheadScheduler> {
        &self.scheduler
    }

    /// Reading session
    #[inline]
    #[must_use]
    pub fn session(&self) -> &ReadingSession {
        self.scheduler.session()
    }

    /// Audit ledger
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        self.scheduler.pipeline().audit()
    }

    /// Stories available to open, custom stories first
    #[inline]
    #[must_use]
    pub fn library(&self) -> &[Arc<Story>] {
        &self.library
    }

    /// Open a library story by id
    ///
    /// # Errors
    /// Unknown id or a story without scenes
    pub async fn open_story(&self, id: &str) -> Result<u64, NavigationError> {
        let story = self
            .library
            .iter()
            .find(|story| story.id == id)
            .cloned()
            .ok_or_else(|| NavigationError::UnknownStory(id.to_string()))?;
        self.scheduler.select_story(story).await
    }

    /// Author a custom story, add it to the library and open it
    ///
    /// # Errors
    /// No author configured, or authoring failed
    pub async fn author_story(&mut self, request: StoryRequest) -> Result<Arc<Story>, AuthoringError> {
        let workshop = self
            .workshop
            .as_ref()
            .ok_or(AuthoringError::NoAuthor)?;
        let story = workshop.author(request).await?;
        self.library.insert(0, Arc::clone(&story));
        Ok(story)
    }
}
