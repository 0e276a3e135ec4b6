//! Lookahead scheduler
//!
//! State machine over the reading cursor. Story selection and each advance
//! submit a window: the current scene at [`Priority::Immediate`] and the next
//! `lookahead_depth` scenes deferred by the stagger delay. Retreat only moves
//! the cursor.

use crate::config::OrchestratorConfig;
use crate::error::NavigationError;
use crate::library::Story;
use crate::pipeline::{AssetPipeline, Priority, ResolveOutcome, ResolveRequest, Submission};
use crate::session::{AppPhase, ReadingSession};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use storyloom_assets::{AssetKind, SceneAssetKey};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Cursor now on this scene
    Moved(usize),
    /// Advanced past the last scene
    Finished,
    /// Nothing to do (retreat at scene 0)
    Stayed,
}

/// Drives resolution from reader navigation
#[derive(Debug)]
pub struct LookaheadScheduler {
    pipeline: Arc<AssetPipeline>,
    lookahead_depth: usize,
    stagger_delay: Duration,
    pending: Mutex<Vec<JoinHandle<ResolveOutcome>>>,
}

impl LookaheadScheduler {
    /// Create scheduler over `pipeline`
    #[must_use]
    pub fn new(pipeline: Arc<AssetPipeline>, config: &OrchestratorConfig) -> Self {
        Self {
            pipeline,
            lookahead_depth: config.lookahead_depth,
            stagger_delay: config.stagger_delay(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Pipeline driven by this scheduler
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Arc<AssetPipeline> {
        &self.pipeline
    }

    /// Reading session
    #[inline]
    #[must_use]
    pub fn session(&self) -> &ReadingSession {
        self.pipeline.session()
    }

    /// Scenes submitted for a cursor at `index`, with their priority
    #[must_use]
    pub fn window(&self, index: usize, scene_count: usize) -> Vec<(usize, Priority)> {
        let end = index
            .saturating_add(self.lookahead_depth)
            .min(scene_count.saturating_sub(1));
        (index..=end)
            .filter(|&scene| scene < scene_count)
            .map(|scene| {
                let priority = if scene == index || self.stagger_delay.is_zero() {
                    Priority::Immediate
                } else {
                    Priority::Deferred(self.stagger_delay)
                };
                (scene, priority)
            })
            .collect()
    }

    /// Open `story` and start resolving its first window
    ///
    /// Session-cache hits are visible as soon as the scenes exist; durable
    /// hits are applied before any generation is submitted. Returns the
    /// session epoch.
    ///
    /// # Errors
    /// [`NavigationError::EmptyStory`] for a story without scenes
    pub async fn select_story(&self, story: Arc<Story>) -> Result<u64, NavigationError> {
        if story.scenes.is_empty() {
            return Err(NavigationError::EmptyStory(story.id.clone()));
        }

        let cache = self.pipeline.cache();
        let epoch = self
            .session()
            .initialize(Arc::clone(&story), |scene| cache.get_scene(scene));
        info!(story = %story.id, epoch, scenes = story.scene_count(), "story selected");

        self.hydrate_from_durable(&story, epoch).await;

        if self.session().epoch() == epoch {
            self.submit_window(epoch, 0);
        } else {
            debug!(story = %story.id, epoch, "session replaced during hydration");
        }
        Ok(epoch)
    }

    async fn hydrate_from_durable(&self, story: &Story, epoch: u64) {
        let view = self.session().snapshot();
        let story_id: Arc<str> = Arc::from(story.id.as_str());
        let missing: Vec<_> = view
            .scenes
            .iter()
            .enumerate()
            .flat_map(|(index, scene)| {
                AssetKind::ALL
                    .into_iter()
                    .filter(|&kind| !scene.slot(kind).is_resolved())
                    .map(move |kind| (index, kind))
            })
            .map(|(index, kind)| SceneAssetKey::new(Arc::clone(&story_id), index, kind))
            .collect();

        let durable = self.pipeline.durable();
        let lookups = join_all(missing.iter().map(|key| durable.get(key))).await;

        let mut hydrated = 0usize;
        for (key, found) in missing.iter().zip(lookups) {
            match found {
                Ok(Some(record)) => {
                    self.pipeline.cache().insert(record.clone());
                    self.session().complete(epoch, key, record.payload);
                    hydrated += 1;
                }
                Ok(None) => {}
                Err(error) => warn!(asset = %key, %error, "durable lookup failed during hydration"),
            }
        }
        if hydrated > 0 {
            debug!(story = %story.id, hydrated, "hydrated scenes from durable store");
        }
    }

    /// Leave the cover and show scene 0
    ///
    /// # Errors
    /// Outside the intro or finished phase
    pub fn start_reading(&self) -> Result<Step, NavigationError> {
        let view = self.session().snapshot();
        if !matches!(view.phase, AppPhase::Intro | AppPhase::Finished) {
            return Err(invalid("start reading", &view.phase));
        }
        if !self.session().move_cursor(view.epoch, 0, Some(AppPhase::Reading)) {
            return Err(NavigationError::NoStorySelected);
        }
        self.submit_window(view.epoch, 0);
        Ok(Step::Moved(0))
    }

    /// Move to the next scene, or finish after the last one
    ///
    /// # Errors
    /// Outside the reading phase
    pub fn advance(&self) -> Result<Step, NavigationError> {
        let view = self.session().snapshot();
        if view.phase != AppPhase::Reading {
            return Err(invalid("advance", &view.phase));
        }
        let cursor = view.cursor.ok_or(NavigationError::NoStorySelected)?;

        if cursor.at_last_scene() {
            self.session().set_phase(view.epoch, AppPhase::Finished);
            info!(story = %cursor.story_id, "story finished");
            return Ok(Step::Finished);
        }

        let next = cursor.current_index + 1;
        self.session().move_cursor(view.epoch, next, None);
        self.submit_window(view.epoch, next);
        Ok(Step::Moved(next))
    }

    /// Move to the previous scene; submits nothing
    ///
    /// # Errors
    /// Outside the reading phase
    pub fn retreat(&self) -> Result<Step, NavigationError> {
        let view = self.session().snapshot();
        if view.phase != AppPhase::Reading {
            return Err(invalid("go back", &view.phase));
        }
        let cursor = view.cursor.ok_or(NavigationError::NoStorySelected)?;

        match cursor.current_index.checked_sub(1) {
            Some(previous) => {
                self.session().move_cursor(view.epoch, previous, None);
                Ok(Step::Moved(previous))
            }
            None => Ok(Step::Stayed),
        }
    }

    /// Abandon the open story
    ///
    /// In-flight resolutions run to completion but can no longer write into
    /// the session. Returns the new epoch.
    pub fn return_to_library(&self) -> u64 {
        let epoch = self.session().reset();
        info!(epoch, "returned to library");
        epoch
    }

    /// Clear an authoring error
    ///
    /// # Errors
    /// When no error is showing
    pub fn dismiss_error(&self) -> Result<u64, NavigationError> {
        let phase = self.session().phase();
        if !matches!(phase, AppPhase::Error(_)) {
            return Err(invalid("dismiss error", &phase));
        }
        Ok(self.session().reset())
    }

    fn submit_window(&self, epoch: u64, index: usize) {
        let view = self.session().snapshot();
        if view.epoch != epoch {
            return;
        }
        let Some(story_id) = view.cursor.as_ref().map(|c| Arc::clone(&c.story_id)) else {
            return;
        };

        let mut spawned = Vec::new();
        for (scene_index, priority) in self.window(index, view.scenes.len()) {
            let scene = &view.scenes[scene_index];
            for kind in AssetKind::ALL {
                let key = SceneAssetKey::new(Arc::clone(&story_id), scene_index, kind);
                let request = ResolveRequest::new(key, scene.source_text(kind), epoch)
                    .with_priority(priority);
                if let Submission::Spawned(handle) = self.pipeline.submit(request) {
                    spawned.push(handle);
                }
            }
        }
        debug!(story = %story_id, index, spawned = spawned.len(), "window submitted");

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.extend(spawned);
    }

    /// Number of resolutions submitted by this scheduler still running
    #[must_use]
    pub fn pending(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.len()
    }

    /// Wait for every submitted resolution to finish
    ///
    /// Returns the outcomes of the resolutions awaited by this call.
    pub async fn settle(&self) -> Vec<ResolveOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let handles = std::mem::take(&mut *self.pending.lock());
            if handles.is_empty() {
                return outcomes;
            }
            for joined in join_all(handles).await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(error) => warn!(%error, "resolution task did not complete"),
                }
            }
        }
    }
}

fn invalid(operation: &'static str, phase: &AppPhase) -> NavigationError {
    NavigationError::InvalidPhase {
        operation,
        phase: phase.to_string(),
    }
}
