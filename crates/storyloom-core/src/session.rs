//! Reading session state
//!
//! The view-model the pipeline writes into and the presentation layer reads
//! from. State lives in a [`watch`] channel: every mutation is one atomic
//! replacement from a subscriber's point of view, so a URL and its cleared
//! loading flag always appear together.
//!
//! Each reset or story switch bumps the session `epoch`. Writers pass the
//! epoch they were started under; stale writers are fenced out.

use crate::library::Story;
use std::fmt;
use std::sync::Arc;
use storyloom_assets::{AssetKind, AssetPayload, MediaEntry, SceneAssetKey, SceneKey};
use tokio::sync::watch;

/// One asset's projection for a scene
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSlot {
    /// Resolved media reference
    pub url: Option<AssetPayload>,
    /// A resolution is in flight
    pub generating: bool,
}

impl AssetSlot {
    /// Whether the asset is available
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.url.is_some()
    }
}

/// Per-scene mutable projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingSceneState {
    /// Narrated text
    pub narrative: String,
    /// Illustration prompt
    pub image_prompt: String,
    /// Illustration slot
    pub image: AssetSlot,
    /// Narration slot
    pub audio: AssetSlot,
}

impl ReadingSceneState {
    /// Fresh scene with nothing resolved
    #[inline]
    #[must_use]
    pub fn new(narrative: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            image_prompt: image_prompt.into(),
            image: AssetSlot::default(),
            audio: AssetSlot::default(),
        }
    }

    /// Slot for `kind`
    #[inline]
    #[must_use]
    pub fn slot(&self, kind: AssetKind) -> &AssetSlot {
        match kind {
            AssetKind::Image => &self.image,
            AssetKind::Audio => &self.audio,
        }
    }

    #[inline]
    fn slot_mut(&mut self, kind: AssetKind) -> &mut AssetSlot {
        match kind {
            AssetKind::Image => &mut self.image,
            AssetKind::Audio => &mut self.audio,
        }
    }

    /// Generation input for `kind`
    #[inline]
    #[must_use]
    pub fn source_text(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Image => &self.image_prompt,
            AssetKind::Audio => &self.narrative,
        }
    }

    /// Illustration URL
    #[inline]
    #[must_use]
    pub fn image_url(&self) -> Option<&AssetPayload> {
        self.image.url.as_ref()
    }

    /// Narration URL
    #[inline]
    #[must_use]
    pub fn audio_url(&self) -> Option<&AssetPayload> {
        self.audio.url.as_ref()
    }

    /// Illustration in flight
    #[inline]
    #[must_use]
    pub fn is_generating_image(&self) -> bool {
        self.image.generating
    }

    /// Narration in flight
    #[inline]
    #[must_use]
    pub fn is_generating_audio(&self) -> bool {
        self.audio.generating
    }

    /// Fill empty slots from a cache entry
    fn hydrate(&mut self, entry: &MediaEntry) {
        for kind in AssetKind::ALL {
            let slot = self.slot_mut(kind);
            if slot.url.is_none() {
                slot.url = entry.get(kind).map(|record| record.payload.clone());
            }
        }
    }
}

/// Partial update for one scene
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenePatch {
    image_url: Option<AssetPayload>,
    image_generating: Option<bool>,
    audio_url: Option<AssetPayload>,
    audio_generating: Option<bool>,
}

impl ScenePatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL for `kind`
    #[must_use]
    pub fn url(mut self, kind: AssetKind, payload: AssetPayload) -> Self {
        match kind {
            AssetKind::Image => self.image_url = Some(payload),
            AssetKind::Audio => self.audio_url = Some(payload),
        }
        self
    }

    /// Set the generating flag for `kind`
    #[must_use]
    pub fn generating(mut self, kind: AssetKind, generating: bool) -> Self {
        match kind {
            AssetKind::Image => self.image_generating = Some(generating),
            AssetKind::Audio => self.audio_generating = Some(generating),
        }
        self
    }

    fn apply(self, scene: &mut ReadingSceneState) {
        if let Some(url) = self.image_url {
            scene.image.url = Some(url);
        }
        if let Some(flag) = self.image_generating {
            scene.image.generating = flag;
        }
        if let Some(url) = self.audio_url {
            scene.audio.url = Some(url);
        }
        if let Some(flag) = self.audio_generating {
            scene.audio.generating = flag;
        }
    }
}

/// Application phase
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppPhase {
    /// Browsing stories; no session content
    #[default]
    Library,
    /// Story selected, cover showing
    Intro,
    /// Custom story being authored
    GeneratingText,
    /// Paging through scenes
    Reading,
    /// Advanced past the last scene
    Finished,
    /// Story authoring failed
    Error(String),
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppPhase::Library => f.write_str("library"),
            AppPhase::Intro => f.write_str("intro"),
            AppPhase::GeneratingText => f.write_str("generating_text"),
            AppPhase::Reading => f.write_str("reading"),
            AppPhase::Finished => f.write_str("finished"),
            AppPhase::Error(_) => f.write_str("error"),
        }
    }
}

/// Position within the open story
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingCursor {
    /// Open story
    pub story_id: Arc<str>,
    /// Number of scenes in the story
    pub scene_count: usize,
    /// Scene on screen
    pub current_index: usize,
}

impl ReadingCursor {
    /// Whether the cursor sits on the last scene
    #[inline]
    #[must_use]
    pub fn at_last_scene(&self) -> bool {
        self.current_index + 1 >= self.scene_count
    }
}

/// Snapshot of the whole session
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    /// Liveness token; bumped on every reset and story switch
    pub epoch: u64,
    /// Current phase
    pub phase: AppPhase,
    /// Open story
    pub story: Option<Arc<Story>>,
    /// Reading position
    pub cursor: Option<ReadingCursor>,
    /// Per-scene state
    pub scenes: Vec<ReadingSceneState>,
}

impl SessionView {
    /// Id of the open story
    #[inline]
    #[must_use]
    pub fn story_id(&self) -> Option<&str> {
        self.cursor.as_ref().map(|c| &*c.story_id)
    }

    /// Scene on screen
    #[inline]
    #[must_use]
    pub fn current_scene(&self) -> Option<&ReadingSceneState> {
        self.cursor
            .as_ref()
            .and_then(|c| self.scenes.get(c.current_index))
    }

    fn scene_for_mut(&mut self, key: &SceneAssetKey) -> Option<&mut ReadingSceneState> {
        if self.story_id() != Some(&*key.story_id) {
            return None;
        }
        self.scenes.get_mut(key.scene_index)
    }
}

/// How a completed payload landed in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written under the live epoch
    Applied,
    /// Stale writer, but the live session shows the same story and the slot
    /// was empty: payload hydrated the slot
    Hydrated,
    /// Dropped: stale writer for another story, or nothing to fill
    Discarded,
}

/// Shared reading session
///
/// Cloning shares the session.
#[derive(Debug, Clone)]
pub struct ReadingSession {
    tx: Arc<watch::Sender<SessionView>>,
}

impl ReadingSession {
    /// Create an empty session in the library
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionView::default());
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to state changes
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.tx.subscribe()
    }

    /// Copy of the current state
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        self.tx.borrow().clone()
    }

    /// Current epoch
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> AppPhase {
        self.tx.borrow().phase.clone()
    }

    /// Current cursor
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> Option<ReadingCursor> {
        self.tx.borrow().cursor.clone()
    }

    /// Copy of one scene
    #[inline]
    #[must_use]
    pub fn scene(&self, index: usize) -> Option<ReadingSceneState> {
        self.tx.borrow().scenes.get(index).cloned()
    }

    /// Open `story` at scene 0 in the intro phase
    ///
    /// Scenes are hydrated from `cached` as they are created. Returns the
    /// new epoch.
    pub fn initialize<F>(&self, story: Arc<Story>, cached: F) -> u64
    where
        F: Fn(&SceneKey) -> Option<MediaEntry>,
    {
        let story_id: Arc<str> = Arc::from(story.id.as_str());
        let scenes: Vec<_> = story
            .scenes
            .iter()
            .enumerate()
            .map(|(index, script)| {
                let mut scene = ReadingSceneState::new(&script.narrative, &script.image_prompt);
                if let Some(entry) = cached(&SceneKey::new(Arc::clone(&story_id), index)) {
                    scene.hydrate(&entry);
                }
                scene
            })
            .collect();

        let mut epoch = 0;
        self.tx.send_modify(|view| {
            view.epoch += 1;
            epoch = view.epoch;
            view.phase = AppPhase::Intro;
            view.cursor = Some(ReadingCursor {
                story_id,
                scene_count: scenes.len(),
                current_index: 0,
            });
            view.scenes = scenes;
            view.story = Some(story);
        });
        epoch
    }

    /// Apply a partial update to one scene under `epoch`
    ///
    /// Returns whether the update landed.
    pub fn update_scene(&self, epoch: u64, index: usize, patch: ScenePatch) -> bool {
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch {
                return false;
            }
            match view.scenes.get_mut(index) {
                Some(scene) => {
                    patch.apply(scene);
                    true
                }
                None => false,
            }
        })
    }

    /// Back to the library; all pending work is logically abandoned
    ///
    /// Returns the new epoch.
    pub fn reset(&self) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|view| {
            view.epoch += 1;
            epoch = view.epoch;
            view.phase = AppPhase::Library;
            view.story = None;
            view.cursor = None;
            view.scenes.clear();
        });
        epoch
    }

    /// Move to `phase` under `epoch`
    pub fn set_phase(&self, epoch: u64, phase: AppPhase) -> bool {
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch || view.phase == phase {
                return false;
            }
            view.phase = phase;
            true
        })
    }

    /// Enter a phase that discards the open story (authoring, error)
    ///
    /// Returns the new epoch.
    pub fn enter_detached(&self, phase: AppPhase) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|view| {
            view.epoch += 1;
            epoch = view.epoch;
            view.phase = phase;
            view.story = None;
            view.cursor = None;
            view.scenes.clear();
        });
        epoch
    }

    /// Move the cursor under `epoch`, optionally changing phase
    pub(crate) fn move_cursor(&self, epoch: u64, index: usize, phase: Option<AppPhase>) -> bool {
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch {
                return false;
            }
            let Some(cursor) = view.cursor.as_mut() else {
                return false;
            };
            if index >= cursor.scene_count {
                return false;
            }
            cursor.current_index = index;
            if let Some(phase) = phase {
                view.phase = phase;
            }
            true
        })
    }

    /// Whether the slot for `key` already holds a URL under `epoch`
    #[must_use]
    pub fn is_resolved(&self, epoch: u64, key: &SceneAssetKey) -> bool {
        let view = self.tx.borrow();
        view.epoch == epoch
            && view.story_id() == Some(&*key.story_id)
            && view
                .scenes
                .get(key.scene_index)
                .is_some_and(|scene| scene.slot(key.kind).is_resolved())
    }

    /// Raise the generating flag for `key`
    pub fn mark_generating(&self, epoch: u64, key: &SceneAssetKey) -> bool {
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch {
                return false;
            }
            match view.scene_for_mut(key) {
                Some(scene) if !scene.slot(key.kind).is_resolved() => {
                    scene.slot_mut(key.kind).generating = true;
                    true
                }
                _ => false,
            }
        })
    }

    /// Hand a resolution started under an abandoned epoch to the live session
    ///
    /// Succeeds only when the live session shows the same story and the slot
    /// is still empty. Raises the generating flag and returns the live epoch.
    pub fn adopt(&self, key: &SceneAssetKey) -> Option<u64> {
        let mut adopted = None;
        self.tx.send_if_modified(|view| {
            let live = view.epoch;
            match view.scene_for_mut(key) {
                Some(scene) if !scene.slot(key.kind).is_resolved() => {
                    scene.slot_mut(key.kind).generating = true;
                    adopted = Some(live);
                    true
                }
                _ => false,
            }
        });
        adopted
    }

    /// Deliver a resolved payload and clear the generating flag in one step
    pub fn complete(&self, epoch: u64, key: &SceneAssetKey, payload: AssetPayload) -> Delivery {
        let mut delivery = Delivery::Discarded;
        self.tx.send_if_modified(|view| {
            let live = view.epoch == epoch;
            let Some(scene) = view.scene_for_mut(key) else {
                return false;
            };
            let slot = scene.slot_mut(key.kind);
            if live {
                slot.url = Some(payload);
                slot.generating = false;
                delivery = Delivery::Applied;
                true
            } else if slot.url.is_none() {
                slot.url = Some(payload);
                delivery = Delivery::Hydrated;
                true
            } else {
                false
            }
        });
        delivery
    }

    /// Clear the generating flag after a failed resolution
    ///
    /// The URL stays unset so a later trigger may retry.
    pub fn fail(&self, epoch: u64, key: &SceneAssetKey) -> bool {
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch {
                return false;
            }
            match view.scene_for_mut(key) {
                Some(scene) if scene.slot(key.kind).generating => {
                    scene.slot_mut(key.kind).generating = false;
                    true
                }
                _ => false,
            }
        })
    }
}

impl Default for ReadingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, scenes: usize) -> Arc<Story> {
        let mut story = Story::new(id, id);
        for i in 0..scenes {
            story = story.with_scene(format!("text {i}"), format!("prompt {i}"));
        }
        Arc::new(story)
    }

    fn key(story: &str, scene: usize, kind: AssetKind) -> SceneAssetKey {
        SceneAssetKey::new(story, scene, kind)
    }

    #[test]
    fn initialize_builds_scenes_and_bumps_epoch() {
        let session = ReadingSession::new();
        assert_eq!(session.phase(), AppPhase::Library);

        let epoch = session.initialize(story("s", 3), |_| None);
        let view = session.snapshot();

        assert_eq!(epoch, 1);
        assert_eq!(view.phase, AppPhase::Intro);
        assert_eq!(view.scenes.len(), 3);
        assert_eq!(view.cursor.unwrap().current_index, 0);
        assert_eq!(view.scenes[1].source_text(AssetKind::Image), "prompt 1");
        assert_eq!(view.scenes[1].source_text(AssetKind::Audio), "text 1");
    }

    #[test]
    fn initialize_hydrates_from_cache() {
        use storyloom_assets::AssetRecord;

        let session = ReadingSession::new();
        session.initialize(story("s", 2), |scene| {
            (scene.scene_index == 1).then(|| {
                MediaEntry::from_record(AssetRecord::new(scene.asset(AssetKind::Audio), "aud"))
            })
        });

        let scene = session.scene(1).unwrap();
        assert_eq!(scene.audio_url().unwrap().as_str(), "aud");
        assert!(scene.image_url().is_none());
        assert!(!scene.is_generating_audio());
    }

    #[test]
    fn complete_sets_url_and_clears_flag_together() {
        let session = ReadingSession::new();
        let epoch = session.initialize(story("s", 2), |_| None);
        let k = key("s", 0, AssetKind::Image);

        assert!(session.mark_generating(epoch, &k));
        assert!(session.scene(0).unwrap().is_generating_image());

        let mut rx = session.subscribe();
        rx.mark_unchanged();
        assert_eq!(session.complete(epoch, &k, "img".into()), Delivery::Applied);

        assert!(rx.has_changed().unwrap());
        let scene = rx.borrow_and_update().scenes[0].clone();
        assert_eq!(scene.image_url().unwrap().as_str(), "img");
        assert!(!scene.is_generating_image());
    }

    #[test]
    fn fail_clears_flag_only() {
        let session = ReadingSession::new();
        let epoch = session.initialize(story("s", 1), |_| None);
        let k = key("s", 0, AssetKind::Audio);

        session.mark_generating(epoch, &k);
        assert!(session.fail(epoch, &k));

        let scene = session.scene(0).unwrap();
        assert!(!scene.is_generating_audio());
        assert!(scene.audio_url().is_none());
    }

    #[test]
    fn stale_writer_for_other_story_is_discarded() {
        let session = ReadingSession::new();
        let stale = session.initialize(story("a", 2), |_| None);
        session.initialize(story("b", 2), |_| None);

        let delivery = session.complete(stale, &key("a", 0, AssetKind::Image), "img-a".into());

        assert_eq!(delivery, Delivery::Discarded);
        assert!(session.scene(0).unwrap().image_url().is_none());
        assert!(!session.fail(stale, &key("a", 0, AssetKind::Image)));
    }

    #[test]
    fn stale_writer_for_same_story_hydrates_empty_slot() {
        let session = ReadingSession::new();
        let stale = session.initialize(story("a", 2), |_| None);
        session.reset();
        let live = session.initialize(story("a", 2), |_| None);
        assert_ne!(stale, live);

        let k = key("a", 1, AssetKind::Audio);
        assert_eq!(session.complete(stale, &k, "aud".into()), Delivery::Hydrated);
        assert_eq!(session.scene(1).unwrap().audio_url().unwrap().as_str(), "aud");

        // Filled slots are never overwritten by stale writers.
        assert_eq!(session.complete(stale, &k, "other".into()), Delivery::Discarded);
    }

    #[test]
    fn adopt_requires_same_story_and_empty_slot() {
        let session = ReadingSession::new();
        session.initialize(story("a", 2), |_| None);
        session.reset();
        let live = session.initialize(story("a", 2), |_| None);

        let k = key("a", 1, AssetKind::Image);
        assert_eq!(session.adopt(&k), Some(live));
        assert!(session.scene(1).unwrap().is_generating_image());

        session.complete(live, &k, "img".into());
        assert_eq!(session.adopt(&k), None);

        session.initialize(story("b", 2), |_| None);
        assert_eq!(session.adopt(&key("a", 0, AssetKind::Audio)), None);
    }

    #[test]
    fn update_scene_is_fenced() {
        let session = ReadingSession::new();
        let epoch = session.initialize(story("s", 1), |_| None);
        let patch = ScenePatch::new().generating(AssetKind::Image, true);

        assert!(!session.update_scene(epoch + 1, 0, patch.clone()));
        assert!(!session.update_scene(epoch, 5, patch.clone()));
        assert!(session.update_scene(epoch, 0, patch));
        assert!(session.scene(0).unwrap().is_generating_image());
    }

    #[test]
    fn reset_clears_session() {
        let session = ReadingSession::new();
        session.initialize(story("s", 2), |_| None);
        let epoch = session.reset();

        let view = session.snapshot();
        assert_eq!(epoch, 2);
        assert_eq!(view.phase, AppPhase::Library);
        assert!(view.scenes.is_empty());
        assert!(view.cursor.is_none());
    }
}
