//! Testing utilities for the Storyloom workspace
//!
//! Scripted backends, instrumented stores and story fixtures shared by the
//! integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storyloom_assets::{
    AssetKind, AssetRecord, AssetStore, MemoryAssetStore, SceneAssetKey, StoreError, StoreResult,
};
use storyloom_core::{
    AssetPipeline, Authored, GeneratedStory, Generated, GenerationBackend, GenerationError,
    LookaheadScheduler, OrchestratorConfig, ReadingSession, SceneScript, Story, StoryAuthor,
    StoryRequest, TokenUsage,
};
use tokio::sync::{watch, Semaphore};

/// Payload the scripted backend returns for an image prompt
pub fn image_payload(prompt: &str) -> String {
    format!("img:{prompt}")
}

/// Payload the scripted backend returns for narration text
pub fn audio_payload(text: &str) -> String {
    format!("aud:{text}")
}

/// Usage the scripted backend reports per call
pub const SCRIPTED_USAGE: TokenUsage = TokenUsage {
    prompt_tokens: 3,
    response_tokens: 7,
    total_tokens: 10,
};

/// Generation backend with scripted failures, latency and an optional gate
#[derive(Debug)]
pub struct ScriptedBackend {
    latency: Duration,
    rate_limit_all: bool,
    rate_limits: DashMap<String, usize>,
    terminal: DashSet<String>,
    gate: Option<Semaphore>,
    calls: DashMap<(AssetKind, String), usize>,
    total: AtomicUsize,
    active: DashMap<(AssetKind, String), usize>,
    peak_per_key: AtomicUsize,
    started: watch::Sender<usize>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let (started, _) = watch::channel(0);
        Self {
            latency: Duration::ZERO,
            rate_limit_all: false,
            rate_limits: DashMap::new(),
            terminal: DashSet::new(),
            gate: None,
            calls: DashMap::new(),
            total: AtomicUsize::new(0),
            active: DashMap::new(),
            peak_per_key: AtomicUsize::new(0),
            started,
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every call fails rate-limited
    pub fn rate_limit_always(mut self) -> Self {
        self.rate_limit_all = true;
        self
    }

    /// Calls for `text` fail rate-limited `times` times, then succeed
    pub fn rate_limit_times(self, text: &str, times: usize) -> Self {
        self.rate_limits.insert(text.to_string(), times);
        self
    }

    /// Calls for `text` fail terminally
    pub fn fail_terminally(self, text: &str) -> Self {
        self.terminal.insert(text.to_string());
        self
    }

    /// Calls block until [`release`](Self::release)d
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let `n` blocked calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Open the gate for good
    pub fn release_all(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    /// Wait until at least `n` calls have started
    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    /// Total calls issued
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Calls issued for one kind and input text
    pub fn calls_for(&self, kind: AssetKind, text: &str) -> usize {
        self.calls
            .get(&(kind, text.to_string()))
            .map_or(0, |count| *count)
    }

    /// Calls issued for one kind
    pub fn calls_of_kind(&self, kind: AssetKind) -> usize {
        self.calls
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| *entry.value())
            .sum()
    }

    /// Highest number of simultaneous calls seen for any single input
    pub fn peak_concurrency_per_key(&self) -> usize {
        self.peak_per_key.load(Ordering::SeqCst)
    }

    async fn call(&self, kind: AssetKind, text: &str) -> Result<Generated, GenerationError> {
        let id = (kind, text.to_string());
        *self.calls.entry(id.clone()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        let active = {
            let mut active = self.active.entry(id.clone()).or_insert(0);
            *active += 1;
            *active
        };
        self.peak_per_key.fetch_max(active, Ordering::SeqCst);
        self.started.send_modify(|started| *started += 1);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(mut active) = self.active.get_mut(&id) {
            *active -= 1;
        }
        self.answer(kind, text)
    }

    fn answer(&self, kind: AssetKind, text: &str) -> Result<Generated, GenerationError> {
        if self.rate_limit_all {
            return Err(GenerationError::backend(Some(429), "RESOURCE_EXHAUSTED"));
        }
        if self.terminal.contains(text) {
            return Err(GenerationError::MissingPayload(kind.suffix()));
        }
        if let Some(mut remaining) = self.rate_limits.get_mut(text) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GenerationError::RateLimited(format!("quota exceeded for {text}")));
            }
        }
        let payload = match kind {
            AssetKind::Image => image_payload(text),
            AssetKind::Audio => audio_payload(text),
        };
        Ok(Generated::new(payload).with_usage(SCRIPTED_USAGE))
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_image(&self, prompt: &str) -> Result<Generated, GenerationError> {
        self.call(AssetKind::Image, prompt).await
    }

    async fn generate_speech(&self, text: &str) -> Result<Generated, GenerationError> {
        self.call(AssetKind::Audio, text).await
    }
}

/// Durable store that counts I/O and can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryAssetStore,
    failing: bool,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read and write errors
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Reads issued
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Writes issued
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Records held
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl AssetStore for RecordingStore {
    async fn get(&self, key: &SceneAssetKey) -> StoreResult<Option<AssetRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StoreError::Unavailable("scripted read failure".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, record: &AssetRecord) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StoreError::Unavailable("scripted write failure".into()));
        }
        self.inner.put(record).await
    }
}

/// Story author returning a fixed story or failing
#[derive(Debug)]
pub struct ScriptedAuthor {
    story: Option<GeneratedStory>,
    calls: AtomicUsize,
}

impl ScriptedAuthor {
    /// Author that always returns `story`
    pub fn returning(story: GeneratedStory) -> Self {
        Self {
            story: Some(story),
            calls: AtomicUsize::new(0),
        }
    }

    /// Author that is always rate limited
    pub fn rate_limited() -> Self {
        Self {
            story: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryAuthor for ScriptedAuthor {
    async fn author(&self, _request: &StoryRequest) -> Result<Authored, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.story {
            Some(story) => Ok(Authored {
                story: story.clone(),
                usage: Some(SCRIPTED_USAGE),
            }),
            None => Err(GenerationError::backend(Some(429), "quota exceeded")),
        }
    }
}

/// Image prompt of scene `index` in fixture stories
pub fn prompt(index: usize) -> String {
    format!("prompt {index}")
}

/// Narrative of scene `index` in fixture stories
pub fn narrative(index: usize) -> String {
    format!("narrative {index}")
}

/// Story with `scenes` scenes using [`prompt`] and [`narrative`]
pub fn story_with_scenes(id: &str, scenes: usize) -> Arc<Story> {
    let mut story = Story::new(id, format!("Story {id}"));
    for index in 0..scenes {
        story = story.with_scene(narrative(index), prompt(index));
    }
    Arc::new(story)
}

/// The six-scene story most scenarios use
pub fn six_scene_story(id: &str) -> Arc<Story> {
    story_with_scenes(id, 6)
}

/// Authored story payload with `scenes` scenes
pub fn generated_story(scenes: usize) -> GeneratedStory {
    GeneratedStory {
        title: "The Brave Turtle".into(),
        lesson: "Slow and steady".into(),
        scenes: (0..scenes)
            .map(|index| SceneScript::new(narrative(index), prompt(index)))
            .collect(),
    }
}

/// Config with fast retries for tests
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_retry(3, 100)
}

/// Scheduler over the given backend and store
pub fn scheduler_with(
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn AssetStore>,
    config: &OrchestratorConfig,
) -> Arc<LookaheadScheduler> {
    let pipeline = AssetPipeline::new(store, backend, ReadingSession::new())
        .with_retry(config.retry.policy());
    Arc::new(LookaheadScheduler::new(Arc::new(pipeline), config))
}

/// Key of `kind` for scene `index` of `story`
pub fn key(story: &str, index: usize, kind: AssetKind) -> SceneAssetKey {
    SceneAssetKey::new(story, index, kind)
}
