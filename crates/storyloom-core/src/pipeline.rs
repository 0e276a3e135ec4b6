//! Asset resolution pipeline
//!
//! One generic resolution path for every [`AssetKind`]:
//!
//! 1. Slot already populated in the live session: skip, no I/O
//! 2. Session cache hit: applied in the same state update, no I/O
//! 3. Key already in flight: skip (an immediate request promotes the holder)
//! 4. Claim the key and raise the generating flag, synchronously
//! 5. Durable store, then session cache again, then the backend under the
//!    retry policy
//! 6. Write back to both tiers and deliver URL + cleared flag atomically
//!
//! The claim is released on every exit path when the task finishes. A
//! deferred claim whose session was replaced by the same story is adopted by
//! the live session instead of being dropped.

use crate::audit::{AuditEntry, AuditLog};
use crate::backend::{KindBehavior, SharedBackend};
use crate::error::GenerationError;
use crate::inflight::{InFlightClaim, InFlightRegistry};
use crate::retry::RetryPolicy;
use crate::session::{Delivery, ReadingSession};
use std::sync::Arc;
use std::time::Duration;
use storyloom_assets::{AssetRecord, SceneAssetKey, SessionCache, SharedAssetStore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scheduling priority of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Start now
    #[default]
    Immediate,
    /// Claim now, start after the delay unless promoted first
    Deferred(Duration),
}

/// One resolution request
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Asset to resolve
    pub key: SceneAssetKey,
    /// Image prompt or narrative text
    pub source_text: String,
    /// Scheduling priority
    pub priority: Priority,
    /// Session epoch the request belongs to
    pub epoch: u64,
}

impl ResolveRequest {
    /// Create immediate request
    #[inline]
    #[must_use]
    pub fn new(key: SceneAssetKey, source_text: impl Into<String>, epoch: u64) -> Self {
        Self {
            key,
            source_text: source_text.into(),
            priority: Priority::Immediate,
            epoch,
        }
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Why no work was done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Slot already holds a URL
    AlreadyResolved,
    /// Another resolution holds the key
    InFlight,
    /// The request's session is gone
    Abandoned,
}

/// Tier that satisfied a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Durable store
    Durable,
    /// Session memory cache
    Session,
    /// Backend generation
    Generated,
}

/// Result of one resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Asset available
    Resolved {
        /// Resolved record
        record: AssetRecord,
        /// Tier it came from
        source: ResolvedFrom,
        /// How it landed in the session
        delivery: Delivery,
    },
    /// Nothing done
    Skipped(SkipReason),
    /// Generation failed; slot left empty for a later attempt
    Failed(GenerationError),
}

impl ResolveOutcome {
    /// Whether the asset is available
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Whether the backend produced the asset
    #[inline]
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(
            self,
            Self::Resolved {
                source: ResolvedFrom::Generated,
                ..
            }
        )
    }
}

/// What a submission turned into
#[derive(Debug)]
pub enum Submission {
    /// Nothing to do
    Skipped(SkipReason),
    /// Served from the session cache in the submitting call
    Cached(AssetRecord),
    /// Resolution running in a task
    Spawned(JoinHandle<ResolveOutcome>),
}

enum Admission {
    Skipped(SkipReason),
    Cached(AssetRecord, Delivery),
    Claimed(InFlightClaim),
}

/// The resolution pipeline and the tiers it reads and writes
#[derive(Debug)]
pub struct AssetPipeline {
    durable: SharedAssetStore,
    cache: SessionCache,
    registry: InFlightRegistry,
    backend: SharedBackend,
    retry: RetryPolicy,
    session: ReadingSession,
    audit: Arc<AuditLog>,
}

impl AssetPipeline {
    /// Create pipeline with a fresh cache, registry and ledger
    #[must_use]
    pub fn new(durable: SharedAssetStore, backend: SharedBackend, session: ReadingSession) -> Self {
        Self {
            durable,
            cache: SessionCache::new(),
            registry: InFlightRegistry::new(),
            backend,
            retry: RetryPolicy::default(),
            session,
            audit: Arc::new(AuditLog::default()),
        }
    }

    /// With session cache
    #[must_use]
    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        self.cache = cache;
        self
    }

    /// With retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With audit ledger
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Durable tier
    #[inline]
    #[must_use]
    pub fn durable(&self) -> &SharedAssetStore {
        &self.durable
    }

    /// Session cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// In-flight registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Reading session written by this pipeline
    #[inline]
    #[must_use]
    pub fn session(&self) -> &ReadingSession {
        &self.session
    }

    /// Audit ledger
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Submit a request
    ///
    /// Everything up to the claim happens before this returns: cache hits
    /// are already visible in the session and a claimed key already shows
    /// its generating flag. Must be called within a tokio runtime.
    pub fn submit(self: &Arc<Self>, request: ResolveRequest) -> Submission {
        match self.admit(&request) {
            Admission::Skipped(reason) => Submission::Skipped(reason),
            Admission::Cached(record, _) => Submission::Cached(record),
            Admission::Claimed(claim) => {
                let pipeline = Arc::clone(self);
                Submission::Spawned(tokio::spawn(async move {
                    pipeline.run_claimed(claim, request).await
                }))
            }
        }
    }

    /// Resolve `key` in the live session and wait for the outcome
    pub async fn resolve(&self, key: SceneAssetKey, source_text: impl Into<String>) -> ResolveOutcome {
        let request = ResolveRequest::new(key, source_text, self.session.epoch());
        match self.admit(&request) {
            Admission::Skipped(reason) => ResolveOutcome::Skipped(reason),
            Admission::Cached(record, delivery) => ResolveOutcome::Resolved {
                record,
                source: ResolvedFrom::Session,
                delivery,
            },
            Admission::Claimed(claim) => self.run_claimed(claim, request).await,
        }
    }

    /// Synchronous prelude of a resolution
    fn admit(&self, request: &ResolveRequest) -> Admission {
        let key = &request.key;
        let epoch = request.epoch;

        if self.session.epoch() != epoch {
            debug!(asset = %key, epoch, "request from abandoned session");
            return Admission::Skipped(SkipReason::Abandoned);
        }
        if self.session.is_resolved(epoch, key) {
            debug!(asset = %key, "already resolved");
            return Admission::Skipped(SkipReason::AlreadyResolved);
        }
        if let Some(record) = self.cache.get(key) {
            debug!(asset = %key, "session cache hit");
            let delivery = self.session.complete(epoch, key, record.payload.clone());
            return Admission::Cached(record, delivery);
        }

        match self.registry.try_claim(key) {
            Some(claim) => {
                self.session.mark_generating(epoch, key);
                Admission::Claimed(claim)
            }
            None => {
                if request.priority == Priority::Immediate && self.registry.promote(key) {
                    debug!(asset = %key, "promoted in-flight resolution");
                } else {
                    debug!(asset = %key, "already in flight");
                }
                Admission::Skipped(SkipReason::InFlight)
            }
        }
    }

    async fn run_claimed(&self, claim: InFlightClaim, request: ResolveRequest) -> ResolveOutcome {
        let ResolveRequest {
            key,
            source_text,
            priority,
            mut epoch,
        } = request;

        if let Priority::Deferred(delay) = priority {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = claim.promoted() => debug!(asset = %key, "deferred resolution promoted"),
            }
            if self.session.epoch() != epoch {
                // A live session of the same story skipped this key as in flight.
                match self.session.adopt(&key) {
                    Some(live) => {
                        debug!(asset = %key, stale = epoch, live, "deferred resolution adopted");
                        epoch = live;
                    }
                    None => {
                        debug!(asset = %key, epoch, "session abandoned while deferred");
                        return ResolveOutcome::Skipped(SkipReason::Abandoned);
                    }
                }
            }
        }

        let outcome = self.fetch(&key, &source_text, epoch).await;
        drop(claim);
        outcome
    }

    async fn fetch(&self, key: &SceneAssetKey, source_text: &str, epoch: u64) -> ResolveOutcome {
        match self.durable.get(key).await {
            Ok(Some(record)) => {
                debug!(asset = %key, "durable store hit");
                self.cache.insert(record.clone());
                return self.deliver(epoch, record, ResolvedFrom::Durable);
            }
            Ok(None) => {}
            Err(error) => warn!(asset = %key, %error, "durable store read failed, treating as miss"),
        }

        if let Some(record) = self.cache.get(key) {
            debug!(asset = %key, "session cache hit");
            return self.deliver(epoch, record, ResolvedFrom::Session);
        }

        let behavior = KindBehavior::of(key.kind);
        let backend = self.backend.as_ref();
        info!(asset = %key, operation = behavior.operation, "generating asset");

        let generated = self
            .retry
            .run(behavior.operation, move || behavior.fetch(backend, source_text))
            .await;

        match generated {
            Ok(generated) => {
                self.audit.record(AuditEntry::for_prompt(
                    key.kind.into(),
                    behavior.audit_label,
                    source_text,
                    generated.usage,
                ));
                let record = AssetRecord::new(key.clone(), generated.payload);
                if let Err(error) = self.durable.put(&record).await {
                    warn!(asset = %key, %error, "durable store write failed");
                }
                self.cache.insert(record.clone());
                info!(asset = %key, "asset generated");
                self.deliver(epoch, record, ResolvedFrom::Generated)
            }
            Err(error) => {
                error!(asset = %key, %error, "asset generation failed");
                self.session.fail(epoch, key);
                ResolveOutcome::Failed(error)
            }
        }
    }

    fn deliver(&self, epoch: u64, record: AssetRecord, source: ResolvedFrom) -> ResolveOutcome {
        let delivery = self.session.complete(epoch, &record.key, record.payload.clone());
        match delivery {
            Delivery::Applied => {}
            Delivery::Hydrated => debug!(asset = %record.key, "late result hydrated live session"),
            Delivery::Discarded => warn!(asset = %record.key, epoch, "stale result discarded"),
        }
        ResolveOutcome::Resolved {
            record,
            source,
            delivery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Generated, GenerationBackend};
    use crate::library::Story;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storyloom_assets::{AssetKind, AssetStore, MemoryAssetStore};

    #[derive(Debug, Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationBackend for CountingBackend {
        async fn generate_image(&self, prompt: &str) -> Result<Generated, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generated::new(format!("img:{prompt}")))
        }

        async fn generate_speech(&self, text: &str) -> Result<Generated, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generated::new(format!("aud:{text}")))
        }
    }

    fn setup() -> (Arc<AssetPipeline>, Arc<CountingBackend>, Arc<MemoryAssetStore>, u64) {
        let backend = Arc::new(CountingBackend::default());
        let durable = Arc::new(MemoryAssetStore::new());
        let session = ReadingSession::new();
        let story = Story::new("s", "S").with_scene("text", "prompt");
        let epoch = session.initialize(Arc::new(story), |_| None);
        let pipeline = Arc::new(AssetPipeline::new(
            durable.clone(),
            backend.clone(),
            session,
        ));
        (pipeline, backend, durable, epoch)
    }

    #[tokio::test]
    async fn generates_and_writes_back() {
        let (pipeline, backend, durable, _) = setup();
        let key = SceneAssetKey::new("s", 0, AssetKind::Image);

        let outcome = pipeline.resolve(key.clone(), "prompt").await;

        assert!(outcome.is_generated());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(durable.get(&key).await.unwrap().is_some());
        assert!(pipeline.cache().get(&key).is_some());
        assert_eq!(pipeline.audit().len(), 1);
        assert!(pipeline.registry().is_empty());

        let scene = pipeline.session().scene(0).unwrap();
        assert_eq!(scene.image_url().unwrap().as_str(), "img:prompt");
        assert!(!scene.is_generating_image());
    }

    #[tokio::test]
    async fn resolved_slot_is_skipped() {
        let (pipeline, backend, _, _) = setup();
        let key = SceneAssetKey::new("s", 0, AssetKind::Audio);

        pipeline.resolve(key.clone(), "text").await;
        let again = pipeline.resolve(key, "text").await;

        assert_eq!(again, ResolveOutcome::Skipped(SkipReason::AlreadyResolved));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_epoch_is_abandoned() {
        let (pipeline, backend, _, epoch) = setup();
        pipeline.session().reset();

        let request = ResolveRequest::new(SceneAssetKey::new("s", 0, AssetKind::Image), "p", epoch);
        let submission = pipeline.submit(request);

        assert!(matches!(submission, Submission::Skipped(SkipReason::Abandoned)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_cache_hit_applies_in_submit() {
        let (pipeline, backend, _, epoch) = setup();
        let key = SceneAssetKey::new("s", 0, AssetKind::Image);
        pipeline.cache().insert(AssetRecord::new(key.clone(), "cached"));

        let submission = pipeline.submit(ResolveRequest::new(key, "p", epoch));

        assert!(matches!(submission, Submission::Cached(_)));
        let scene = pipeline.session().scene(0).unwrap();
        assert_eq!(scene.image_url().unwrap().as_str(), "cached");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
