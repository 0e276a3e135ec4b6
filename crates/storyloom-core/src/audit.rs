//! Generation audit ledger
//!
//! Bounded, newest-first record of every successful backend generation.
//! Cache hits never reach the ledger.

use crate::backend::TokenUsage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use storyloom_assets::AssetKind;
use ulid::Ulid;

/// Characters of the prompt kept in an entry's detail
const DETAIL_PREFIX_CHARS: usize = 30;

/// What was generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditKind {
    /// Authored story text
    Story,
    /// Scene illustration
    Image,
    /// Scene narration
    Audio,
}

impl From<AssetKind> for AuditKind {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Image => AuditKind::Image,
            AssetKind::Audio => AuditKind::Audio,
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            AuditKind::Story => "Story",
            AuditKind::Image => "Image",
            AuditKind::Audio => "Audio",
        })
    }
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id
    pub id: Ulid,
    /// When the generation completed
    pub timestamp: DateTime<Utc>,
    /// What was generated
    pub kind: AuditKind,
    /// What the call was for
    pub detail: String,
    /// Provider token accounting
    pub usage: TokenUsage,
}

impl AuditEntry {
    /// Create new entry stamped now
    #[must_use]
    pub fn new(kind: AuditKind, detail: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            id: Ulid::new(),
            timestamp: Utc::now(),
            kind,
            detail: detail.into(),
            usage: usage.unwrap_or_default(),
        }
    }

    /// Entry described as `"<label>: <prompt prefix>..."`
    #[must_use]
    pub fn for_prompt(kind: AuditKind, label: &str, prompt: &str, usage: Option<TokenUsage>) -> Self {
        let prefix: String = prompt.chars().take(DETAIL_PREFIX_CHARS).collect();
        Self::new(kind, format!("{label}: {prefix}..."), usage)
    }
}

/// Aggregate token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTotals {
    /// Entries counted
    pub entries: usize,
    /// Sum of prompt tokens
    pub prompt_tokens: u64,
    /// Sum of response tokens
    pub response_tokens: u64,
    /// Sum of total tokens
    pub total_tokens: u64,
}

/// Bounded generation ledger
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    inner: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    /// Create ledger keeping at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum entries kept
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push an entry, evicting the oldest beyond capacity
    pub fn record(&self, entry: AuditEntry) {
        tracing::debug!(kind = %entry.kind, detail = %entry.detail, "audit entry recorded");
        let mut guard = self.inner.lock();
        guard.push_front(entry);
        guard.truncate(self.capacity);
    }

    /// Entries, newest first
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Number of entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the ledger is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Token usage over the retained entries
    #[must_use]
    pub fn totals(&self) -> AuditTotals {
        self.inner
            .lock()
            .iter()
            .fold(AuditTotals::default(), |mut totals, entry| {
                totals.entries += 1;
                totals.prompt_tokens += entry.usage.prompt_tokens;
                totals.response_tokens += entry.usage.response_tokens;
                totals.total_tokens += entry.usage.total_tokens;
                totals
            })
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AUDIT_CAPACITY)
    }
}
