//! Error types for Storyloom Core
//!
//! Provides error handling for:
//! - Backend generation failures (rate-limited vs terminal)
//! - Configuration loading
//! - Reading-session navigation
//! - Custom story authoring

use storyloom_assets::StoreError;

/// Main Storyloom error type
#[derive(Debug, thiserror::Error)]
pub enum StoryloomError {
    /// Asset generation failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Durable store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid navigation for the current session
    #[error("navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Custom story authoring failed
    #[error("authoring failed: {0}")]
    Authoring(#[from] AuthoringError),
}

impl StoryloomError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_rate_limited(),
            Self::Authoring(AuthoringError::Generation(e)) => e.is_rate_limited(),
            _ => false,
        }
    }
}

/// Failures reported by a generation backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Provider quota exhausted
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Response carried no media payload
    #[error("no {0} data found in response")]
    MissingPayload(&'static str),

    /// Any other provider failure
    #[error("backend error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Backend {
        /// HTTP-like status, when the provider reports one
        status: Option<u16>,
        /// Provider message
        message: String,
    },
}

impl GenerationError {
    /// Markers providers use to report quota exhaustion
    const RATE_LIMIT_MARKERS: [&'static str; 3] = ["429", "quota", "RESOURCE_EXHAUSTED"];

    /// Create backend error
    #[inline]
    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure indicates quota exhaustion
    ///
    /// Only rate-limited failures are retried; everything else is terminal.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::MissingPayload(_) => false,
            Self::Backend { status, message } => {
                *status == Some(429)
                    || Self::RATE_LIMIT_MARKERS
                        .iter()
                        .any(|marker| message.contains(marker))
            }
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Navigation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    /// No story is open
    #[error("no story selected")]
    NoStorySelected,

    /// Operation not valid in the current phase
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: String,
    },

    /// Story has no scenes to read
    #[error("story '{0}' has no scenes")]
    EmptyStory(String),

    /// No story with this id in the library
    #[error("unknown story '{0}'")]
    UnknownStory(String),
}

/// Custom story authoring errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthoringError {
    /// Author backend failed after retries
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// Authored story is unusable
    #[error("invalid story: {0}")]
    InvalidStory(String),

    /// Request is missing a required field
    #[error("missing {0}")]
    MissingField(&'static str),

    /// No story author is configured
    #[error("no story author configured")]
    NoAuthor,
}

/// Result type alias for Storyloom operations
pub type StoryloomResult<T> = Result<T, StoryloomError>;
