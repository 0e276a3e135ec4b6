//! Error types for the asset tiers

use std::path::PathBuf;

/// Durable store failures
///
/// Never fatal to the pipeline: callers treat a failing durable tier as a
/// cache that is simply never populated.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store could not be initialised and is running degraded
    #[error("asset store unavailable: {0}")]
    Unavailable(String),

    /// IO error against the backing directory
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Stored record belongs to another key
    #[error("stored record mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    /// Blocking worker was cancelled or panicked
    #[error("store worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Unavailable("quota".to_string());
        assert_eq!(err.to_string(), "asset store unavailable: quota");

        let err = StoreError::io_error(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/x"));
    }
}
