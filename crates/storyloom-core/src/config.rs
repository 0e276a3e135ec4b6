//! Orchestrator configuration
//!
//! Every scheduling constant lives here as a named default; nothing below
//! the scheduler carries its own magic delays.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scenes beyond the current one resolved ahead of the reader
pub const DEFAULT_LOOKAHEAD_DEPTH: usize = 2;

/// Delay applied to lookahead submissions so they don't compete with the
/// immediate scene for rate-limit budget
pub const DEFAULT_STAGGER_DELAY_MS: u64 = 1_500;

/// Asset generation attempts (first call included)
pub const DEFAULT_ASSET_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay for asset generation
pub const DEFAULT_ASSET_INITIAL_DELAY_MS: u64 = 1_000;

/// Story authoring attempts
pub const DEFAULT_AUTHORING_MAX_ATTEMPTS: u32 = 2;

/// First backoff delay for story authoring
pub const DEFAULT_AUTHORING_INITIAL_DELAY_MS: u64 = 2_000;

/// Audit ledger size
pub const DEFAULT_AUDIT_CAPACITY: usize = 50;

/// Retry settings as they appear in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, first call included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub initial_delay_ms: u64,
}

impl RetrySettings {
    /// Runtime policy for these settings
    #[inline]
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
    }
}

/// Storyloom orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scenes beyond the current one to resolve
    pub lookahead_depth: usize,
    /// Delay for lookahead submissions
    pub stagger_delay_ms: u64,
    /// Asset generation retry
    pub retry: RetrySettings,
    /// Story authoring retry
    pub authoring_retry: RetrySettings,
    /// Audit ledger size
    pub audit_capacity: usize,
    /// Durable store directory; in-memory when absent
    pub asset_dir: Option<PathBuf>,
    /// Diagnostic tooling visibility
    pub admin_mode: bool,
}

impl OrchestratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With lookahead depth
    #[inline]
    #[must_use]
    pub fn with_lookahead(mut self, depth: usize) -> Self {
        self.lookahead_depth = depth;
        self
    }

    /// With stagger delay
    #[inline]
    #[must_use]
    pub fn with_stagger_delay(mut self, delay: Duration) -> Self {
        self.stagger_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With asset retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, initial_delay_ms: u64) -> Self {
        self.retry = RetrySettings {
            max_attempts,
            initial_delay_ms,
        };
        self
    }

    /// With durable store directory
    #[inline]
    #[must_use]
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }

    /// With admin mode
    #[inline]
    #[must_use]
    pub fn with_admin_mode(mut self, enabled: bool) -> Self {
        self.admin_mode = enabled;
        self
    }

    /// Lookahead delay as a duration
    #[inline]
    #[must_use]
    pub fn stagger_delay(&self) -> Duration {
        Duration::from_millis(self.stagger_delay_ms)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` on out-of-range values
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - see [`OrchestratorConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if any retry budget allows zero attempts or
    ///   the audit ledger has no room
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.authoring_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "authoring_retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.audit_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "audit_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lookahead_depth: DEFAULT_LOOKAHEAD_DEPTH,
            stagger_delay_ms: DEFAULT_STAGGER_DELAY_MS,
            retry: RetrySettings {
                max_attempts: DEFAULT_ASSET_MAX_ATTEMPTS,
                initial_delay_ms: DEFAULT_ASSET_INITIAL_DELAY_MS,
            },
            authoring_retry: RetrySettings {
                max_attempts: DEFAULT_AUTHORING_MAX_ATTEMPTS,
                initial_delay_ms: DEFAULT_AUTHORING_INITIAL_DELAY_MS,
            },
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            asset_dir: None,
            admin_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OrchestratorConfig::new();
        assert_eq!(config.lookahead_depth, 2);
        assert_eq!(config.stagger_delay(), Duration::from_millis(1_500));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.authoring_retry.initial_delay_ms, 2_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            lookahead_depth = 1
            admin_mode = true

            [retry]
            max_attempts = 2
            initial_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.lookahead_depth, 1);
        assert!(config.admin_mode);
        assert_eq!(config.retry.policy().max_attempts(), 2);
        assert_eq!(config.stagger_delay_ms, DEFAULT_STAGGER_DELAY_MS);
        assert_eq!(config.audit_capacity, DEFAULT_AUDIT_CAPACITY);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = OrchestratorConfig::from_toml_str(
            "[retry]\nmax_attempts = 0\ninitial_delay_ms = 10\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "retry.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = OrchestratorConfig::from_toml_str("lookahead_depth = \"two\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builder_methods() {
        let config = OrchestratorConfig::new()
            .with_lookahead(4)
            .with_stagger_delay(Duration::from_millis(300))
            .with_retry(5, 100)
            .with_asset_dir("/tmp/assets")
            .with_admin_mode(true);

        assert_eq!(config.lookahead_depth, 4);
        assert_eq!(config.stagger_delay_ms, 300);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.asset_dir.as_deref(), Some(Path::new("/tmp/assets")));
        assert!(config.admin_mode);
    }
}
