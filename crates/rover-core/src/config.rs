//! Pipeline configuration, fixed at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Longest accepted flush interval, one week.
pub const MAX_FLUSH_INTERVAL_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Event queue tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue length that triggers a flush.
    pub flush_at: usize,
    /// Seconds since the last flush attempt that trigger a flush.
    pub flush_interval_secs: f64,
    /// Maximum events per submission.
    pub max_batch_size: usize,
    /// Maximum events held; the oldest are evicted beyond this.
    pub max_queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_at: 20,
            flush_interval_secs: 30.0,
            max_batch_size: 100,
            max_queue_size: 1000,
        }
    }
}

impl QueueConfig {
    /// The flush interval as a `Duration`, saturating for values that
    /// `validate` would reject.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.flush_interval_secs).unwrap_or(Duration::MAX)
    }

    /// Check limits are usable.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_at == 0 {
            return Err(ConfigError::Invalid("flush_at must be at least 1".into()));
        }
        if !self.flush_interval_secs.is_finite() || self.flush_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "flush_interval_secs must be a positive number".into(),
            ));
        }
        if self.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "flush_interval_secs must not exceed {MAX_FLUSH_INTERVAL_SECS}"
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_size must be at least 1".into(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_size must be at least 1".into(),
            ));
        }
        if self.max_batch_size > self.max_queue_size {
            return Err(ConfigError::Invalid(format!(
                "max_batch_size ({}) exceeds max_queue_size ({})",
                self.max_batch_size, self.max_queue_size
            )));
        }
        Ok(())
    }
}

/// Session tracking tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Grace period after a session ends during which it may resume.
    pub keep_alive_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { keep_alive_secs: 10 }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub queue: QueueConfig,
    pub session: SessionConfig,
}

impl RoverConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a limit is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue.validate()
    }
}
