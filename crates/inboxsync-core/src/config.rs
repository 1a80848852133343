//! Tunables for polling and retry behavior.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default interval between background refreshes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Default number of attempts for the initial load.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default waits between load attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 4] = [5_000, 10_000, 20_000, 40_000];

/// Configuration for one inbox notifications sync engine.
///
/// Every field has a default, so an empty TOML document is valid:
///
/// ```toml
/// poll_interval_ms = 30000
///
/// [retry]
/// max_attempts = 3
/// delays_ms = [1000, 2000]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Time between the end of one poll and the start of the next.
    pub poll_interval_ms: u64,

    /// Retry schedule for the initial load.
    pub retry: RetryConfig,
}

/// Retry schedule for the initial load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Wait before attempt `n + 2` is `delays_ms[n]`; the last entry repeats.
    pub delays_ms: Vec<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check that the values describe a usable schedule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RetryConfig {
    /// Check that the schedule can be executed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_attempts > 1 && self.delays_ms.is_empty() {
            return Err(ConfigError::Invalid(
                "retry.delays_ms must not be empty when retries are enabled".to_string(),
            ));
        }
        Ok(())
    }
}
