//! Tunables for the reconciliation primitives
//!
//! Every section has defaults, so an empty TOML document is a valid config:
//!
//! ```toml
//! [debounce]
//! delay_ms = 500
//!
//! [poll]
//! interval_ms = 2000
//! max_attempts = 30
//! abort_on_error = false
//!
//! [session]
//! credential_key = "token"
//! principal_key = "user"
//!
//! [storage]
//! # path = "/home/me/.local/share/cartsync/session.json"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Valid debounce delay range in milliseconds
pub const DEBOUNCE_DELAY_RANGE_MS: (u64, u64) = (0, 60_000);

/// Valid poll interval range in milliseconds
pub const POLL_INTERVAL_RANGE_MS: (u64, u64) = (100, 600_000);

/// Valid attempt budget range
pub const POLL_ATTEMPTS_RANGE: (u32, u32) = (1, 10_000);

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce: DebounceConfig,
    pub poll: PollConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

/// Quantity-stepper style write coalescing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period before a coalesced commit fires
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { delay_ms: 500 }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Convergence polling (payment settlement, order fulfilment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Fetches allowed before the session times out
    pub max_attempts: u32,
    /// Stop on the first failed fetch instead of tolerating it
    pub abort_on_error: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 30,
            abort_on_error: false,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Keys under which the session is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub credential_key: String,
    pub principal_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_key: "token".to_string(),
            principal_key: "user".to_string(),
        }
    }
}

/// Where durable session storage lives (None = caller decides)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl SyncConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a pretty TOML document
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = DEBOUNCE_DELAY_RANGE_MS;
        if !(lo..=hi).contains(&self.debounce.delay_ms) {
            return Err(ConfigError::invalid(
                "debounce.delay_ms",
                format!("{} is outside {}-{}", self.debounce.delay_ms, lo, hi),
            ));
        }

        let (lo, hi) = POLL_INTERVAL_RANGE_MS;
        if !(lo..=hi).contains(&self.poll.interval_ms) {
            return Err(ConfigError::invalid(
                "poll.interval_ms",
                format!("{} is outside {}-{}", self.poll.interval_ms, lo, hi),
            ));
        }

        let (lo, hi) = POLL_ATTEMPTS_RANGE;
        if !(lo..=hi).contains(&self.poll.max_attempts) {
            return Err(ConfigError::invalid(
                "poll.max_attempts",
                format!("{} is outside {}-{}", self.poll.max_attempts, lo, hi),
            ));
        }

        if self.session.credential_key.trim().is_empty() {
            return Err(ConfigError::invalid("session.credential_key", "must not be empty"));
        }
        if self.session.principal_key.trim().is_empty() {
            return Err(ConfigError::invalid("session.principal_key", "must not be empty"));
        }
        if self.session.credential_key == self.session.principal_key {
            return Err(ConfigError::invalid(
                "session.principal_key",
                "must differ from session.credential_key",
            ));
        }

        Ok(())
    }
}
