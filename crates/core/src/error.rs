//! Error taxonomy shared by the debouncer, the poller and the session store
//!
//! Timeouts and cancellations are deliberately absent: a poll that runs out of
//! attempts reports through its timeout callback, and cancellation is silent.

use thiserror::Error;

/// A snapshot read failed.
///
/// The poller treats these as transient: they count toward the attempt budget
/// and the next tick retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("snapshot fetch failed: {message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A coalesced write was not accepted. Never retried by the debouncer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    /// The remote side refused the write (validation, conflict, auth)
    #[error("commit rejected: {0}")]
    Rejected(String),

    /// The write never reached the remote side
    #[error("commit transport failure: {0}")]
    Transport(String),
}

/// Durable storage failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
