//! Cartsync Core - shared contracts for the reconciliation primitives
//!
//! This crate provides the pieces every component agrees on:
//! - Error taxonomy (fetch, commit, storage, config)
//! - `SyncConfig` with validated defaults
//! - The durable-storage contract used for session hydration

pub mod config;
pub mod error;
pub mod storage;

// Re-export main types for convenience
pub use config::{DebounceConfig, PollConfig, SessionConfig, StorageConfig, SyncConfig};
pub use error::{CommitError, ConfigError, FetchError, StorageError};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};

/// Common result type used throughout sync-core
pub type Result<T, E = StorageError> = std::result::Result<T, E>;
