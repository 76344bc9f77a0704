//! Process-wide observable session state
//!
//! This crate provides:
//! - Immutable session snapshots (principal + credential + version)
//! - `SessionStore`: lazy hydration from durable storage, change
//!   suppression, ordered synchronous notifications
//! - A single process-wide store handle

pub mod global;
pub mod state;
pub mod store;

// Re-exports
pub use state::{Credential, Principal, SessionState};
pub use store::{SessionStore, Subscription};
