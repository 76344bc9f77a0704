//! Client-side reconciliation primitives
//!
//! This crate provides:
//! - Per-key debouncing of mutation intents (last write wins)
//! - Bounded convergence polling for externally settled state
//! - Ready-made convergence predicates for storefront flows

pub mod debounce;
pub mod poll;

pub use debounce::{CommitFuture, KeyedDebouncer};
pub use poll::{
    Baseline, ConvergencePoller, ErrorPolicy, PollCallbacks, PollHandle, PollOptions, PollState,
};
pub use sync_core::{CommitError, FetchError};
