//! The process-wide session store
//!
//! Installed once at startup; every component that needs identity reads the
//! same instance instead of keeping its own copy.

use crate::store::SessionStore;
use std::sync::{Arc, OnceLock};

static STORE: OnceLock<Arc<SessionStore>> = OnceLock::new();

/// Install the process-wide store
///
/// Fails with the rejected store if one is already installed.
pub fn install(store: Arc<SessionStore>) -> Result<(), Arc<SessionStore>> {
    STORE.set(store)
}

/// The installed store, if any
pub fn get() -> Option<Arc<SessionStore>> {
    STORE.get().cloned()
}
