//! Observable session store
//!
//! Lifecycle: `hydrate -> active -> clear`. The first read loads the persisted
//! session from durable storage; every later change goes through `set_state`
//! or `clear`, which persist the new snapshot and notify listeners.
//!
//! Notifications are synchronous and ordered. A change made from inside a
//! listener is queued and delivered once the current pass has reached every
//! listener, so nobody observes version n+1 before everyone has seen n.

use crate::state::{Credential, Principal, SessionState};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use sync_core::{DurableStorage, SessionConfig};
use tracing::{debug, info, warn};

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;
type Registry = Mutex<Vec<(u64, Listener)>>;

struct Inner {
    /// None until hydrated
    current: Option<Arc<SessionState>>,
    /// Last version handed out
    version: u64,
    /// Snapshots waiting to be delivered, in version order
    queue: VecDeque<Arc<SessionState>>,
    /// A notification pass is running
    notifying: bool,
}

/// Holder of the current principal and credential
pub struct SessionStore {
    storage: Arc<dyn DurableStorage>,
    keys: SessionConfig,
    inner: Mutex<Inner>,
    listeners: Arc<Registry>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SessionStore")
            .field("hydrated", &inner.current.is_some())
            .field("version", &inner.version)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl SessionStore {
    /// Store persisting under the default keys
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self::with_keys(storage, SessionConfig::default())
    }

    pub fn with_keys(storage: Arc<dyn DurableStorage>, keys: SessionConfig) -> Self {
        Self {
            storage,
            keys,
            inner: Mutex::new(Inner {
                current: None,
                version: 0,
                queue: VecDeque::new(),
                notifying: false,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Current snapshot, hydrating from storage on first access
    pub fn state(&self) -> Arc<SessionState> {
        let mut inner = self.inner.lock();
        self.hydrate(&mut inner)
    }

    /// Replace principal and credential
    ///
    /// Returns false (and notifies nobody) when the new values equal the
    /// current ones.
    pub fn set_state(&self, principal: Option<Principal>, credential: Option<Credential>) -> bool {
        let drain = {
            let mut inner = self.inner.lock();
            let current = self.hydrate(&mut inner);
            if current.same_identity(principal.as_ref(), credential.as_ref()) {
                debug!("Session unchanged at version {}", current.version());
                return false;
            }

            inner.version += 1;
            let next = Arc::new(SessionState::new(principal, credential, inner.version));
            self.persist(&next);
            info!(
                "Session v{}: {}",
                next.version(),
                if next.is_authenticated() { "signed in" } else { "signed out" }
            );
            self.enqueue(&mut inner, next)
        };

        if drain {
            self.drain();
        }
        true
    }

    /// Reset to signed out. Always notifies.
    pub fn clear(&self) {
        let drain = {
            let mut inner = self.inner.lock();
            self.hydrate(&mut inner);

            inner.version += 1;
            let next = Arc::new(SessionState::signed_out(inner.version));
            self.persist(&next);
            info!("Session v{}: cleared", next.version());
            self.enqueue(&mut inner, next)
        };

        if drain {
            self.drain();
        }
    }

    pub fn sign_in(&self, principal: Principal, credential: Credential) -> bool {
        self.set_state(Some(principal), Some(credential))
    }

    pub fn sign_out(&self) {
        self.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Register a listener for every future transition
    ///
    /// A listener registered from inside a notification is first called for
    /// the next transition, not the one being delivered.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        debug!("Session listener {} subscribed", id);

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Push onto the delivery queue; true if the caller must run the pass
    fn enqueue(&self, inner: &mut Inner, state: Arc<SessionState>) -> bool {
        inner.current = Some(Arc::clone(&state));
        inner.queue.push_back(state);
        if inner.notifying {
            false
        } else {
            inner.notifying = true;
            true
        }
    }

    fn drain(&self) {
        let mut pass = PassGuard {
            inner: &self.inner,
            armed: true,
        };
        loop {
            let next = {
                let mut inner = self.inner.lock();
                let next = inner.queue.pop_front();
                if next.is_none() {
                    inner.notifying = false;
                }
                next
            };
            let Some(state) = next else {
                pass.armed = false;
                return;
            };

            // Stable copy: changes to the registry affect the next pass only
            let listeners: Vec<Listener> = self
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in &listeners {
                listener(&state);
            }
        }
    }

    fn hydrate(&self, inner: &mut Inner) -> Arc<SessionState> {
        if let Some(current) = &inner.current {
            return Arc::clone(current);
        }

        let credential = self.read(&self.keys.credential_key).map(Credential::new);
        let principal = self.read(&self.keys.principal_key).and_then(|raw| {
            match serde_json::from_str::<Principal>(&raw) {
                Ok(principal) => Some(principal),
                Err(e) => {
                    warn!("Discarding unreadable persisted principal: {}", e);
                    if let Err(e) = self.storage.remove(&self.keys.principal_key) {
                        warn!("Failed to remove persisted principal: {}", e);
                    }
                    None
                }
            }
        });

        let state = Arc::new(SessionState::new(principal, credential, inner.version));
        debug!(
            "Session hydrated ({})",
            if state.is_authenticated() { "signed in" } else { "signed out" }
        );
        inner.current = Some(Arc::clone(&state));
        state
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read session key {}: {}", key, e);
                None
            }
        }
    }

    /// Mirror a snapshot into storage; memory stays authoritative on failure
    fn persist(&self, state: &SessionState) {
        let result = match state.credential() {
            Some(credential) => self.storage.set(&self.keys.credential_key, credential.expose()),
            None => self.storage.remove(&self.keys.credential_key),
        };
        if let Err(e) = result {
            warn!("Failed to persist session credential: {}", e);
        }

        let result = match state.principal() {
            Some(principal) => match serde_json::to_string(principal) {
                Ok(json) => self.storage.set(&self.keys.principal_key, &json),
                Err(e) => Err(e.into()),
            },
            None => self.storage.remove(&self.keys.principal_key),
        };
        if let Err(e) = result {
            warn!("Failed to persist session principal: {}", e);
        }
    }
}

/// Ends the notification pass if a listener panics
struct PassGuard<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().notifying = false;
        }
    }
}

/// Registration returned by [`SessionStore::subscribe`]
///
/// Dropping it keeps the listener registered; call `unsubscribe` to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the listener. Safe to call from inside a notification and more
    /// than once.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut listeners = registry.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        let removed = listeners.len() != before;
        if removed {
            debug!("Session listener {} unsubscribed", self.id);
        }
        removed
    }
}
