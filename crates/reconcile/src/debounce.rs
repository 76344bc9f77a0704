//! Per-key debouncing of mutation intents
//!
//! Quantity steppers and similar controls emit many events per second. Sending
//! one write per event overloads the server and lets a later decrement land
//! before an earlier increment. The debouncer keeps at most one pending intent
//! per key and commits only the last value once the key has been quiet for the
//! requested delay.
//!
//! Timers are tokio tasks, so `schedule` must be called from inside a runtime.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_core::CommitError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Future returned by a boxed commit function
pub type CommitFuture = BoxFuture<'static, Result<(), CommitError>>;

type CommitFn<K, V> = Box<dyn FnOnce(K, V) -> CommitFuture + Send>;

/// Value and write function waiting for the window to close
struct Intent<K, V> {
    value: V,
    commit: CommitFn<K, V>,
}

/// The single live entry for a key
struct Pending<K, V> {
    generation: u64,
    timer: JoinHandle<()>,
    intent: Mutex<Intent<K, V>>,
}

struct Inner<K, V> {
    pending: DashMap<K, Pending<K, V>>,
    generation: AtomicU64,
    errors: Option<mpsc::UnboundedSender<(K, CommitError)>>,
}

/// Coalesces bursts of writes into one commit per key per quiet period
///
/// Cloning is cheap and every clone drives the same set of timers.
pub struct KeyedDebouncer<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for KeyedDebouncer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for KeyedDebouncer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyedDebouncer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Debouncer whose commit failures are only logged
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Debouncer that forwards every failed timer-driven commit to `errors`
    pub fn with_error_channel(errors: mpsc::UnboundedSender<(K, CommitError)>) -> Self {
        Self::build(Some(errors))
    }

    fn build(errors: Option<mpsc::UnboundedSender<(K, CommitError)>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                generation: AtomicU64::new(0),
                errors,
            }),
        }
    }

    /// Schedule `value` for `key`, replacing whatever was pending
    ///
    /// The previous timer for the key is aborted and its value dropped. When
    /// the new timer expires, `commit(key, value)` runs with the latest value.
    /// A zero delay still commits on a later task turn, never inside this call.
    pub fn schedule<F, Fut>(&self, key: K, value: V, delay: Duration, commit: F)
    where
        F: FnOnce(K, V) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CommitError>> + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let intent = Intent {
            value,
            commit: Box::new(move |k, v| commit(k, v).boxed()),
        };

        // Holding the entry keeps the timer from looking the key up before
        // the new entry is in place.
        match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let timer = self.arm(key, generation, delay);
                let replaced = slot.insert(Pending {
                    generation,
                    timer,
                    intent: Mutex::new(intent),
                });
                replaced.timer.abort();
                debug!(
                    "Debounce {:?}: superseded generation {} with {}",
                    slot.key(),
                    replaced.generation,
                    generation
                );
            }
            Entry::Vacant(slot) => {
                let timer = self.arm(key, generation, delay);
                slot.insert(Pending {
                    generation,
                    timer,
                    intent: Mutex::new(intent),
                });
            }
        }
    }

    fn arm(&self, key: K, generation: u64, delay: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(key, generation).await;
        })
    }

    /// Drop the pending value for `key` without committing it
    ///
    /// Returns whether anything was pending. A commit that already started is
    /// not affected.
    pub fn cancel(&self, key: &K) -> bool {
        match self.inner.pending.remove(key) {
            Some((key, pending)) => {
                pending.timer.abort();
                debug!("Debounce {:?}: cancelled generation {}", key, pending.generation);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending key (page unmount, navigation)
    pub fn cancel_all(&self) -> usize {
        let keys: Vec<K> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Commit the pending value for `key` now instead of waiting
    ///
    /// Returns `Ok(false)` when nothing was pending. The commit's own error is
    /// returned to the caller rather than sent to the error channel.
    pub async fn flush(&self, key: &K) -> Result<bool, CommitError> {
        let Some((key, pending)) = self.inner.pending.remove(key) else {
            return Ok(false);
        };
        pending.timer.abort();

        debug!("Debounce {:?}: flushing generation {}", key, pending.generation);
        let intent = pending.intent.into_inner();
        (intent.commit)(key, intent.value).await?;
        Ok(true)
    }

    /// Flush every pending key, collecting the failures
    pub async fn flush_all(&self) -> Vec<(K, CommitError)> {
        let keys: Vec<K> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        let mut failures = Vec::new();
        for key in keys {
            if let Err(e) = self.flush(&key).await {
                failures.push((key, e));
            }
        }
        failures
    }

    /// Whether `key` has a value waiting for its window to close
    pub fn is_pending(&self, key: &K) -> bool {
        self.inner.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn fire(&self, key: K, generation: u64) {
        // A newer schedule, a cancel or a flush may have won the race
        let Some((key, pending)) = self
            .pending
            .remove_if(&key, |_, p| p.generation == generation)
        else {
            return;
        };

        debug!("Debounce {:?}: committing generation {}", key, generation);
        let intent = pending.intent.into_inner();
        if let Err(e) = (intent.commit)(key.clone(), intent.value).await {
            warn!("Debounced commit for {:?} failed: {}", key, e);
            if let Some(errors) = &self.errors {
                let _ = errors.send((key, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{ready, Ready};

    type Log = Arc<Mutex<Vec<(&'static str, i32)>>>;

    fn record(log: &Log) -> impl FnOnce(&'static str, i32) -> Ready<Result<(), CommitError>> {
        let log = Arc::clone(log);
        move |key, value| {
            log.lock().push((key, value));
            ready(Ok(()))
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_value_wins_within_window() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();
        let delay = Duration::from_millis(500);

        debouncer.schedule("cart-1", 5, delay, record(&log));
        sleep_ms(100).await;
        debouncer.schedule("cart-1", 7, delay, record(&log));
        sleep_ms(600).await;

        assert_eq!(*log.lock(), vec![("cart-1", 7)]);
        assert!(!debouncer.is_pending(&"cart-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_commits_once() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();
        let delay = Duration::from_millis(300);

        for value in 1..=20 {
            debouncer.schedule("cart-1", value, delay, record(&log));
            sleep_ms(50).await;
        }
        assert!(log.lock().is_empty());

        sleep_ms(1000).await;
        assert_eq!(*log.lock(), vec![("cart-1", 20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 1, Duration::from_millis(200), record(&log));
        debouncer.schedule("cart-2", 2, Duration::from_millis(400), record(&log));
        debouncer.schedule("cart-1", 3, Duration::from_millis(200), record(&log));
        assert_eq!(debouncer.pending_count(), 2);

        sleep_ms(300).await;
        assert_eq!(*log.lock(), vec![("cart-1", 3)]);

        sleep_ms(200).await;
        assert_eq!(*log.lock(), vec![("cart-1", 3), ("cart-2", 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_commit() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 5, Duration::from_millis(500), record(&log));
        sleep_ms(100).await;
        assert!(debouncer.cancel(&"cart-1"));
        assert!(!debouncer.cancel(&"cart-1"));

        sleep_ms(1000).await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_every_key() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 1, Duration::from_millis(100), record(&log));
        debouncer.schedule("cart-2", 2, Duration::from_millis(100), record(&log));
        assert_eq!(debouncer.cancel_all(), 2);

        sleep_ms(500).await;
        assert!(log.lock().is_empty());
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_commits_immediately_and_disarms_timer() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 4, Duration::from_millis(500), record(&log));
        assert!(debouncer.flush(&"cart-1").await.unwrap());
        assert_eq!(*log.lock(), vec![("cart-1", 4)]);

        // Nothing left to flush, and the old timer must not fire
        assert!(!debouncer.flush(&"cart-1").await.unwrap());
        sleep_ms(1000).await;
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_never_synchronous() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 1, Duration::ZERO, record(&log));
        assert!(log.lock().is_empty());

        sleep_ms(1).await;
        assert_eq!(*log.lock(), vec![("cart-1", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_from_inside_commit_opens_new_window() {
        let debouncer: KeyedDebouncer<&'static str, i32> = KeyedDebouncer::new();
        let log: Log = Default::default();
        let delay = Duration::from_millis(200);

        let again = debouncer.clone();
        let inner_log = Arc::clone(&log);
        debouncer.schedule("cart-1", 1, delay, move |key, value| {
            inner_log.lock().push((key, value));
            again.schedule(key, 99, delay, record(&inner_log));
            ready(Ok(()))
        });

        sleep_ms(250).await;
        assert_eq!(*log.lock(), vec![("cart-1", 1)]);
        assert!(debouncer.is_pending(&"cart-1"));

        sleep_ms(250).await;
        assert_eq!(*log.lock(), vec![("cart-1", 1), ("cart-1", 99)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_errors_reach_error_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = KeyedDebouncer::with_error_channel(tx);

        debouncer.schedule("cart-1", 3, Duration::from_millis(100), |_, _| {
            ready(Err(CommitError::Rejected("out of stock".into())))
        });

        let (key, err) = rx.recv().await.unwrap();
        assert_eq!(key, "cart-1");
        assert_eq!(err, CommitError::Rejected("out of stock".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_returns_commit_error_to_caller() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = KeyedDebouncer::with_error_channel(tx);

        debouncer.schedule("cart-1", 3, Duration::from_millis(100), |_, _| {
            ready(Err(CommitError::Transport("offline".into())))
        });

        let err = debouncer.flush(&"cart-1").await.unwrap_err();
        assert_eq!(err, CommitError::Transport("offline".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_all_reports_failures() {
        let debouncer = KeyedDebouncer::new();
        let log: Log = Default::default();

        debouncer.schedule("cart-1", 1, Duration::from_secs(5), record(&log));
        debouncer.schedule("cart-2", 2, Duration::from_secs(5), |_, _| {
            ready(Err(CommitError::Rejected("locked".into())))
        });

        let failures = debouncer.flush_all().await;
        assert_eq!(failures, vec![("cart-2", CommitError::Rejected("locked".into()))]);
        assert_eq!(*log.lock(), vec![("cart-1", 1)]);
        assert_eq!(debouncer.pending_count(), 0);
    }
}
