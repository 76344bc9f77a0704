//! Bounded convergence polling
//!
//! Some state changes happen where the client cannot see them: a payment
//! provider calls the server back, a warehouse fulfils an order. The client
//! learns about them by sampling a snapshot on an interval until a predicate
//! over (baseline, latest) holds, giving up after a fixed number of attempts so
//! a stuck server state does not poll forever.
//!
//! Each `start` spawns one driver task. Ticks are serialized: the next fetch is
//! not issued until the previous one resolved. Every terminal transition is
//! checked against the session token, so a fetch that resolves after `cancel`
//! fires nothing.

mod session;
pub mod predicates;

pub use session::{Baseline, PollState};

use parking_lot::Mutex;
use session::{PollSession, Step};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{FetchError, PollConfig};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use ulid::Ulid;

/// What a failed fetch does to the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Count the failure toward the budget and try again next tick
    #[default]
    Tolerate,
    /// Stop polling on the first failure
    Abort,
}

/// Shortest tick the driver will run; smaller intervals are raised to it
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing and budget for one poll session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// Fetch attempts before timing out (at least 1)
    pub max_attempts: u32,
    pub error_policy: ErrorPolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

impl PollOptions {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            max_attempts: max_attempts.max(1),
            error_policy: ErrorPolicy::Tolerate,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        let options = Self::new(config.interval(), config.max_attempts);
        if config.abort_on_error {
            options.abort_on_error()
        } else {
            options
        }
    }

    pub fn abort_on_error(mut self) -> Self {
        self.error_policy = ErrorPolicy::Abort;
        self
    }
}

/// Outcome notifications for a poll session
///
/// `on_converge` and `on_timeout` are `FnOnce`: at most one of them ever runs,
/// and only once.
pub struct PollCallbacks<T> {
    on_converge: Box<dyn FnOnce(T) + Send>,
    on_timeout: Box<dyn FnOnce() + Send>,
    on_error: Option<Box<dyn FnMut(&FetchError) + Send>>,
}

impl<T> PollCallbacks<T> {
    pub fn new<C, O>(on_converge: C, on_timeout: O) -> Self
    where
        C: FnOnce(T) + Send + 'static,
        O: FnOnce() + Send + 'static,
    {
        Self {
            on_converge: Box::new(on_converge),
            on_timeout: Box::new(on_timeout),
            on_error: None,
        }
    }

    /// Observe every failed fetch (tolerated or aborting)
    pub fn on_error<E>(mut self, on_error: E) -> Self
    where
        E: FnMut(&FetchError) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

struct Status {
    state: PollState,
    token: u64,
    attempts: u32,
}

/// State visible to both the driver task and the handles
struct Shared {
    id: Ulid,
    status: Mutex<Status>,
    state_tx: watch::Sender<PollState>,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(PollState::Idle);
        Self {
            id: Ulid::new(),
            status: Mutex::new(Status {
                state: PollState::Idle,
                token: 0,
                attempts: 0,
            }),
            state_tx,
        }
    }

    /// `Idle -> Polling`, handing the driver its session token
    fn begin(&self) -> Option<u64> {
        let mut status = self.status.lock();
        if status.state != PollState::Idle {
            return None;
        }
        status.state = PollState::Polling;
        self.state_tx.send_replace(PollState::Polling);
        Some(status.token)
    }

    fn is_live(&self, token: u64) -> bool {
        let status = self.status.lock();
        status.token == token && status.state == PollState::Polling
    }

    fn record_attempt(&self, token: u64, attempts: u32) -> bool {
        let mut status = self.status.lock();
        if status.token != token || status.state != PollState::Polling {
            return false;
        }
        status.attempts = attempts;
        true
    }

    /// Move into a terminal state if `token` is still current
    fn finish(&self, token: u64, next: PollState) -> bool {
        let mut status = self.status.lock();
        if status.token != token || status.state.is_terminal() {
            return false;
        }
        status.state = next;
        self.state_tx.send_replace(next);
        true
    }

    fn cancel(&self) -> bool {
        let mut status = self.status.lock();
        if status.state.is_terminal() {
            return false;
        }
        status.state = PollState::Cancelled;
        status.token += 1;
        self.state_tx.send_replace(PollState::Cancelled);
        true
    }
}

/// Handle to a running poll session
#[derive(Clone)]
pub struct PollHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl PollHandle {
    pub fn id(&self) -> Ulid {
        self.shared.id
    }

    pub fn state(&self) -> PollState {
        self.shared.status.lock().state
    }

    /// Fetches accounted for so far
    pub fn attempts(&self) -> u32 {
        self.shared.status.lock().attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop polling now
    ///
    /// A fetch already in flight is dropped and neither `on_converge` nor
    /// `on_timeout` fires afterwards. Returns false if the session had already
    /// reached a terminal state.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            debug!("Poll {} cancelled", self.shared.id);
        }
        cancelled
    }

    /// Wait for the session to reach a terminal state
    pub async fn finished(&self) -> PollState {
        let mut rx = self.shared.state_tx.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // Sender lives in `shared`, which we hold
            Err(_) => self.state(),
        };
        state
    }
}

/// A poll session waiting to be started
///
/// ```rust,ignore
/// let handle = ConvergencePoller::new(fetch_account, increased_by(|a: &Account| a.balance))
///     .with_baseline(Baseline::Seed(account))
///     .start(PollOptions::new(Duration::from_secs(2), 30), callbacks);
/// ```
pub struct ConvergencePoller<T, F, P> {
    fetch: F,
    predicate: P,
    baseline: Baseline<T>,
}

impl<T, F, Fut, P> ConvergencePoller<T, F, P>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    P: Fn(&T, &T) -> bool + Send + 'static,
{
    pub fn new(fetch: F, predicate: P) -> Self {
        Self {
            fetch,
            predicate,
            baseline: Baseline::FirstSample,
        }
    }

    pub fn with_baseline(mut self, baseline: Baseline<T>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Spawn the driver task; the first fetch happens one interval from now
    pub fn start(self, options: PollOptions, callbacks: PollCallbacks<T>) -> PollHandle {
        let shared = Arc::new(Shared::new());
        let session = PollSession::new(options.max_attempts, self.baseline);

        info!(
            "Poll {} started (interval: {:?}, max attempts: {})",
            shared.id, options.interval, options.max_attempts
        );

        let driver = Driver {
            shared: Arc::clone(&shared),
            session,
            fetch: self.fetch,
            predicate: self.predicate,
            options,
        };
        tokio::spawn(driver.run(callbacks));

        PollHandle { shared }
    }
}

/// Start polling with the default baseline (first successful sample)
pub fn start<T, F, Fut, P>(
    fetch: F,
    predicate: P,
    options: PollOptions,
    callbacks: PollCallbacks<T>,
) -> PollHandle
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    P: Fn(&T, &T) -> bool + Send + 'static,
{
    ConvergencePoller::new(fetch, predicate).start(options, callbacks)
}

struct Driver<T, F, P> {
    shared: Arc<Shared>,
    session: PollSession<T>,
    fetch: F,
    predicate: P,
    options: PollOptions,
}

impl<T, F, Fut, P> Driver<T, F, P>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    P: Fn(&T, &T) -> bool + Send + 'static,
{
    async fn run(mut self, callbacks: PollCallbacks<T>) {
        let PollCallbacks {
            on_converge,
            on_timeout,
            mut on_error,
        } = callbacks;
        let id = self.shared.id;

        let Some(token) = self.shared.begin() else {
            return;
        };
        self.session.begin();

        let mut state_rx = self.shared.state_tx.subscribe();
        // `interval` is a public field, so clamp again here
        let period = self.options.interval.max(MIN_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = state_rx.wait_for(|s| s.is_terminal()) => {
                    self.stop(id);
                    return;
                }
            }

            let outcome = tokio::select! {
                outcome = (self.fetch)() => outcome,
                _ = state_rx.wait_for(|s| s.is_terminal()) => {
                    self.stop(id);
                    return;
                }
            };

            if !self.shared.is_live(token) {
                self.stop(id);
                return;
            }

            let step = self
                .session
                .record(outcome, &self.predicate, self.options.error_policy);
            if !self.shared.record_attempt(token, self.session.attempts()) {
                self.stop(id);
                return;
            }

            match step {
                Step::Stale => return,
                Step::Continue { error } => {
                    if let Some(error) = error {
                        warn!(
                            "Poll {} attempt {}/{} failed: {}",
                            id,
                            self.session.attempts(),
                            self.options.max_attempts,
                            error
                        );
                        if let Some(on_error) = on_error.as_mut() {
                            on_error(&error);
                        }
                    } else {
                        debug!(
                            "Poll {} attempt {}/{}: not converged",
                            id,
                            self.session.attempts(),
                            self.options.max_attempts
                        );
                    }
                }
                Step::Converged(snapshot) => {
                    if self.shared.finish(token, PollState::Converged) {
                        info!("Poll {} converged after {} attempts", id, self.session.attempts());
                        on_converge(snapshot);
                    }
                    return;
                }
                Step::TimedOut { error } => {
                    if let Some(error) = error {
                        warn!("Poll {} final attempt failed: {}", id, error);
                        if let Some(on_error) = on_error.as_mut() {
                            on_error(&error);
                        }
                    }
                    if self.shared.finish(token, PollState::TimedOut) {
                        info!(
                            "Poll {} timed out after {} attempts",
                            id,
                            self.session.attempts()
                        );
                        on_timeout();
                    }
                    return;
                }
                Step::Aborted(error) => {
                    if self.shared.finish(token, PollState::Aborted) {
                        warn!("Poll {} aborted: {}", id, error);
                        if let Some(on_error) = on_error.as_mut() {
                            on_error(&error);
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Bring the local state machine in line after an external cancel
    fn stop(&mut self, id: Ulid) {
        if self.session.cancel() {
            debug!(
                "Poll {} driver stopped ({:?}) after {} attempts",
                id,
                self.session.state(),
                self.session.attempts()
            );
        }
    }
}
