//! Poll session state machine
//!
//! `PollSession` owns the attempt counter and the baseline snapshot and turns
//! each fetch outcome into a `Step`. It has no timers and no locks; the driver
//! in `poll::mod` feeds it and publishes the resulting transitions.

use super::ErrorPolicy;
use sync_core::FetchError;

/// Lifecycle of a poll session
///
/// `Idle -> Polling -> {Converged | TimedOut | Cancelled | Aborted}`. Every
/// state after `Polling` is terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    Idle,
    Polling,
    Converged,
    TimedOut,
    Cancelled,
    /// A fetch failed under `ErrorPolicy::Abort`
    Aborted,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Converged | PollState::TimedOut | PollState::Cancelled | PollState::Aborted
        )
    }
}

/// What the predicate compares the latest snapshot against
#[derive(Debug, Clone, Default)]
pub enum Baseline<T> {
    /// The first successful fetch becomes the baseline and is not evaluated
    #[default]
    FirstSample,
    /// Caller already knows the starting state; every fetch is evaluated
    Seed(T),
    /// Each snapshot is compared with the one before it
    Rolling,
}

/// Result of feeding one fetch outcome to the session
#[derive(Debug)]
pub(crate) enum Step<T> {
    /// Session already terminal; the outcome is discarded
    Stale,
    Continue { error: Option<FetchError> },
    Converged(T),
    TimedOut { error: Option<FetchError> },
    Aborted(FetchError),
}

pub(crate) struct PollSession<T> {
    state: PollState,
    attempts: u32,
    max_attempts: u32,
    baseline: Option<T>,
    rolling: bool,
}

impl<T> PollSession<T> {
    pub fn new(max_attempts: u32, baseline: Baseline<T>) -> Self {
        let (baseline, rolling) = match baseline {
            Baseline::FirstSample => (None, false),
            Baseline::Seed(seed) => (Some(seed), false),
            Baseline::Rolling => (None, true),
        };

        Self {
            state: PollState::Idle,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            baseline,
            rolling,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `Idle -> Polling`
    pub fn begin(&mut self) -> bool {
        if self.state != PollState::Idle {
            return false;
        }
        self.state = PollState::Polling;
        true
    }

    /// Move to `Cancelled` unless already terminal
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = PollState::Cancelled;
        true
    }

    /// Account for one fetch and decide what happens next
    pub fn record<P>(
        &mut self,
        outcome: Result<T, FetchError>,
        predicate: &P,
        policy: ErrorPolicy,
    ) -> Step<T>
    where
        P: Fn(&T, &T) -> bool,
    {
        if self.state != PollState::Polling {
            return Step::Stale;
        }
        self.attempts += 1;

        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(error) if policy == ErrorPolicy::Abort => {
                self.state = PollState::Aborted;
                return Step::Aborted(error);
            }
            Err(error) => return self.exhausted_or_continue(Some(error)),
        };

        match self.baseline.take() {
            None => {
                self.baseline = Some(snapshot);
            }
            Some(baseline) => {
                if predicate(&baseline, &snapshot) {
                    self.state = PollState::Converged;
                    return Step::Converged(snapshot);
                }
                self.baseline = Some(if self.rolling { snapshot } else { baseline });
            }
        }

        self.exhausted_or_continue(None)
    }

    fn exhausted_or_continue(&mut self, error: Option<FetchError>) -> Step<T> {
        if self.attempts >= self.max_attempts {
            self.state = PollState::TimedOut;
            Step::TimedOut { error }
        } else {
            Step::Continue { error }
        }
    }
}
