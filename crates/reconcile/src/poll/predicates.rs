//! Convergence predicates for the common storefront waits
//!
//! Each helper takes a projection of the snapshot and returns a predicate over
//! `(baseline, latest)` suitable for `ConvergencePoller`.

/// Converged once the projected value is strictly greater than the baseline's
///
/// Used for "wait until the recharge lands". This assumes nothing else lowers
/// the value during the wait: a purchase settling in the same window can mask
/// the top-up. Prefer [`changed_by`] on a transaction id when that matters.
pub fn increased_by<T, N, F>(field: F) -> impl Fn(&T, &T) -> bool + Send + Sync + 'static
where
    T: 'static,
    N: PartialOrd + 'static,
    F: Fn(&T) -> N + Send + Sync + 'static,
{
    move |baseline: &T, latest: &T| field(latest) > field(baseline)
}

/// Converged once the projected value differs from the baseline's
pub fn changed_by<T, N, F>(field: F) -> impl Fn(&T, &T) -> bool + Send + Sync + 'static
where
    T: 'static,
    N: PartialEq + 'static,
    F: Fn(&T) -> N + Send + Sync + 'static,
{
    move |baseline: &T, latest: &T| field(latest) != field(baseline)
}

/// Converged once the latest snapshot is no longer in `pending`
///
/// The baseline is ignored; "order left the pending status" only looks at the
/// newest sample.
pub fn left_state<T, S, F>(field: F, pending: S) -> impl Fn(&T, &T) -> bool + Send + Sync + 'static
where
    T: 'static,
    S: PartialEq + Send + Sync + 'static,
    F: Fn(&T) -> S + Send + Sync + 'static,
{
    move |_baseline: &T, latest: &T| field(latest) != pending
}
