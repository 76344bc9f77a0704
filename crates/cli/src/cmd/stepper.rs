//! Stepper simulation
//!
//! Replays a series of quantity clicks against a debounced cart write and
//! reports how many writes actually reached the (simulated) server.

use anyhow::Result;
use cs_core::{CommitError, SyncConfig};
use owo_colors::OwoColorize;
use reconcile::KeyedDebouncer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Simulated server round trip
const WRITE_LATENCY: Duration = Duration::from_millis(20);

pub struct StepperArgs {
    pub key: String,
    pub values: Vec<i64>,
    pub gap_ms: u64,
    pub delay_ms: Option<u64>,
    pub flush: bool,
    pub reject: bool,
}

pub async fn run(config: &SyncConfig, args: StepperArgs) -> Result<()> {
    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.debounce.delay());
    let gap = Duration::from_millis(args.gap_ms);

    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let debouncer: KeyedDebouncer<String, i64> = KeyedDebouncer::with_error_channel(errors_tx);
    let started = Arc::new(AtomicUsize::new(0));

    println!(
        "{} {} clicks on {} ({:?} apart, {:?} window)",
        "▸".cyan(),
        args.values.len(),
        args.key.bold(),
        gap,
        delay
    );

    for (i, value) in args.values.iter().copied().enumerate() {
        if i > 0 {
            tokio::time::sleep(gap).await;
        }
        println!("  {} {}", "click".dimmed(), value);

        let started = Arc::clone(&started);
        let done_tx = done_tx.clone();
        let reject = args.reject;
        debouncer.schedule(args.key.clone(), value, delay, move |key, value| {
            started.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(WRITE_LATENCY).await;
                let result = if reject {
                    Err(CommitError::Rejected(format!("{} is out of stock", key)))
                } else {
                    Ok(())
                };
                let _ = done_tx.send((key, value, result.is_ok()));
                result
            }
        });
    }

    if args.flush {
        match debouncer.flush(&args.key).await {
            Ok(true) => println!("{} flushed {}", "⇥".cyan(), args.key),
            Ok(false) => println!("{}", "Nothing left to flush".dimmed()),
            Err(e) => println!("{} flush failed: {}", "✗".red(), e),
        }
    }

    // Timer commits take the entry out before they start, so once nothing is
    // pending every commit has at least begun.
    while debouncer.is_pending(&args.key) {
        tokio::time::sleep(gap.min(delay).max(Duration::from_millis(1))).await;
    }
    let commits = started.load(Ordering::SeqCst);
    drop(done_tx);

    let mut accepted = 0;
    for _ in 0..commits {
        let Some((key, value, ok)) = done_rx.recv().await else {
            break;
        };
        if ok {
            accepted += 1;
            println!("  {} {} = {}", "✓".green(), key, value);
        } else {
            println!("  {} {} = {}", "✗".red(), key, value);
        }
    }

    // The channel closes once the last timer task lets go of the debouncer
    drop(debouncer);
    while let Some((key, e)) = errors_rx.recv().await {
        tracing::warn!(%key, error = %e, "write rejected");
        println!("  {} {}", "rejected:".red(), e);
    }

    println!(
        "\n{} {} steps coalesced into {} commit(s), {} accepted",
        "Summary:".bold(),
        args.values.len(),
        commits,
        accepted
    );

    Ok(())
}
