//! Recharge simulation
//!
//! Plays back a scripted series of balances as if a payment provider were
//! settling a top-up, and polls until the balance goes up.

use anyhow::{Context, Result};
use cs_core::{FetchError, SyncConfig};
use owo_colors::OwoColorize;
use reconcile::poll::predicates::increased_by;
use reconcile::{Baseline, ConvergencePoller, PollCallbacks, PollOptions, PollState};
use std::sync::Arc;
use std::time::Duration;

pub struct RechargeArgs {
    pub baseline: Option<u64>,
    pub balances: Vec<String>,
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub abort_on_error: bool,
}

#[derive(Debug, Clone)]
struct Account {
    balance: u64,
}

/// One scripted server reply; `None` is a failed request
fn parse_script(balances: &[String]) -> Result<Vec<Option<u64>>> {
    balances
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("err") {
                Ok(None)
            } else {
                raw.parse()
                    .map(Some)
                    .with_context(|| format!("Invalid balance '{}': expected a number or 'err'", raw))
            }
        })
        .collect()
}

fn options(config: &SyncConfig, args: &RechargeArgs) -> PollOptions {
    let mut options = PollOptions::from_config(&config.poll);
    if let Some(ms) = args.interval_ms {
        options.interval = Duration::from_millis(ms.max(1));
    }
    if let Some(attempts) = args.max_attempts {
        options.max_attempts = attempts.max(1);
    }
    if args.abort_on_error {
        options = options.abort_on_error();
    }
    options
}

pub async fn run(config: &SyncConfig, args: RechargeArgs) -> Result<()> {
    let script = Arc::new(parse_script(&args.balances)?);
    let options = options(config, &args);

    println!(
        "{} waiting for the balance to rise (every {:?}, up to {} checks)",
        "▸".cyan(),
        options.interval,
        options.max_attempts
    );

    // Past the end of the script the server keeps answering with its last reply
    let mut cursor = 0usize;
    let fetch = move || {
        let reply = script
            .get(cursor)
            .or_else(|| script.last())
            .copied()
            .flatten();
        cursor += 1;
        let attempt = cursor;
        async move {
            match reply {
                Some(balance) => {
                    println!("  {} #{} balance = {}", "poll".dimmed(), attempt, balance);
                    Ok(Account { balance })
                }
                None => Err(FetchError::new(format!("request #{} failed", attempt))),
            }
        }
    };

    let baseline = match args.baseline {
        Some(balance) => Baseline::Seed(Account { balance }),
        None => Baseline::FirstSample,
    };

    let callbacks = PollCallbacks::new(
        |account: Account| {
            println!("{} Recharge landed: balance is now {}", "✓".green(), account.balance);
        },
        || println!("{} Gave up waiting for the recharge", "✗".yellow()),
    )
    .on_error(|e| println!("  {} {}", "error".red(), e));

    let handle = ConvergencePoller::new(fetch, increased_by(|a: &Account| a.balance))
        .with_baseline(baseline)
        .start(options, callbacks);
    tracing::debug!(id = %handle.id(), "recharge poll started");

    let state = tokio::select! {
        state = handle.finished() => state,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            handle.finished().await
        }
    };

    println!(
        "\n{} {:?} after {} attempt(s)",
        "Result:".bold(),
        state,
        handle.attempts()
    );

    match state {
        PollState::Converged => Ok(()),
        PollState::TimedOut => anyhow::bail!("Recharge did not land in time"),
        PollState::Aborted => anyhow::bail!("Polling aborted after a failed request"),
        PollState::Cancelled => anyhow::bail!("Cancelled"),
        PollState::Idle | PollState::Polling => {
            anyhow::bail!("Poll ended in non-terminal state {:?}", state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_script() {
        let script = parse_script(&strings(&["100", "err", " 150 "])).unwrap();
        assert_eq!(script, vec![Some(100), None, Some(150)]);
        assert!(parse_script(&strings(&["lots"])).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let config = SyncConfig::default();
        let args = RechargeArgs {
            baseline: None,
            balances: Vec::new(),
            interval_ms: Some(50),
            max_attempts: Some(0),
            abort_on_error: true,
        };

        let options = options(&config, &args);
        assert_eq!(options.interval, Duration::from_millis(50));
        assert_eq!(options.max_attempts, 1);
        assert_eq!(options.error_policy, reconcile::ErrorPolicy::Abort);
    }
}
