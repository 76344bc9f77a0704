//! End-to-end tests for the cartsync binary

mod common;

use anyhow::Result;
use common::Sandbox;

#[test]
fn test_config_set_then_get() -> Result<()> {
    let sandbox = Sandbox::new()?;

    sandbox
        .cmd(&["config", "--set", "poll.max_attempts", "7"])
        .assert_success()?;
    let result = sandbox
        .cmd(&["config", "--get", "poll.max_attempts"])
        .assert_success()?;
    assert_eq!(result.stdout.trim(), "7");

    let saved = std::fs::read_to_string(sandbox.config_path())?;
    assert!(saved.contains("max_attempts = 7"));
    Ok(())
}

#[test]
fn test_config_rejects_invalid_values() -> Result<()> {
    let sandbox = Sandbox::new()?;

    sandbox
        .cmd(&["config", "--set", "poll.max_attempts", "0"])
        .assert_failure()?;
    sandbox
        .cmd(&["config", "--set", "poll.nope", "1"])
        .assert_failure()?;

    let result = sandbox
        .cmd(&["config", "--get", "poll.max_attempts"])
        .assert_success()?;
    assert_eq!(result.stdout.trim(), "30");
    Ok(())
}

#[test]
fn test_config_example_and_list() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let example = sandbox.cmd(&["config", "--example"]).assert_success()?;
    assert!(example.contains_stdout("[debounce]"));
    assert!(example.contains_stdout("delay_ms = 500"));

    let list = sandbox.cmd(&["config", "--list"]).assert_success()?;
    assert!(list.contains_stdout("interval_ms"));
    assert!(list.contains_stdout("credential_key"));
    Ok(())
}

#[test]
fn test_session_survives_restart() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let shown = sandbox.cmd(&["session", "show"]).assert_success()?;
    assert!(shown.contains_stdout("Signed out"));

    sandbox
        .cmd(&[
            "session", "sign-in", "--id", "42", "--name", "ada", "--email", "ada@example.com",
            "--token", "secret",
        ])
        .assert_success()?;
    assert!(sandbox.session_path().exists());

    // A fresh process hydrates from the session file
    let shown = sandbox.cmd(&["session", "show"]).assert_success()?;
    assert!(shown.contains_stdout("ada"));
    assert!(shown.contains_stdout("Signed in"));

    sandbox.cmd(&["session", "sign-out"]).assert_success()?;
    let shown = sandbox.cmd(&["session", "show"]).assert_success()?;
    assert!(shown.contains_stdout("Signed out"));
    Ok(())
}

#[test]
fn test_stepper_coalesces_burst() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&["stepper", "--values", "1,2,3", "--gap-ms", "5", "--delay-ms", "200"])
        .assert_success()?;
    assert!(result.contains_stdout("cart-1 = 3"));
    assert!(!result.contains_stdout("cart-1 = 2"));
    assert!(result.contains_stdout("3 steps coalesced into 1 commit(s), 1 accepted"));
    Ok(())
}

#[test]
fn test_stepper_reports_rejection() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&["stepper", "--values", "4,5", "--gap-ms", "5", "--delay-ms", "50", "--reject"])
        .assert_success()?;
    assert!(result.contains_stdout("out of stock"));
    assert!(result.contains_stdout("0 accepted"));
    Ok(())
}

#[test]
fn test_recharge_converges() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&["recharge", "--balances", "100,100,err,150", "--interval-ms", "10"])
        .assert_success()?;
    assert!(result.contains_stdout("balance is now 150"));
    assert!(result.contains_stdout("after 4 attempt(s)"));
    Ok(())
}

#[test]
fn test_recharge_times_out() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&[
            "recharge", "--balances", "100", "--interval-ms", "10", "--max-attempts", "3",
        ])
        .assert_failure()?;
    assert!(result.contains_stdout("Gave up waiting"));
    assert!(result.contains_stdout("after 3 attempt(s)"));
    Ok(())
}

#[test]
fn test_recharge_seeded_baseline_converges_on_first_poll() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&["recharge", "--baseline", "100", "--balances", "150", "--interval-ms", "10"])
        .assert_success()?;
    assert!(result.contains_stdout("after 1 attempt(s)"));
    Ok(())
}

#[test]
fn test_logs_go_to_stderr_not_stdout() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&["stepper", "--values", "1,2", "--gap-ms", "5", "--delay-ms", "20"])
        .env("RUST_LOG", "debug")
        .assert_success()?;
    assert!(result.contains_stderr("committing generation"));
    assert!(!result.contains_stdout("committing generation"));
    assert!(result.contains_stdout("2 steps coalesced into 1 commit(s)"));
    Ok(())
}

#[test]
fn test_recharge_waits_between_polls() -> Result<()> {
    let sandbox = Sandbox::new()?;

    let result = sandbox
        .cmd(&[
            "recharge", "--balances", "100,100,150", "--interval-ms", "50",
        ])
        .assert_success()?;
    // Three polls, each one interval apart from start
    assert!(result.duration >= std::time::Duration::from_millis(150));
    Ok(())
}
