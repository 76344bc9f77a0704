//! Configuration management command
//!
//! Provides CLI interface to view and edit the cartsync configuration.

use crate::system_config;
use anyhow::{Context, Result};
use cs_core::config::{DEBOUNCE_DELAY_RANGE_MS, POLL_ATTEMPTS_RANGE, POLL_INTERVAL_RANGE_MS};
use cs_core::SyncConfig;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

/// List all configuration values
pub async fn run_list(config_path: &Path) -> Result<()> {
    let config = system_config::load(config_path)?;

    println!("{}", "Cartsync Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("{}", "[debounce]".yellow());
    println!(
        "  {} = {} {}",
        "delay_ms".cyan(),
        config.debounce.delay_ms,
        format!("({:?})", config.debounce.delay()).dimmed()
    );

    println!("\n{}", "[poll]".yellow());
    println!(
        "  {} = {} {}",
        "interval_ms".cyan(),
        config.poll.interval_ms,
        format!("({:?})", config.poll.interval()).dimmed()
    );
    println!(
        "  {} = {} {}",
        "max_attempts".cyan(),
        config.poll.max_attempts,
        format!(
            "(gives up after ~{:?})",
            config.poll.interval() * config.poll.max_attempts
        )
        .dimmed()
    );
    println!(
        "  {} = {}",
        "abort_on_error".cyan(),
        config.poll.abort_on_error
    );

    println!("\n{}", "[session]".yellow());
    println!(
        "  {} = {:?}",
        "credential_key".cyan(),
        config.session.credential_key
    );
    println!(
        "  {} = {:?}",
        "principal_key".cyan(),
        config.session.principal_key
    );

    println!("\n{}", "[storage]".yellow());
    match &config.storage.path {
        Some(path) => println!("  {} = {:?}", "path".cyan(), path.display().to_string()),
        None => {
            let resolved = system_config::session_storage_path(&config)?;
            println!(
                "  {} {}",
                "path".cyan(),
                format!("(unset, using {})", resolved.display()).dimmed()
            );
        }
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!(
        "  debounce.delay_ms: {}-{}",
        DEBOUNCE_DELAY_RANGE_MS.0, DEBOUNCE_DELAY_RANGE_MS.1
    );
    println!(
        "  poll.interval_ms: {}-{}",
        POLL_INTERVAL_RANGE_MS.0, POLL_INTERVAL_RANGE_MS.1
    );
    println!(
        "  poll.max_attempts: {}-{}",
        POLL_ATTEMPTS_RANGE.0, POLL_ATTEMPTS_RANGE.1
    );
    println!("  session keys: non-empty and distinct");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(config_path: &Path, key: &str) -> Result<()> {
    let config = system_config::load(config_path)?;
    println!("{}", read_key(&config, key)?);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load(config_path)?;

    write_key(&mut config, key, value)?;

    // Validate before saving
    config.validate().context("Invalid configuration value")?;

    system_config::save(config_path, &config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(config_path: &Path, create: bool) -> Result<()> {
    if create && system_config::init_if_missing(config_path)? {
        println!(
            "{} Created config file at: {}",
            "✓".green(),
            config_path.display()
        );
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!(
            "{}",
            "File does not exist. Use --create to create it.".yellow()
        );
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}

fn read_key(config: &SyncConfig, key: &str) -> Result<String> {
    let value = match key {
        "debounce.delay_ms" => config.debounce.delay_ms.to_string(),
        "poll.interval_ms" => config.poll.interval_ms.to_string(),
        "poll.max_attempts" => config.poll.max_attempts.to_string(),
        "poll.abort_on_error" => config.poll.abort_on_error.to_string(),
        "session.credential_key" => config.session.credential_key.clone(),
        "session.principal_key" => config.session.principal_key.clone(),
        "storage.path" => config
            .storage
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'cartsync config --list' to see available keys.",
            key
        ),
    };
    Ok(value)
}

fn write_key(config: &mut SyncConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "debounce.delay_ms" => {
            config.debounce.delay_ms = value
                .parse()
                .context("Invalid value: must be a non-negative integer")?;
        }
        "poll.interval_ms" => {
            config.poll.interval_ms = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "poll.max_attempts" => {
            config.poll.max_attempts = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "poll.abort_on_error" => {
            config.poll.abort_on_error = value
                .parse()
                .context("Invalid value: must be 'true' or 'false'")?;
        }
        "session.credential_key" => config.session.credential_key = value.to_string(),
        "session.principal_key" => config.session.principal_key = value.to_string(),
        // An empty value unsets the path
        "storage.path" => {
            config.storage.path = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'cartsync config --list' to see available keys.",
            key
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_key() {
        let mut config = SyncConfig::default();
        write_key(&mut config, "poll.abort_on_error", "true").unwrap();
        write_key(&mut config, "storage.path", "/tmp/s.json").unwrap();

        assert_eq!(read_key(&config, "poll.abort_on_error").unwrap(), "true");
        assert_eq!(read_key(&config, "storage.path").unwrap(), "/tmp/s.json");

        write_key(&mut config, "storage.path", "").unwrap();
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_unknown_and_malformed_keys() {
        let mut config = SyncConfig::default();
        assert!(read_key(&config, "poll.nope").is_err());
        assert!(write_key(&mut config, "poll.max_attempts", "many").is_err());
        assert_eq!(config, SyncConfig::default());
    }
}
