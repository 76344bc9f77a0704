//! Config file location and persistence for the cartsync binary

use anyhow::{Context, Result};
use cs_core::SyncConfig;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cartsync";
const CONFIG_FILE: &str = "config.toml";
const SESSION_FILE: &str = "session.json";

/// The config file to use: the explicit one, else the per-user default
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(APP_DIR).join(CONFIG_FILE))
}

/// Load config, falling back to defaults when the file does not exist
pub fn load(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SyncConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    SyncConfig::from_toml(&contents)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Write config, creating parent directories as needed
pub fn save(path: &Path, config: &SyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
    }

    let contents = config.to_toml().context("Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Write the default config unless a file is already there
///
/// Returns true if a file was created.
pub fn init_if_missing(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save(path, &SyncConfig::default())?;
    Ok(true)
}

/// Where the session file lives: `[storage] path`, else the per-user data dir
pub fn session_storage_path(config: &SyncConfig) -> Result<PathBuf> {
    if let Some(path) = &config.storage.path {
        return Ok(path.clone());
    }
    let base = dirs::data_dir().context("Could not determine data directory")?;
    Ok(base.join(APP_DIR).join(SESSION_FILE))
}

/// Annotated config with every default spelled out
pub fn example_config() -> String {
    r#"# cartsync configuration

[debounce]
# Quiet period before a burst of edits is committed (0-60000)
delay_ms = 500

[poll]
# Time between status checks (100-600000)
interval_ms = 2000
# Checks before giving up (1-10000)
max_attempts = 30
# Stop on the first failed check instead of retrying
abort_on_error = false

[session]
# Storage keys for the persisted credential and user profile
credential_key = "token"
principal_key = "user"

[storage]
# Session file (default: <data dir>/cartsync/session.json)
# path = "/path/to/session.json"
"#
    .to_string()
}
