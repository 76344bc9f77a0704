//! Session command
//!
//! Opens the persisted session file, installs it as the process-wide store
//! and prints every transition a subcommand causes.

use crate::system_config;
use anyhow::{Context, Result};
use cs_core::{FileStorage, SyncConfig};
use owo_colors::OwoColorize;
use ::session::{global, Credential, Principal, SessionState, SessionStore};
use std::sync::Arc;

fn open_store(config: &SyncConfig) -> Result<Arc<SessionStore>> {
    let path = system_config::session_storage_path(config)?;
    let storage = FileStorage::open(&path)
        .with_context(|| format!("Failed to open session file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "session storage opened");

    let store = Arc::new(SessionStore::with_keys(
        Arc::new(storage),
        config.session.clone(),
    ));
    if global::install(Arc::clone(&store)).is_err() {
        anyhow::bail!("A session store is already installed");
    }
    Ok(store)
}

fn print_state(state: &SessionState) {
    match state.principal() {
        Some(principal) => {
            print!("{} {}", principal.name.bold(), format!("({})", principal.id).dimmed());
            if let Some(email) = &principal.email {
                print!(" <{}>", email);
            }
            println!();
        }
        None => println!("{}", "No principal".dimmed()),
    }

    if state.is_authenticated() {
        println!("{} {}", "●".green(), "Signed in".green());
    } else {
        println!("{} {}", "○".yellow(), "Signed out".yellow());
    }
}

/// Print the persisted session
pub async fn run_show(config: &SyncConfig) -> Result<()> {
    let store = open_store(config)?;
    print_state(&store.state());
    Ok(())
}

/// Persist a principal and credential
pub async fn run_sign_in(
    config: &SyncConfig,
    id: String,
    name: String,
    email: Option<String>,
    token: String,
) -> Result<()> {
    let store = open_store(config)?;
    let _subscription = store.subscribe(|state| {
        println!(
            "{} session v{} ({})",
            "→".cyan(),
            state.version(),
            if state.is_authenticated() { "signed in" } else { "signed out" }
        );
    });

    let mut principal = Principal::new(id, name);
    if let Some(email) = email {
        principal = principal.with_email(email);
    }

    if store.sign_in(principal, Credential::new(token)) {
        println!("{} Signed in", "✓".green());
    } else {
        println!("{}", "Already signed in with these details".dimmed());
    }
    print_state(&store.state());
    Ok(())
}

/// Forget the persisted session
pub async fn run_sign_out(config: &SyncConfig) -> Result<()> {
    let store = open_store(config)?;
    let was_signed_in = store.is_authenticated();
    store.sign_out();

    if was_signed_in {
        println!("{} Signed out", "✓".green());
    } else {
        println!("{}", "Was not signed in".dimmed());
    }
    Ok(())
}
