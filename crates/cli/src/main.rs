//! Cartsync CLI - cartsync command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod logging;
mod system_config;

/// Cartsync - client-side state reconciliation for the storefront
#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/cartsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View and edit configuration
    Config {
        /// List all values
        #[arg(long)]
        list: bool,
        /// Print a single value
        #[arg(long, value_name = "KEY")]
        get: Option<String>,
        /// Set a value
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
        set: Option<Vec<String>>,
        /// Print the config file path
        #[arg(long)]
        path: bool,
        /// Create the config file if missing (with --path)
        #[arg(long, requires = "path")]
        create: bool,
        /// Print an example config
        #[arg(long)]
        example: bool,
    },
    /// Inspect or change the persisted session
    #[command(subcommand)]
    Session(SessionCommands),
    /// Simulate a quantity stepper: rapid edits coalesced into one write
    Stepper {
        /// Entity key (e.g. a cart line)
        #[arg(long, default_value = "cart-1")]
        key: String,
        /// Quantities in the order the user clicked them
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<i64>,
        /// Milliseconds between clicks
        #[arg(long, default_value = "100")]
        gap_ms: u64,
        /// Debounce window (default: from config)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Commit right after the last click instead of waiting
        #[arg(long)]
        flush: bool,
        /// Make the simulated server reject the write
        #[arg(long)]
        reject: bool,
    },
    /// Simulate waiting for a recharge to land
    Recharge {
        /// Balance known before the recharge (default: first sample)
        #[arg(long)]
        baseline: Option<u64>,
        /// Balances the server reports, one per poll; "err" fails that poll
        #[arg(long, value_delimiter = ',', required = true)]
        balances: Vec<String>,
        /// Poll interval (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Attempt budget (default: from config)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Stop on the first failed poll
        #[arg(long)]
        abort_on_error: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Show the current session
    Show,
    /// Store a principal and credential
    SignIn {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        token: String,
    },
    /// Forget the session
    SignOut,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init(cli.log_file.as_deref())?;

    let config_path = system_config::resolve_path(cli.config)?;

    match cli.command {
        Commands::Config {
            list,
            get,
            set,
            path,
            create,
            example,
        } => {
            if list {
                cmd::config::run_list(&config_path).await
            } else if let Some(key) = get {
                cmd::config::run_get(&config_path, &key).await
            } else if let Some(pair) = set {
                cmd::config::run_set(&config_path, &pair[0], &pair[1]).await
            } else if path {
                cmd::config::run_path(&config_path, create).await
            } else if example {
                cmd::config::run_example().await
            } else {
                cmd::config::run_list(&config_path).await
            }
        }
        Commands::Session(session_cmd) => {
            let config = system_config::load(&config_path)?;
            match session_cmd {
                SessionCommands::Show => cmd::session::run_show(&config).await,
                SessionCommands::SignIn {
                    id,
                    name,
                    email,
                    token,
                } => cmd::session::run_sign_in(&config, id, name, email, token).await,
                SessionCommands::SignOut => cmd::session::run_sign_out(&config).await,
            }
        }
        Commands::Stepper {
            key,
            values,
            gap_ms,
            delay_ms,
            flush,
            reject,
        } => {
            let config = system_config::load(&config_path)?;
            let args = cmd::stepper::StepperArgs {
                key,
                values,
                gap_ms,
                delay_ms,
                flush,
                reject,
            };
            cmd::stepper::run(&config, args).await
        }
        Commands::Recharge {
            baseline,
            balances,
            interval_ms,
            max_attempts,
            abort_on_error,
        } => {
            let config = system_config::load(&config_path)?;
            let args = cmd::recharge::RechargeArgs {
                baseline,
                balances,
                interval_ms,
                max_attempts,
                abort_on_error,
            };
            cmd::recharge::run(&config, args).await
        }
    }
}
