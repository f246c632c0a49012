//! # msync
//!
//! Keeps a Beeminder goal in exact agreement with a local ledger of
//! qualifying early-morning meditation sessions.
//!
//! - `msync run` — detect new sessions, record them, reconcile the goal
//! - `msync plan` — show what reconciliation would change, change nothing
//! - `msync ledger list/remove` — inspect or correct the ledger
//!
//! Intended to be run from cron or a systemd timer; the exit status is
//! non-zero whenever anything was left undone.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Sync early-morning meditations to Beeminder.
#[derive(Parser)]
#[command(name = "msync", version, about)]
struct Cli {
    /// Config file (defaults to ./msync.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger file, overriding config and MSYNC_LEDGER_PATH.
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full sync pass.
    Run,
    /// Show the operations a pass would apply against the current ledger.
    Plan,
    /// Inspect or correct the local ledger.
    Ledger {
        #[command(subcommand)]
        command: commands::ledger::LedgerCommands,
    },
}

/// Filter used when `RUST_LOG` is unset, empty or unparseable.
const DEFAULT_LOG_DIRECTIVES: &str = "ms_sync=info,ms_remote=info,ms_ledger=info,msync=info";

fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}

fn init_logging(json: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    // Logs go to stderr; stdout carries only command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = commands::load_config(cli.config.as_deref(), cli.ledger.as_deref())?;
    tracing::debug!(ledger = %config.ledger.path.display(), goal = %config.beeminder.goal, "configuration resolved");

    match &cli.command {
        Commands::Run => commands::run::execute(&config),
        Commands::Plan => commands::plan::execute(&config),
        Commands::Ledger { command } => commands::ledger::execute(command, &config),
    }
}
