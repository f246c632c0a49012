// ledger.rs — Ledger subcommands: list, remove.

use std::path::Path;

use anyhow::Context;
use chrono_tz::Tz;
use clap::Subcommand;
use ms_ledger::{LedgerLock, LedgerStore};
use ms_sync::SyncConfig;

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// List all recorded sessions.
    List,
    /// Remove a record. The next `msync run` deletes its datapoint, and the
    /// session is not re-detected.
    Remove {
        /// Record identity, e.g. "2025-09-26T11:21Z".
        identity: String,
    },
}

pub fn execute(cmd: &LedgerCommands, config: &SyncConfig) -> anyhow::Result<()> {
    let path = &config.ledger.path;
    match cmd {
        LedgerCommands::List => {
            let tz = config.qualify.rule()?.timezone();
            print!("{}", list_records(path, tz)?);
            Ok(())
        }
        LedgerCommands::Remove { identity } => {
            remove_record(path, identity)?;
            println!("Removed {identity} from {}", path.display());
            println!("Run `msync run` to delete its datapoint.");
            Ok(())
        }
    }
}

fn list_records(path: &Path, tz: Tz) -> anyhow::Result<String> {
    let ledger = LedgerStore::load(path)?;
    if ledger.is_empty() {
        return Ok(format!("No records in {}.\n", path.display()));
    }

    let mut out = format!(
        "{:<20} {:<18} {:>7} {:<12}\n",
        "IDENTITY", "LOCAL START", "MINUTES", "REMOTE ID"
    );
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for r in ledger.records() {
        let local = r.occurred_at.with_timezone(&tz).format("%Y-%m-%d %H:%M");
        out.push_str(&format!(
            "{:<20} {:<18} {:>7} {:<12}\n",
            r.identity,
            local.to_string(),
            r.duration_minutes,
            r.remote_id.as_deref().unwrap_or("-"),
        ));
    }
    out.push_str(&format!("\n{} record(s) total.\n", ledger.len()));
    Ok(out)
}

fn remove_record(path: &Path, identity: &str) -> anyhow::Result<()> {
    let _lock = LedgerLock::acquire(path)
        .with_context(|| format!("cannot lock ledger {}", path.display()))?;
    let mut ledger = LedgerStore::load(path)?;
    if ledger.remove(identity).is_none() {
        anyhow::bail!("no record {identity} in {}", path.display());
    }
    ledger.save()?;
    Ok(())
}
