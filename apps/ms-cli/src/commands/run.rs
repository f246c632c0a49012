// run.rs — `msync run`: one full sync pass under the ledger lock.

use anyhow::Context;
use chrono::Utc;
use ms_ledger::{LedgerLock, LedgerStore};
use ms_sync::SyncConfig;

pub fn execute(config: &SyncConfig) -> anyhow::Result<()> {
    let client = super::beeminder_client(config)?;
    let sync = super::orchestrator(config, &client)?;

    let path = &config.ledger.path;
    let _lock = LedgerLock::acquire(path)
        .with_context(|| format!("cannot lock ledger {}", path.display()))?;
    let mut ledger = LedgerStore::load(path)?;

    let report = sync.run_pass(&mut ledger, Utc::now())?;

    println!("{report}");
    for failure in &report.failures {
        println!("  failed: {failure}");
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} operation(s) failed; they will be retried on the next run",
            report.failures.len()
        );
    }
    Ok(())
}
