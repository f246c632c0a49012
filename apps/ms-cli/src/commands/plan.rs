// plan.rs — `msync plan`: dry-run reconciliation against the current ledger.

use ms_ledger::LedgerStore;
use ms_sync::{Plan, SyncConfig};

pub fn execute(config: &SyncConfig) -> anyhow::Result<()> {
    let client = super::beeminder_client(config)?;
    let sync = super::orchestrator(config, &client)?;

    let ledger = LedgerStore::load(&config.ledger.path)?;
    let plan = sync.plan(&ledger)?;
    print!("{}", render(&plan, &config.beeminder.goal));
    Ok(())
}

fn render(plan: &Plan, goal: &str) -> String {
    if plan.is_empty() && plan.relinks.is_empty() {
        return format!("{goal} already matches the ledger.\n");
    }

    let mut out = String::new();
    for op in &plan.operations {
        out.push_str(&format!("  {op}\n"));
    }
    for (identity, remote_id) in &plan.relinks {
        out.push_str(&format!("  link {identity} -> {remote_id}\n"));
    }
    out.push_str(&format!(
        "\n{} delete(s), {} update(s), {} create(s) pending on {goal}.\n",
        plan.count("delete"),
        plan.count("update"),
        plan.count("create"),
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_sync::Operation;

    #[test]
    fn empty_plan_says_so() {
        assert_eq!(
            render(&Plan::default(), "meditate-early"),
            "meditate-early already matches the ledger.\n"
        );
    }

    #[test]
    fn operations_are_listed_with_totals() {
        let plan = Plan {
            operations: vec![Operation::Delete {
                remote_id: "dp9".into(),
                identity: None,
            }],
            relinks: vec![("2025-09-26T11:21Z".into(), "dp3".into())],
        };
        let text = render(&plan, "meditate-early");
        assert!(text.contains("link 2025-09-26T11:21Z -> dp3"));
        assert!(text.contains("1 delete(s), 0 update(s), 0 create(s) pending on meditate-early."));
    }
}
