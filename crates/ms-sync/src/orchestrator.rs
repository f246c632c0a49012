// orchestrator.rs — One sync pass, end to end.
//
//   list raw events → qualify → (longest per day) → merge → save
//     → list remote → reconcile → apply → record remote ids → save
//
// The ledger is saved before anything is written remotely, so a pass that
// dies during reconciliation never loses a newly detected session. Listing
// failures are fatal; individual operation failures are reported and left
// for the next pass to retry.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use ms_ledger::{LedgerStore, MeditationRecord};
use ms_remote::{DetectionSource, RawEvent, RemoteGoalClient, RetryPolicy};

use crate::error::SyncError;
use crate::qualify::QualificationRule;
use crate::reconcile::{self, ApplyFailure, Plan};

/// Which goals to use and how to select candidates.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Goal scanned for raw sessions.
    pub source_goal: String,
    /// Goal kept in exact sync with the ledger.
    pub target_goal: String,
    pub one_per_day: bool,
    pub lookback: Option<Duration>,
}

/// Summary of a completed pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub events_seen: usize,
    pub events_skipped: usize,
    pub candidates: usize,
    pub records_added: usize,
    pub deleted: usize,
    pub updated: usize,
    pub created: usize,
    pub failures: Vec<ApplyFailure>,
}

impl SyncReport {
    pub fn operations_applied(&self) -> usize {
        self.deleted + self.updated + self.created
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records added: {}, operations applied: {} (created {}, updated {}, deleted {}), operations failed: {}",
            self.records_added,
            self.operations_applied(),
            self.created,
            self.updated,
            self.deleted,
            self.failures.len()
        )
    }
}

/// Drives sync passes against a detection source and a remote goal.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn DetectionSource,
    remote: &'a dyn RemoteGoalClient,
    rule: QualificationRule,
    settings: SyncSettings,
    retry: RetryPolicy,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn DetectionSource,
        remote: &'a dyn RemoteGoalClient,
        rule: QualificationRule,
        settings: SyncSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            remote,
            rule,
            settings,
            retry,
        }
    }

    /// Run one full pass at wall-clock time `now`.
    pub fn run_pass(
        &self,
        ledger: &mut LedgerStore,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let events = self.fetch_raw_events(now)?;
        report.events_seen = events.len();

        let candidates = self.select_candidates(ledger, &events, &mut report);
        report.candidates = candidates.len();
        report.records_added = ledger.merge(candidates);
        ledger.save()?;

        let plan = self.plan(ledger)?;
        if plan.is_empty() {
            tracing::info!(goal = %self.settings.target_goal, "remote already matches ledger");
        }
        let applied = reconcile::apply(
            self.remote,
            &self.settings.target_goal,
            &plan.operations,
            &self.retry,
        );

        let mut changed = false;
        for (identity, remote_id) in plan.relinks.iter().chain(applied.created.iter()) {
            changed |= ledger.set_remote_id(identity, remote_id);
        }
        if changed {
            ledger.save()?;
        }

        report.deleted = applied.deleted;
        report.updated = applied.updated;
        report.created = applied.created.len();
        report.failures = applied.failures;

        tracing::info!(
            added = report.records_added,
            applied = report.operations_applied(),
            failed = report.failures.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    /// Diff the ledger against the remote goal without changing anything.
    pub fn plan(&self, ledger: &LedgerStore) -> Result<Plan, SyncError> {
        let goal = &self.settings.target_goal;
        let operation = format!("list datapoints of {goal}");
        let remote = self
            .retry
            .run(&operation, || self.remote.list_datapoints(goal))
            .map_err(|source| SyncError::Remote { operation, source })?;

        let plan = reconcile::reconcile(ledger.records(), &remote);
        tracing::debug!(
            goal = %goal,
            remote = remote.len(),
            deletes = plan.count("delete"),
            updates = plan.count("update"),
            creates = plan.count("create"),
            "reconciliation planned"
        );
        Ok(plan)
    }

    fn fetch_raw_events(&self, now: DateTime<Utc>) -> Result<Vec<RawEvent>, SyncError> {
        let goal = &self.settings.source_goal;
        let since = self.settings.lookback.map(|window| now - window);
        let operation = format!("list raw events of {goal}");
        self.retry
            .run(&operation, || self.source.list_raw_events(goal, since))
            .map_err(|source| SyncError::Remote { operation, source })
    }

    fn select_candidates(
        &self,
        ledger: &LedgerStore,
        events: &[RawEvent],
        report: &mut SyncReport,
    ) -> Vec<MeditationRecord> {
        let mut skipped = 0;
        let candidates: Vec<MeditationRecord> = self
            .rule
            .qualify_with(events, |_, _| skipped += 1)
            .collect();
        report.events_skipped = skipped;

        if !self.settings.one_per_day {
            return candidates;
        }

        let covered: BTreeSet<NaiveDate> = ledger
            .records()
            .map(|r| self.rule.local_date(r.occurred_at))
            .collect();
        self.rule
            .longest_per_day(candidates)
            .into_iter()
            .filter(|c| {
                let day = self.rule.local_date(c.occurred_at);
                if covered.contains(&day) && ledger.get(&c.identity).is_none() {
                    tracing::debug!(identity = %c.identity, %day, "day already recorded");
                    return false;
                }
                true
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use ms_remote::InMemoryGoalService;
    use tempfile::tempdir;

    fn settings() -> SyncSettings {
        SyncSettings {
            source_goal: "meditatev4".into(),
            target_goal: "meditate-early".into(),
            one_per_day: true,
            lookback: None,
        }
    }

    fn session(service: &InMemoryGoalService, day: u32, h: u32, m: u32, minutes: f64) {
        service.insert_raw(
            "meditatev4",
            RawEvent {
                source_id: format!("s{day}{h}{m}"),
                timestamp: New_York
                    .with_ymd_and_hms(2025, 9, day, h, m, 0)
                    .unwrap()
                    .timestamp(),
                duration_minutes: minutes,
                comment: String::new(),
                fulltext: None,
            },
        );
    }

    #[test]
    fn later_session_on_recorded_day_is_not_added() {
        let dir = tempdir().unwrap();
        let mut ledger = LedgerStore::load(dir.path().join("ledger.json")).unwrap();
        let service = InMemoryGoalService::new();
        let sync = SyncOrchestrator::new(
            &service,
            &service,
            QualificationRule::default(),
            settings(),
            RetryPolicy::none(),
        );

        session(&service, 26, 6, 0, 40.0);
        let first = sync.run_pass(&mut ledger, Utc::now()).unwrap();
        assert_eq!(first.records_added, 1);

        session(&service, 26, 7, 0, 90.0);
        let second = sync.run_pass(&mut ledger, Utc::now()).unwrap();
        assert_eq!(second.records_added, 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn without_daily_cap_every_qualifying_session_is_kept() {
        let dir = tempdir().unwrap();
        let mut ledger = LedgerStore::load(dir.path().join("ledger.json")).unwrap();
        let service = InMemoryGoalService::new();
        let mut settings = settings();
        settings.one_per_day = false;
        let sync = SyncOrchestrator::new(
            &service,
            &service,
            QualificationRule::default(),
            settings,
            RetryPolicy::none(),
        );

        session(&service, 26, 6, 0, 40.0);
        session(&service, 26, 7, 0, 90.0);
        let report = sync.run_pass(&mut ledger, Utc::now()).unwrap();
        assert_eq!(report.records_added, 2);
        assert_eq!(report.created, 2);
    }

    #[test]
    fn lookback_limits_scanned_history() {
        let dir = tempdir().unwrap();
        let mut ledger = LedgerStore::load(dir.path().join("ledger.json")).unwrap();
        let service = InMemoryGoalService::new();
        let mut settings = settings();
        settings.lookback = Some(Duration::days(2));
        let sync = SyncOrchestrator::new(
            &service,
            &service,
            QualificationRule::default(),
            settings,
            RetryPolicy::none(),
        );

        session(&service, 20, 6, 0, 40.0);
        session(&service, 26, 6, 0, 40.0);
        let now = New_York
            .with_ymd_and_hms(2025, 9, 26, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let report = sync.run_pass(&mut ledger, now).unwrap();
        assert_eq!(report.events_seen, 1);
        assert_eq!(report.records_added, 1);
    }

    #[test]
    fn report_summary_line() {
        let report = SyncReport {
            records_added: 1,
            created: 1,
            deleted: 2,
            ..SyncReport::default()
        };
        assert_eq!(
            report.to_string(),
            "records added: 1, operations applied: 3 (created 1, updated 0, deleted 2), operations failed: 0"
        );
        assert!(report.is_clean());
    }
}
