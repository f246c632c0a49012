// reconcile.rs — The reconciler: make the remote goal equal the ledger.
//
// The service has no notion of a ledger identity, so every datapoint msync
// creates carries a tag in its comment:
//
//   Early meditation: 45 minutes at 07:21 [msync:2025-09-26T11:21Z]
//
// Each pass parses the tags back out of a fresh listing and diffs against
// the ledger from scratch. Nothing from a previous pass is trusted, which is
// what makes an interrupted or partially-failed pass heal on the next run.
//
// Operations are ordered Delete → Update → Create, each group sorted, so the
// same inputs always produce the same plan.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use ms_ledger::MeditationRecord;
use ms_remote::{RemoteDatapoint, RemoteError, RemoteGoalClient, RetryPolicy};

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[msync:([^\]\s]+)\]").expect("tag pattern is valid"))
}

/// The correlation tag embedded in a datapoint comment.
pub fn identity_tag(identity: &str) -> String {
    format!("[msync:{identity}]")
}

/// Extract the identity from a datapoint comment, if it carries a tag.
pub fn parse_identity(comment: &str) -> Option<&str> {
    tag_pattern()
        .captures(comment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The full comment written on creation: the record's note plus its tag.
pub fn render_comment(record: &MeditationRecord) -> String {
    match record.comment.as_deref().filter(|c| !c.is_empty()) {
        Some(note) => format!("{note} {}", identity_tag(&record.identity)),
        None => identity_tag(&record.identity),
    }
}

/// One change to the remote goal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Remove a datapoint the ledger does not account for. `identity` is the
    /// tag it carried, if any.
    Delete {
        remote_id: String,
        identity: Option<String>,
    },
    /// Bring a correlated datapoint's value and timestamp back in line.
    Update {
        record: MeditationRecord,
        remote_id: String,
    },
    /// Create the datapoint for a record that has none.
    Create { record: MeditationRecord },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Delete { .. } => "delete",
            Operation::Update { .. } => "update",
            Operation::Create { .. } => "create",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete {
                remote_id,
                identity: Some(identity),
            } => write!(f, "delete {remote_id} ({identity})"),
            Operation::Delete {
                remote_id,
                identity: None,
            } => write!(f, "delete {remote_id} (untagged)"),
            Operation::Update { record, remote_id } => write!(
                f,
                "update {remote_id} ({}) -> value {} at {}",
                record.identity,
                record.value,
                record.occurred_at.to_rfc3339()
            ),
            Operation::Create { record } => write!(
                f,
                "create {} -> value {} at {}",
                record.identity,
                record.value,
                record.occurred_at.to_rfc3339()
            ),
        }
    }
}

/// The outcome of diffing ledger against remote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Remote changes, in application order.
    pub operations: Vec<Operation>,
    /// `(identity, remote_id)` pairs where the datapoint kept for a record
    /// is not the one the ledger remembers.
    pub relinks: Vec<(String, String)>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }
}

fn differs(record: &MeditationRecord, dp: &RemoteDatapoint) -> bool {
    (record.value - dp.value).abs() > f64::EPSILON || record.timestamp() != dp.timestamp
}

/// Compute the operations that make `remote` exactly match `ledger`.
pub fn reconcile<'a>(
    ledger: impl IntoIterator<Item = &'a MeditationRecord>,
    remote: &[RemoteDatapoint],
) -> Plan {
    let mut tagged: BTreeMap<&str, Vec<&RemoteDatapoint>> = BTreeMap::new();
    let mut deletes: Vec<Operation> = Vec::new();

    for dp in remote {
        match parse_identity(&dp.comment) {
            Some(identity) => tagged.entry(identity).or_default().push(dp),
            None => deletes.push(Operation::Delete {
                remote_id: dp.id.clone(),
                identity: None,
            }),
        }
    }

    let mut records: Vec<&MeditationRecord> = ledger.into_iter().collect();
    records.sort_by(|a, b| a.identity.cmp(&b.identity));

    let mut updates = Vec::new();
    let mut creates = Vec::new();
    let mut relinks = Vec::new();

    for record in records {
        let Some(mut matches) = tagged.remove(record.identity.as_str()) else {
            creates.push(Operation::Create {
                record: record.clone(),
            });
            continue;
        };

        matches.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        let keep_at = record
            .remote_id
            .as_deref()
            .and_then(|id| matches.iter().position(|dp| dp.id == id))
            .unwrap_or(0);
        let keeper = matches.remove(keep_at);

        for duplicate in matches {
            deletes.push(Operation::Delete {
                remote_id: duplicate.id.clone(),
                identity: Some(record.identity.clone()),
            });
        }

        if record.remote_id.as_deref() != Some(keeper.id.as_str()) {
            relinks.push((record.identity.clone(), keeper.id.clone()));
        }

        if differs(record, keeper) {
            updates.push(Operation::Update {
                record: record.clone(),
                remote_id: keeper.id.clone(),
            });
        }
    }

    for (identity, orphans) in tagged {
        for dp in orphans {
            deletes.push(Operation::Delete {
                remote_id: dp.id.clone(),
                identity: Some(identity.to_string()),
            });
        }
    }

    deletes.sort_by(|a, b| delete_key(a).cmp(delete_key(b)));

    let mut operations = deletes;
    operations.extend(updates);
    operations.extend(creates);
    Plan {
        operations,
        relinks,
    }
}

fn delete_key(op: &Operation) -> &str {
    match op {
        Operation::Delete { remote_id, .. } => remote_id,
        _ => "",
    }
}

/// An operation that still failed after retries.
#[derive(Debug, Clone)]
pub struct ApplyFailure {
    pub operation: Operation,
    pub error: RemoteError,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.error)
    }
}

/// What happened when a plan was applied.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub deleted: usize,
    pub updated: usize,
    /// `(identity, remote_id)` for every datapoint created.
    pub created: Vec<(String, String)>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.deleted + self.updated + self.created.len()
    }
}

/// Apply `operations` in order. Each one goes through `retry`; a failure is
/// recorded and the remaining operations still run.
pub fn apply(
    client: &dyn RemoteGoalClient,
    goal: &str,
    operations: &[Operation],
    retry: &RetryPolicy,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for op in operations {
        let label = format!("{op}");
        let result = match op {
            Operation::Delete { remote_id, .. } => retry
                .run(&label, || client.delete_datapoint(goal, remote_id))
                .map(|()| report.deleted += 1),
            Operation::Update { record, remote_id } => retry
                .run(&label, || {
                    client.update_datapoint(goal, remote_id, record.value, record.timestamp())
                })
                .map(|()| report.updated += 1),
            Operation::Create { record } => {
                let comment = render_comment(record);
                retry
                    .run(&label, || {
                        client.create_datapoint(goal, record.value, record.timestamp(), &comment)
                    })
                    .map(|remote_id| {
                        report.created.push((record.identity.clone(), remote_id));
                    })
            }
        };

        if let Err(error) = result {
            tracing::error!(goal, operation = %op, error = %error, "operation failed");
            report.failures.push(ApplyFailure {
                operation: op.clone(),
                error,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(identity: &str, ts: i64) -> MeditationRecord {
        MeditationRecord::new(identity, Utc.timestamp_opt(ts, 0).unwrap(), 40)
            .with_comment("Early meditation: 40 minutes at 06:00")
    }

    fn dp(id: &str, identity: Option<&str>, value: f64, ts: i64) -> RemoteDatapoint {
        RemoteDatapoint {
            id: id.into(),
            value,
            timestamp: ts,
            comment: identity.map(identity_tag).unwrap_or_else(|| "manual".into()),
            daystamp: None,
            fulltext: None,
        }
    }

    #[test]
    fn tag_round_trip_inside_comment() {
        let r = record("2025-09-26T10:00Z", 1_000);
        let comment = render_comment(&r);
        assert_eq!(
            comment,
            "Early meditation: 40 minutes at 06:00 [msync:2025-09-26T10:00Z]"
        );
        assert_eq!(parse_identity(&comment), Some("2025-09-26T10:00Z"));
        assert_eq!(parse_identity("Early meditation: 40 minutes"), None);
    }

    #[test]
    fn record_without_comment_gets_bare_tag() {
        let mut r = record("a", 1);
        r.comment = None;
        assert_eq!(render_comment(&r), "[msync:a]");
    }

    #[test]
    fn empty_remote_creates_everything() {
        let ledger = [record("b", 2_000), record("a", 1_000)];
        let plan = reconcile(&ledger, &[]);
        let identities: Vec<_> = plan
            .operations
            .iter()
            .map(|op| match op {
                Operation::Create { record } => record.identity.as_str(),
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(identities, ["a", "b"]);
    }

    #[test]
    fn matching_remote_needs_nothing() {
        let mut r = record("a", 1_000);
        r.remote_id = Some("dp1".into());
        let plan = reconcile([&r], &[dp("dp1", Some("a"), 1.0, 1_000)]);
        assert!(plan.is_empty());
        assert!(plan.relinks.is_empty());
    }

    #[test]
    fn changed_value_or_timestamp_is_updated() {
        let ledger = [record("a", 1_000), record("b", 2_000)];
        let remote = [
            dp("dp1", Some("a"), 2.0, 1_000),
            dp("dp2", Some("b"), 1.0, 2_060),
        ];
        let plan = reconcile(&ledger, &remote);
        assert_eq!(plan.count("update"), 2);
        assert_eq!(plan.count("create"), 0);
        assert_eq!(plan.count("delete"), 0);
    }

    #[test]
    fn unknown_and_untagged_datapoints_are_deleted() {
        let ledger = [record("a", 1_000)];
        let remote = [
            dp("dp1", Some("a"), 1.0, 1_000),
            dp("dp2", Some("gone"), 1.0, 5_000),
            dp("dp3", None, 1.0, 6_000),
        ];
        let plan = reconcile(&ledger, &remote);
        assert_eq!(
            plan.operations,
            vec![
                Operation::Delete {
                    remote_id: "dp2".into(),
                    identity: Some("gone".into()),
                },
                Operation::Delete {
                    remote_id: "dp3".into(),
                    identity: None,
                },
            ]
        );
    }

    #[test]
    fn duplicates_keep_the_remembered_datapoint() {
        let mut r = record("a", 1_000);
        r.remote_id = Some("dp9".into());
        let remote = [
            dp("dp1", Some("a"), 1.0, 1_000),
            dp("dp9", Some("a"), 1.0, 1_000),
        ];
        let plan = reconcile([&r], &remote);
        assert_eq!(
            plan.operations,
            vec![Operation::Delete {
                remote_id: "dp1".into(),
                identity: Some("a".into()),
            }]
        );
        assert!(plan.relinks.is_empty());
    }

    #[test]
    fn duplicates_without_remembered_id_keep_earliest_and_relink() {
        let r = record("a", 1_000);
        let remote = [
            dp("dp7", Some("a"), 1.0, 1_000),
            dp("dp3", Some("a"), 1.0, 1_000),
        ];
        let plan = reconcile([&r], &remote);
        assert_eq!(plan.count("delete"), 1);
        assert_eq!(plan.relinks, vec![("a".to_string(), "dp3".to_string())]);
    }

    #[test]
    fn operations_are_ordered_delete_update_create() {
        let ledger = [record("a", 1_000), record("c", 3_000)];
        let remote = [
            dp("dp1", Some("a"), 5.0, 1_000),
            dp("dp2", Some("z"), 1.0, 9_000),
        ];
        let plan = reconcile(&ledger, &remote);
        let kinds: Vec<_> = plan.operations.iter().map(Operation::kind).collect();
        assert_eq!(kinds, ["delete", "update", "create"]);
    }

    #[test]
    fn plan_is_deterministic_regardless_of_input_order() {
        let ledger = [record("b", 2_000), record("a", 1_000), record("c", 3_000)];
        let remote = [
            dp("dp5", None, 1.0, 1),
            dp("dp2", Some("x"), 1.0, 2),
            dp("dp4", Some("a"), 3.0, 1_000),
        ];
        let mut reversed_ledger = ledger.clone();
        reversed_ledger.reverse();
        let mut reversed_remote = remote.clone();
        reversed_remote.reverse();

        assert_eq!(
            reconcile(&ledger, &remote),
            reconcile(&reversed_ledger, &reversed_remote)
        );
    }

    #[test]
    fn apply_continues_past_failures() {
        use ms_remote::{FailurePoint, InMemoryGoalService};

        let service = InMemoryGoalService::new();
        service.insert("goal", dp("old", None, 1.0, 1));
        service.fail_next(
            FailurePoint::Delete,
            RemoteError::Status {
                operation: "delete".into(),
                status: 403,
                body: "forbidden".into(),
            },
        );

        let ledger = [record("a", 1_000)];
        let plan = reconcile(&ledger, &service.datapoints("goal"));
        let report = apply(&service, "goal", &plan.operations, &RetryPolicy::none());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].operation.kind(), "delete");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.applied(), 1);
    }
}
