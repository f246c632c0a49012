// memory.rs — InMemoryGoalService: an in-process stand-in for the tracking
// service.
//
// Implements both RemoteGoalClient and DetectionSource over plain vectors so
// the sync engine can be exercised end to end without HTTP. Failures can be
// injected per operation kind to simulate flaky networks and hard errors.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::client::{DetectionSource, RemoteGoalClient};
use crate::datapoint::{RawEvent, RemoteDatapoint};
use crate::error::RemoteError;

/// Which kind of call an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    List,
    Create,
    Update,
    Delete,
}

/// A fake tracking service holding datapoints for any number of goals.
#[derive(Debug, Default)]
pub struct InMemoryGoalService {
    goals: RefCell<BTreeMap<String, Vec<RemoteDatapoint>>>,
    failures: RefCell<HashMap<FailurePoint, Vec<RemoteError>>>,
    next_id: Cell<u64>,
    calls: RefCell<Vec<String>>,
}

impl InMemoryGoalService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a datapoint directly, bypassing id assignment.
    pub fn insert(&self, goal: &str, datapoint: RemoteDatapoint) {
        self.goals
            .borrow_mut()
            .entry(goal.to_string())
            .or_default()
            .push(datapoint);
    }

    /// Seed a raw session on a detection goal.
    pub fn insert_raw(&self, goal: &str, event: RawEvent) {
        self.insert(
            goal,
            RemoteDatapoint {
                id: event.source_id,
                value: event.duration_minutes,
                timestamp: event.timestamp,
                comment: event.comment,
                daystamp: None,
                fulltext: event.fulltext,
            },
        );
    }

    /// Snapshot of a goal's datapoints, in insertion order.
    pub fn datapoints(&self, goal: &str) -> Vec<RemoteDatapoint> {
        self.goals.borrow().get(goal).cloned().unwrap_or_default()
    }

    /// Make the next call at `point` fail with `error`. Queued errors are
    /// consumed in order, one per call.
    pub fn fail_next(&self, point: FailurePoint, error: RemoteError) {
        self.failures
            .borrow_mut()
            .entry(point)
            .or_default()
            .push(error);
    }

    /// Queue `count` transient (HTTP 503) failures at `point`.
    pub fn fail_transiently(&self, point: FailurePoint, count: usize) {
        for _ in 0..count {
            self.fail_next(
                point,
                RemoteError::Status {
                    operation: format!("{point:?}"),
                    status: 503,
                    body: "service unavailable".into(),
                },
            );
        }
    }

    /// Every mutating call made so far, e.g. `create meditate-early`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn take_failure(&self, point: FailurePoint) -> Result<(), RemoteError> {
        let mut failures = self.failures.borrow_mut();
        match failures.get_mut(&point) {
            Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
            _ => Ok(()),
        }
    }

    fn not_found(operation: &str, remote_id: &str) -> RemoteError {
        RemoteError::Status {
            operation: operation.to_string(),
            status: 404,
            body: format!("no datapoint {remote_id}"),
        }
    }
}

impl RemoteGoalClient for InMemoryGoalService {
    fn list_datapoints(&self, goal: &str) -> Result<Vec<RemoteDatapoint>, RemoteError> {
        self.take_failure(FailurePoint::List)?;
        Ok(self.datapoints(goal))
    }

    fn create_datapoint(
        &self,
        goal: &str,
        value: f64,
        timestamp: i64,
        comment: &str,
    ) -> Result<String, RemoteError> {
        self.take_failure(FailurePoint::Create)?;
        self.calls.borrow_mut().push(format!("create {goal}"));
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let id = format!("dp{id}");
        self.insert(
            goal,
            RemoteDatapoint {
                id: id.clone(),
                value,
                timestamp,
                comment: comment.to_string(),
                daystamp: None,
                fulltext: None,
            },
        );
        Ok(id)
    }

    fn update_datapoint(
        &self,
        goal: &str,
        remote_id: &str,
        value: f64,
        timestamp: i64,
    ) -> Result<(), RemoteError> {
        self.take_failure(FailurePoint::Update)?;
        self.calls.borrow_mut().push(format!("update {goal} {remote_id}"));
        let mut goals = self.goals.borrow_mut();
        let dp = goals
            .get_mut(goal)
            .and_then(|dps| dps.iter_mut().find(|dp| dp.id == remote_id))
            .ok_or_else(|| Self::not_found("update", remote_id))?;
        dp.value = value;
        dp.timestamp = timestamp;
        Ok(())
    }

    fn delete_datapoint(&self, goal: &str, remote_id: &str) -> Result<(), RemoteError> {
        self.take_failure(FailurePoint::Delete)?;
        self.calls.borrow_mut().push(format!("delete {goal} {remote_id}"));
        let mut goals = self.goals.borrow_mut();
        let dps = goals
            .get_mut(goal)
            .ok_or_else(|| Self::not_found("delete", remote_id))?;
        let before = dps.len();
        dps.retain(|dp| dp.id != remote_id);
        if dps.len() == before {
            return Err(Self::not_found("delete", remote_id));
        }
        Ok(())
    }
}

impl DetectionSource for InMemoryGoalService {
    fn list_raw_events(
        &self,
        goal: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, RemoteError> {
        let cutoff = since.map(|t| t.timestamp());
        Ok(self
            .list_datapoints(goal)?
            .into_iter()
            .filter(|dp| cutoff.map_or(true, |c| dp.timestamp >= c))
            .map(RawEvent::from)
            .collect())
    }
}
