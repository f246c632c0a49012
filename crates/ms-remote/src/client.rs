// client.rs — The seams between the sync engine and the tracking service.

use chrono::{DateTime, Utc};

use crate::datapoint::{RawEvent, RemoteDatapoint};
use crate::error::RemoteError;

/// CRUD access to the datapoints of a goal.
///
/// Implementations own authentication, pagination and transport; callers
/// only see complete listings and per-call results.
pub trait RemoteGoalClient {
    /// Every datapoint currently on `goal`. A partial listing is an error.
    fn list_datapoints(&self, goal: &str) -> Result<Vec<RemoteDatapoint>, RemoteError>;

    /// Create a datapoint and return its remote id.
    fn create_datapoint(
        &self,
        goal: &str,
        value: f64,
        timestamp: i64,
        comment: &str,
    ) -> Result<String, RemoteError>;

    fn update_datapoint(
        &self,
        goal: &str,
        remote_id: &str,
        value: f64,
        timestamp: i64,
    ) -> Result<(), RemoteError>;

    fn delete_datapoint(&self, goal: &str, remote_id: &str) -> Result<(), RemoteError>;
}

/// Read access to the raw sessions recorded on a detection goal.
pub trait DetectionSource {
    /// Raw events on `goal`, restricted to timestamps at or after `since`
    /// when given.
    fn list_raw_events(
        &self,
        goal: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, RemoteError>;
}
