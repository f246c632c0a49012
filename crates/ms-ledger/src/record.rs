// record.rs — MeditationRecord: one qualifying session in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The value reported to the tracking goal for every qualifying session.
pub const QUALIFYING_VALUE: f64 = 1.0;

/// Whether `identity` can be carried in a remote datapoint's correlation tag
/// and read back unchanged: non-empty, no whitespace, no `]`.
pub fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty() && !identity.chars().any(|c| c.is_whitespace() || c == ']')
}

/// A qualifying meditation session.
///
/// `identity` is derived from the source event and never changes; it is the
/// key for deduplication and for correlating with remote datapoints.
/// `remote_id` stays `None` until a remote datapoint has been created for
/// (or found carrying) this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeditationRecord {
    pub identity: String,

    /// Start of the session.
    pub occurred_at: DateTime<Utc>,

    pub duration_minutes: u32,

    /// Amount reported to the remote goal.
    pub value: f64,

    /// Human-readable note written to the remote datapoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Id of the corresponding remote datapoint, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl MeditationRecord {
    /// Create a record for a qualifying session, not yet known remotely.
    pub fn new(
        identity: impl Into<String>,
        occurred_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            identity: identity.into(),
            occurred_at,
            duration_minutes,
            value: QUALIFYING_VALUE,
            comment: None,
            remote_id: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The remote timestamp this record demands (epoch seconds).
    pub fn timestamp(&self) -> i64 {
        self.occurred_at.timestamp()
    }
}
