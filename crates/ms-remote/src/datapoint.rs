// datapoint.rs — Wire-level views of remote datapoints.

use serde::{Deserialize, Deserializer, Serialize};

/// A datapoint on the goal being kept in sync, as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDatapoint {
    /// Remote id, assigned by the service.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    pub value: f64,

    /// Epoch seconds.
    pub timestamp: i64,

    /// Missing and `null` both decode as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daystamp: Option<String>,

    /// Service-rendered description, e.g.
    /// `2025-Sep-26 entered at 07:21 by zarathustra via BeemiOS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext: Option<String>,
}

/// A raw session on the detection goal, before qualification.
///
/// `duration_minutes` is kept as reported; validating it is the
/// qualification filter's job.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub source_id: String,
    /// Epoch seconds. For auto-entered datapoints this may be end-of-day
    /// rather than the session start.
    pub timestamp: i64,
    pub duration_minutes: f64,
    pub comment: String,
    pub fulltext: Option<String>,
}

impl From<RemoteDatapoint> for RawEvent {
    fn from(dp: RemoteDatapoint) -> Self {
        RawEvent {
            source_id: dp.id,
            timestamp: dp.timestamp,
            duration_minutes: dp.value,
            comment: dp.comment,
            fulltext: dp.fulltext,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
