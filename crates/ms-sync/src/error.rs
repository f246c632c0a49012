// error.rs — Error types for qualification, configuration and sync passes.

use std::path::PathBuf;

use thiserror::Error;

use ms_ledger::LedgerError;
use ms_remote::RemoteError;

/// A raw source event that cannot be evaluated.
///
/// Never fatal: the event is skipped with a warning and the rest of the
/// batch is still qualified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualifyError {
    /// Duration is negative, NaN or infinite.
    #[error("event {source_id}: invalid duration {value}")]
    InvalidDuration { source_id: String, value: f64 },

    /// Timestamp is outside the representable range.
    #[error("event {source_id}: invalid timestamp {timestamp}")]
    InvalidTimestamp { source_id: String, timestamp: i64 },

    /// An Apple Health entry whose entry text does not carry a usable start time.
    #[error("event {source_id}: cannot read start time from Apple Health entry {text:?}")]
    UnreadableAppleHealthTime { source_id: String, text: String },
}

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("unknown time zone {0:?}")]
    UnknownTimezone(String),

    #[error("invalid clock time {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("qualification window {start}–{end} is empty")]
    InvalidWindow { start: String, end: String },

    #[error("no Beeminder auth token: set BEEMINDER_AUTH_TOKEN or beeminder.auth_token")]
    MissingAuthToken,
}

/// Fatal failures that halt a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The ledger could not be loaded, locked or saved.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A listing call still failed after the retry policy gave up.
    #[error("cannot {operation}: {source}")]
    Remote {
        operation: String,
        source: RemoteError,
    },
}
