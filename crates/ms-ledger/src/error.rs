// error.rs — Error types for the ledger store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, locking, or saving the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The persisted ledger exists but cannot be trusted.
    ///
    /// Always fatal: treating an unreadable ledger as empty would make the
    /// next reconciliation delete every remote datapoint.
    #[error("corrupt ledger at {path}: {reason}")]
    CorruptLedger { path: PathBuf, reason: String },

    /// Another process holds the ledger lock.
    #[error("ledger at {path} is locked by another process")]
    Locked { path: PathBuf },

    /// Failed to serialize the ledger for saving.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::IoError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LedgerError::CorruptLedger {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
