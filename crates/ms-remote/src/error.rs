// error.rs — Error types for talking to the tracking service.

use thiserror::Error;

/// Errors returned by a [`RemoteGoalClient`](crate::RemoteGoalClient) or
/// [`DetectionSource`](crate::DetectionSource).
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// The service answered with a non-success status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// The response body was not what the API documents.
    #[error("unexpected response to {operation}: {message}")]
    Decode { operation: String, message: String },

    /// The client could not be constructed or the request was malformed locally.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Whether retrying the same call might succeed.
    ///
    /// Transport failures, 5xx and 429 are transient; everything else
    /// (auth failures, 404s, bad payloads) will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport { .. } => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Decode { .. } | RemoteError::InvalidRequest(_) => false,
        }
    }
}
