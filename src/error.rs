use thiserror::Error;

/// Failure of a single poll cycle.
///
/// None of these are fatal: the owning loop logs the error, skips the
/// cycle and tries again on the next tick.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection refused, timeout, or any other reqwest-level failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Response body was not a decodable batch.
    #[error("failed to decode batch: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SyncError {
    /// Short label used in logs and status tracking.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::Status { .. } => "status",
            SyncError::Decode(_) => "decode",
        }
    }

    /// Transport failures and 5xx responses may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            SyncError::Status { status, .. } => status.is_server_error(),
            SyncError::Decode(_) => false,
        }
    }
}
