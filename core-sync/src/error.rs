use bridge_traits::catalog::PlaylistRef;
use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Connectivity, 5xx, 429 or an API-reported error. Not retried here.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Destination credential expired or revoked.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("None of the {total} source tracks could be matched")]
    NoMatches { total: usize },

    /// A batch add failed after the playlist was created. The playlist is
    /// left partially populated.
    #[error("Adding tracks to '{}' failed after {added} tracks: {reason}", playlist.name)]
    WriteFailed {
        playlist: PlaylistRef,
        added: usize,
        reason: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Job storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// A later identical run may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// The destination account has to sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Unauthorized(msg) => SyncError::Unauthorized(msg),
            BridgeError::NotFound(msg) => SyncError::NotFound(msg),
            BridgeError::NotAvailable(msg) => SyncError::InvalidRequest(msg),
            other => SyncError::Transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
