use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote service rejected the credential (expired or revoked token).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is connectivity/server-side and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::OperationFailed(_) | BridgeError::RateLimited { .. } => true,
            BridgeError::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BridgeError::OperationFailed("timeout".to_string()).is_transient());
        assert!(BridgeError::RateLimited {
            retry_after_seconds: 5
        }
        .is_transient());
        assert!(BridgeError::RemoteApi {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!BridgeError::RemoteApi {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!BridgeError::Unauthorized("expired".to_string()).is_transient());
        assert!(!BridgeError::NotFound("user".to_string()).is_transient());
    }
}
