use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("OAuth state mismatch: expected '{expected}', got '{actual}'")]
    StateMismatch { expected: String, actual: String },

    #[error("Authorization code rejected: {0}")]
    InvalidAuthCode(String),

    #[error("Invalid callback URL: {0}")]
    InvalidCallback(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Stored tokens are corrupted: {reason}")]
    TokenCorrupted { reason: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// The user has to go through the browser login again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::TokenRefreshFailed(_)
                | AuthError::NotAuthenticated
                | AuthError::TokenCorrupted { .. }
                | AuthError::InvalidAuthCode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
