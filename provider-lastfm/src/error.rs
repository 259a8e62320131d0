use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Last.fm error code for an unknown user.
pub const ERROR_USER_NOT_FOUND: i64 = 6;

#[derive(Error, Debug)]
pub enum LastFmError {
    #[error("Last.fm request failed: {0}")]
    Network(String),

    #[error("Last.fm returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Last.fm rate limit hit, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Last.fm API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Last.fm user not found: {0}")]
    UserNotFound(String),

    #[error("Failed to parse Last.fm response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, LastFmError>;

impl From<LastFmError> for BridgeError {
    fn from(error: LastFmError) -> Self {
        match error {
            LastFmError::UserNotFound(user) => {
                BridgeError::NotFound(format!("Last.fm user '{}'", user))
            }
            LastFmError::RateLimited { retry_after_seconds } => {
                BridgeError::RateLimited { retry_after_seconds }
            }
            LastFmError::Http { status, body } => BridgeError::RemoteApi {
                status,
                message: body,
            },
            other @ (LastFmError::Network(_) | LastFmError::Api { .. } | LastFmError::Parse(_)) => {
                BridgeError::OperationFailed(other.to_string())
            }
        }
    }
}
