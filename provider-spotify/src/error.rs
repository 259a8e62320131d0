//! Error types for the Spotify provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// The access token is expired, revoked or lacks a scope
    #[error("Spotify rejected the access token: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Spotify resource not found: {0}")]
    NotFound(String),

    /// API request returned an error
    #[error("Spotify API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The request was never sent because it breaks an API limit
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for BridgeError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Unauthorized(msg) => BridgeError::Unauthorized(msg),
            SpotifyError::RateLimited {
                retry_after_seconds,
            } => BridgeError::RateLimited {
                retry_after_seconds,
            },
            SpotifyError::NotFound(what) => BridgeError::NotFound(what),
            SpotifyError::Api { status, message } => BridgeError::RemoteApi { status, message },
            SpotifyError::InvalidRequest(msg) => BridgeError::NotAvailable(msg),
            SpotifyError::Parse(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            SpotifyError::Network(msg) => {
                BridgeError::OperationFailed(format!("Network error: {}", msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpotifyError::Api {
            status: 403,
            message: "Insufficient client scope".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Spotify API error (status 403): Insufficient client scope"
        );
    }

    #[test]
    fn test_error_conversion_keeps_class() {
        let unauthorized: BridgeError = SpotifyError::Unauthorized("expired".into()).into();
        assert!(matches!(unauthorized, BridgeError::Unauthorized(_)));

        let limited: BridgeError = SpotifyError::RateLimited {
            retry_after_seconds: 5,
        }
        .into();
        assert!(limited.is_transient());

        let invalid: BridgeError = SpotifyError::InvalidRequest("too many".into()).into();
        assert!(!invalid.is_transient());
    }
}
