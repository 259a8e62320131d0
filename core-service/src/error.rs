use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] bridge_traits::error::BridgeError),
}

impl CoreError {
    /// The stored Spotify login is unusable and `login` has to run again.
    pub fn requires_reauth(&self) -> bool {
        match self {
            CoreError::Auth(e) => e.requires_reauth(),
            CoreError::Sync(e) => e.requires_reauth(),
            CoreError::Catalog(bridge_traits::error::BridgeError::Unauthorized(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
