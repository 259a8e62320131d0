//! Token File Storage
//!
//! Persists the destination-account tokens as a small JSON document
//! (`spotify_tokens.json` in the data directory) through the
//! [`FileSystemAccess`] bridge.
//!
//! ## Storage Format
//!
//! ```json
//! {
//!   "access_token": "...",
//!   "refresh_token": "...",
//!   "expires_at": 1714564800
//! }
//! ```
//!
//! `expires_at` is a Unix timestamp in seconds. Writes go through a
//! temporary file and a rename so a crash never leaves a half-written file.

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// On-disk representation of [`OAuthTokens`].
#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: i64,
}

/// JSON token file.
pub struct TokenStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl TokenStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "Initializing TokenStore");
        Self { fs, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `tokens`, replacing any previous file.
    pub async fn save(&self, tokens: &OAuthTokens) -> Result<()> {
        let stored = StoredTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.timestamp(),
        };

        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| AuthError::Storage(format!("token serialization: {}", e)))?;

        self.fs
            .write_file_atomic(&self.path, Bytes::from(json))
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to write token file");
                AuthError::Storage(e.to_string())
            })?;

        info!(
            has_refresh_token = stored.refresh_token.is_some(),
            expires_at = stored.expires_at,
            "Tokens saved"
        );

        Ok(())
    }

    /// Read the stored tokens.
    ///
    /// Returns `Ok(None)` when no file exists. A file that cannot be parsed
    /// is deleted and reported as [`AuthError::TokenCorrupted`].
    pub async fn load(&self) -> Result<Option<OAuthTokens>> {
        let exists = self
            .fs
            .exists(&self.path)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        if !exists {
            debug!("No token file found");
            return Ok(None);
        }

        let data = self
            .fs
            .read_file(&self.path)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let stored: StoredTokens = match serde_json::from_slice(&data) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to parse token file, it may be corrupted");

                if let Err(delete_err) = self.fs.delete_file(&self.path).await {
                    warn!(error = %delete_err, "Failed to delete corrupted token file");
                }

                return Err(AuthError::TokenCorrupted {
                    reason: e.to_string(),
                });
            }
        };

        let expires_at = Utc
            .timestamp_opt(stored.expires_at, 0)
            .single()
            .ok_or_else(|| AuthError::TokenCorrupted {
                reason: format!("invalid expires_at {}", stored.expires_at),
            })?;

        debug!(expires_at = stored.expires_at, "Tokens loaded");

        Ok(Some(OAuthTokens {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at,
        }))
    }

    /// Remove the token file. Succeeds when no file exists.
    pub async fn delete(&self) -> Result<()> {
        let exists = self
            .fs
            .exists(&self.path)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        if exists {
            self.fs
                .delete_file(&self.path)
                .await
                .map_err(|e| AuthError::Storage(e.to_string()))?;
            info!("Token file deleted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryFs {
        files: Mutex<HashMap<PathBuf, Bytes>>,
    }

    #[async_trait]
    impl FileSystemAccess for MemoryFs {
        async fn exists(&self, path: &Path) -> BridgeResult<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| BridgeError::NotFound(path.display().to_string()))
        }

        async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
            self.files.lock().unwrap().insert(path.to_path_buf(), data);
            Ok(())
        }

        async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
            let mut files = self.files.lock().unwrap();
            let data = files
                .remove(from)
                .ok_or_else(|| BridgeError::NotFound(from.display().to_string()))?;
            files.insert(to.to_path_buf(), data);
            Ok(())
        }

        async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }

    fn store(fs: Arc<MemoryFs>) -> TokenStore {
        TokenStore::new(fs, "/data/spotify_tokens.json")
    }

    #[tokio::test]
    async fn test_save_and_load_tokens() {
        let token_store = store(Arc::new(MemoryFs::default()));
        let tokens = OAuthTokens::new_at(
            "access_token_123".to_string(),
            Some("refresh_token_456".to_string()),
            3600,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );

        token_store.save(&tokens).await.unwrap();
        let loaded = token_store.load().await.unwrap().expect("tokens stored");

        assert_eq!(loaded, tokens);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let token_store = store(Arc::new(MemoryFs::default()));
        assert!(token_store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_file_is_removed() {
        let fs = Arc::new(MemoryFs::default());
        fs.write_file(Path::new("/data/spotify_tokens.json"), Bytes::from("{not json"))
            .await
            .unwrap();
        let token_store = store(fs.clone());

        let result = token_store.load().await;

        assert!(matches!(result, Err(AuthError::TokenCorrupted { .. })));
        assert!(!fs
            .exists(Path::new("/data/spotify_tokens.json"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let token_store = store(Arc::new(MemoryFs::default()));
        let tokens = OAuthTokens::new_at("a".into(), None, 60, Utc::now());

        token_store.save(&tokens).await.unwrap();
        token_store.delete().await.unwrap();
        token_store.delete().await.unwrap();

        assert!(token_store.load().await.unwrap().is_none());
    }
}
