//! # Application Configuration
//!
//! Provides configuration management for the sync workspace.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an `AppConfig`
//! instance that holds the injected bridges, API credentials, and tuning
//! settings for a sync run. It fails fast when a required bridge is missing.
//!
//! ## Bridges (with desktop defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `FileSystemAccess` - Job/token file persistence (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AppConfig, ApiCredentials, SyncSettings};
//! use std::time::Duration;
//!
//! let config = AppConfig::builder()
//!     .credentials(ApiCredentials::from_env())
//!     .sync_settings(SyncSettings::default().with_batch_pause(Duration::from_millis(500)))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "scrobble-sync";
/// Persisted job collection.
pub const JOB_FILE_NAME: &str = "job_status.json";
/// Persisted OAuth tokens.
pub const TOKEN_FILE_NAME: &str = "spotify_tokens.json";
/// Loopback redirect registered with the Spotify application.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8000/callback";

pub const ENV_LASTFM_API_KEY: &str = "LASTFM_API_KEY";
pub const ENV_SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_SPOTIFY_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";

/// Credentials for both catalogs.
///
/// Each command needs a different subset, so values are optional here and
/// checked with the `require_*` accessors at the point of use.
///
/// # Security Note
///
/// API keys are never hardcoded. They are loaded from the environment and
/// the `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub lastfm_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    /// Only needed for confidential-client token requests; PKCE works without it
    pub spotify_client_secret: Option<String>,
    pub spotify_redirect_uri: String,
}

impl Default for ApiCredentials {
    fn default() -> Self {
        Self {
            lastfm_api_key: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ApiCredentials")
            .field("lastfm_api_key", &redacted(&self.lastfm_api_key))
            .field("spotify_client_id", &self.spotify_client_id)
            .field(
                "spotify_client_secret",
                &redacted(&self.spotify_client_secret),
            )
            .field("spotify_redirect_uri", &self.spotify_redirect_uri)
            .finish()
    }
}

impl ApiCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `LASTFM_API_KEY`, `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and
    /// `SPOTIFY_REDIRECT_URI` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiCredentials::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            lastfm_api_key: read(ENV_LASTFM_API_KEY),
            spotify_client_id: read(ENV_SPOTIFY_CLIENT_ID),
            spotify_client_secret: read(ENV_SPOTIFY_CLIENT_SECRET),
            spotify_redirect_uri: read(ENV_SPOTIFY_REDIRECT_URI)
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        }
    }

    pub fn with_lastfm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.lastfm_api_key = Some(api_key.into());
        self
    }

    pub fn with_spotify_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.spotify_client_id = Some(client_id.into());
        self
    }

    pub fn with_spotify_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.spotify_client_secret = Some(secret.into());
        self
    }

    pub fn with_spotify_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.spotify_redirect_uri = uri.into();
        self
    }

    /// Last.fm API key or an actionable configuration error.
    pub fn require_lastfm_api_key(&self) -> Result<&str> {
        self.lastfm_api_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Last.fm API key is missing. Set {} (create one at https://www.last.fm/api/account/create).",
                ENV_LASTFM_API_KEY
            ))
        })
    }

    /// Spotify client id or an actionable configuration error.
    pub fn require_spotify_client_id(&self) -> Result<&str> {
        self.spotify_client_id.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Spotify client id is missing. Set {} (and optionally {}) from https://developer.spotify.com/dashboard.",
                ENV_SPOTIFY_CLIENT_ID, ENV_SPOTIFY_CLIENT_SECRET
            ))
        })
    }

    /// Validates formats of whatever is present.
    pub fn validate(&self) -> Result<()> {
        let redirect = url::Url::parse(&self.spotify_redirect_uri).map_err(|e| {
            Error::Config(format!(
                "Invalid Spotify redirect URI '{}': {}",
                self.spotify_redirect_uri, e
            ))
        })?;

        if !matches!(redirect.scheme(), "http" | "https") {
            return Err(Error::Config(
                "Spotify redirect URI must use http or https".to_string(),
            ));
        }

        if let Some(key) = &self.lastfm_api_key {
            if key.chars().any(char::is_whitespace) {
                return Err(Error::Config(
                    "Last.fm API key must not contain whitespace".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Tuning knobs for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Delay between source page requests
    pub source_throttle: Duration,
    /// Pause between playlist add batches
    pub batch_pause: Duration,
    /// Tracks per add call (API ceiling: 100)
    pub batch_size: usize,
    /// Playlist size ceiling (API ceiling: 10,000)
    pub max_playlist_tracks: usize,
    /// Interval of `watch` snapshots
    pub job_poll_interval: Duration,
    /// Age after which finished jobs are cleaned up
    pub job_retention_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            source_throttle: Duration::from_millis(100),
            batch_pause: Duration::from_millis(1000),
            batch_size: 100,
            max_playlist_tracks: 10_000,
            job_poll_interval: Duration::from_secs(1),
            job_retention_days: 30,
        }
    }
}

impl SyncSettings {
    pub fn with_source_throttle(mut self, delay: Duration) -> Self {
        self.source_throttle = delay;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_playlist_tracks(mut self, max: usize) -> Self {
        self.max_playlist_tracks = max;
        self
    }

    pub fn with_job_poll_interval(mut self, interval: Duration) -> Self {
        self.job_poll_interval = interval;
        self
    }

    pub fn with_job_retention_days(mut self, days: u32) -> Self {
        self.job_retention_days = days;
        self
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        let throttle_ms = self.source_throttle.as_millis();
        if throttle_ms == 0 {
            return Err(Error::Config(
                "Source throttle must be greater than 0ms".to_string(),
            ));
        }

        if throttle_ms > 60_000 {
            return Err(Error::Config(
                "Source throttle exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.batch_pause.as_millis() > 60_000 {
            return Err(Error::Config(
                "Batch pause exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if !(1..=100).contains(&self.batch_size) {
            return Err(Error::Config(
                "Batch size must be between 1 and 100".to_string(),
            ));
        }

        if !(1..=10_000).contains(&self.max_playlist_tracks) {
            return Err(Error::Config(
                "Max playlist tracks must be between 1 and 10,000".to_string(),
            ));
        }

        if self.job_poll_interval.is_zero() {
            return Err(Error::Config(
                "Job poll interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Application configuration.
///
/// Use [`AppConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct AppConfig {
    pub credentials: ApiCredentials,
    pub sync: SyncSettings,
    /// Directory holding the job and token files
    pub data_dir: PathBuf,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("credentials", &self.credentials)
            .field("sync", &self.sync)
            .field("data_dir", &self.data_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .finish()
    }
}

impl AppConfig {
    /// Creates a new builder for constructing an `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// `<data dir>/job_status.json`
    pub fn job_file_path(&self) -> PathBuf {
        self.data_dir.join(JOB_FILE_NAME)
    }

    /// `<data dir>/spotify_tokens.json`
    pub fn token_file_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE_NAME)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        self.credentials.validate()?;
        self.sync.validate()
    }
}

/// `<platform data dir>/scrobble-sync`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for catalog requests. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Tests: inject a mock client."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::with_data_directory(
        data_dir.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for job and token persistence. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Tests: inject an in-memory implementation."
            .to_string(),
    })
}

/// Builder for constructing [`AppConfig`] instances.
#[derive(Default)]
pub struct AppConfigBuilder {
    credentials: Option<ApiCredentials>,
    sync: Option<SyncSettings>,
    data_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
}

impl AppConfigBuilder {
    pub fn credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Overrides the platform data directory.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Builds the final `AppConfig` instance.
    ///
    /// # Errors
    ///
    /// - A bridge is missing and no desktop default is available
    /// - Settings or credentials fail validation
    pub fn build(self) -> Result<AppConfig> {
        let data_dir = self.data_dir.unwrap_or_else(default_data_dir);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&data_dir)?,
        };

        let config = AppConfig {
            credentials: self.credentials.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
            data_dir,
            http_client,
            file_system,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::path::Path;

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        }
    }

    struct NoopFileSystem;

    #[async_trait]
    impl FileSystemAccess for NoopFileSystem {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
            Err(bridge_traits::BridgeError::NotFound(path.display().to_string()))
        }

        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }

        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn builder() -> AppConfigBuilder {
        AppConfig::builder()
            .data_dir("/data")
            .http_client(Arc::new(NoopHttpClient))
            .file_system(Arc::new(NoopFileSystem))
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_with_injected_bridges() {
        let config = builder().build().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.job_file_path(), PathBuf::from("/data/job_status.json"));
        assert_eq!(
            config.token_file_path(),
            PathBuf::from("/data/spotify_tokens.json")
        );
        assert_eq!(config.sync, SyncSettings::default());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = AppConfig::builder()
            .file_system(Arc::new(NoopFileSystem))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("HttpClient"));
    }

    #[test]
    fn test_default_sync_settings() {
        let settings = SyncSettings::default();

        assert_eq!(settings.source_throttle, Duration::from_millis(100));
        assert_eq!(settings.batch_pause, Duration::from_secs(1));
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.max_playlist_tracks, 10_000);
        assert_eq!(settings.job_retention_days, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_batch() {
        let result = builder()
            .sync_settings(SyncSettings::default().with_batch_size(101))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Batch size must be between 1 and 100"));
    }

    #[test]
    fn test_validate_rejects_zero_throttle() {
        let settings = SyncSettings::default().with_source_throttle(Duration::ZERO);
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("greater than 0ms"));
    }

    #[test]
    fn test_validate_rejects_excessive_playlist_ceiling() {
        let settings = SyncSettings::default().with_max_playlist_tracks(20_000);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_credentials_from_lookup() {
        let credentials = ApiCredentials::from_lookup(env(&[
            (ENV_LASTFM_API_KEY, " abc123 "),
            (ENV_SPOTIFY_CLIENT_ID, "client"),
            (ENV_SPOTIFY_CLIENT_SECRET, ""),
        ]));

        assert_eq!(credentials.lastfm_api_key.as_deref(), Some("abc123"));
        assert_eq!(credentials.spotify_client_id.as_deref(), Some("client"));
        assert_eq!(credentials.spotify_client_secret, None);
        assert_eq!(credentials.spotify_redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_missing_credentials_are_actionable() {
        let credentials = ApiCredentials::from_lookup(env(&[]));

        let err = credentials.require_lastfm_api_key().unwrap_err().to_string();
        assert!(err.contains(ENV_LASTFM_API_KEY));

        let err = credentials
            .require_spotify_client_id()
            .unwrap_err()
            .to_string();
        assert!(err.contains(ENV_SPOTIFY_CLIENT_ID));
    }

    #[test]
    fn test_invalid_redirect_uri_rejected() {
        let result = builder()
            .credentials(ApiCredentials::new().with_spotify_redirect_uri("not a url"))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid Spotify redirect URI"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = ApiCredentials::new()
            .with_lastfm_api_key("lfm-key-value")
            .with_spotify_client_secret("spotify-secret-value");

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("lfm-key-value"));
        assert!(!debug.contains("spotify-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_data_dir_is_app_scoped() {
        assert!(default_data_dir().ends_with(APP_DIR_NAME));
    }
}
