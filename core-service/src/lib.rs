//! Service façade and bootstrap helpers.
//!
//! [`SyncService`] wires the configured bridges (HTTP, filesystem) into the
//! Last.fm reader, the Spotify client, the credential flow and the job
//! tracker. Front-ends (the CLI, or any long-running host) talk to this type
//! only. Desktop builds enable the `desktop-shims` feature so that
//! [`AppConfig::builder`] supplies `bridge-desktop` implementations.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::catalog::{SourceCatalog, SourceQuery, SourceRecord, SourceUser, TargetCatalog};
use bridge_traits::time::{Clock, SystemClock};
use core_auth::{
    needs_refresh, AuthError, OAuthConfig, OAuthFlowManager, OAuthTokens, PkceVerifier, TokenStore,
};
use core_runtime::config::AppConfig;
use core_runtime::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use core_sync::{
    ConversionPipeline, ConversionRequest, ConversionResult, Job, JobId, JobTracker, JobUpdate,
    JsonFileJobStore, SyncError, WriterConfig,
};
use futures::Stream;
use provider_lastfm::LastFmClient;
use provider_spotify::SpotifyClient;
use tracing::{error, info, instrument, warn};

/// Builds the destination catalog for one access token.
pub type TargetFactory = Arc<dyn Fn(&str) -> Arc<dyn TargetCatalog> + Send + Sync>;

/// Primary façade exposed to front-ends. Cheap to clone.
#[derive(Clone)]
pub struct SyncService {
    config: Arc<AppConfig>,
    source: Option<Arc<dyn SourceCatalog>>,
    target_factory: TargetFactory,
    oauth: Option<Arc<OAuthFlowManager>>,
    token_store: Arc<TokenStore>,
    tracker: Arc<JobTracker>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    /// Bootstrap the service from a validated configuration.
    ///
    /// Opens the job file and prepares the catalogs. Missing credentials are
    /// not an error here; the operations that need them report it.
    ///
    /// # Errors
    ///
    /// Returns `Sync(Storage)` when the job file exists but cannot be read.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = JsonFileJobStore::open(config.file_system.clone(), config.job_file_path())
            .await
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        let tracker = JobTracker::new(Arc::new(store))
            .with_clock(Arc::clone(&clock))
            .with_event_bus(event_bus.clone());

        let source: Option<Arc<dyn SourceCatalog>> =
            config.credentials.lastfm_api_key.as_ref().map(|api_key| {
                Arc::new(LastFmClient::new(
                    config.http_client.clone(),
                    api_key.clone(),
                    config.sync.source_throttle,
                )) as Arc<dyn SourceCatalog>
            });

        let oauth = config.credentials.spotify_client_id.as_ref().map(|client_id| {
            let oauth_config = OAuthConfig::spotify(
                client_id.clone(),
                config.credentials.spotify_client_secret.clone(),
                config.credentials.spotify_redirect_uri.clone(),
            );
            Arc::new(
                OAuthFlowManager::new(oauth_config, config.http_client.clone())
                    .with_clock(Arc::clone(&clock))
                    .with_event_bus(event_bus.clone()),
            )
        });

        let http = config.http_client.clone();
        let target_factory: TargetFactory = Arc::new(move |access_token: &str| {
            Arc::new(SpotifyClient::new(http.clone(), access_token)) as Arc<dyn TargetCatalog>
        });

        let token_store = TokenStore::new(config.file_system.clone(), config.token_file_path());

        info!(
            data_dir = %config.data_dir.display(),
            lastfm = source.is_some(),
            spotify = oauth.is_some(),
            "Sync service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            source,
            target_factory,
            oauth,
            token_store: Arc::new(token_store),
            tracker: Arc::new(tracker),
            event_bus,
            clock,
        })
    }

    /// Replace the listening-history catalog.
    pub fn with_source(mut self, source: Arc<dyn SourceCatalog>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace how the destination catalog is built from an access token.
    pub fn with_target_factory(mut self, factory: TargetFactory) -> Self {
        self.target_factory = factory;
        self
    }

    /// Replace the credential flow.
    pub fn with_oauth(mut self, oauth: OAuthFlowManager) -> Self {
        self.oauth = Some(Arc::new(oauth.with_event_bus(self.event_bus.clone())));
        self
    }

    /// Replace the job tracker. The tracker keeps whatever event bus it was
    /// built with.
    pub fn with_tracker(mut self, tracker: Arc<JobTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Clock used for token expiry checks and pipeline timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    // ------------------------------------------------------------------
    // Source account
    // ------------------------------------------------------------------

    /// Profile of a Last.fm account.
    pub async fn user_info(&self, username: &str) -> Result<SourceUser> {
        Ok(self.source()?.user_info(username).await?)
    }

    /// Normalized records a conversion of `query` would import. Spotify is
    /// not contacted.
    pub async fn preview(&self, query: &SourceQuery, limit: usize) -> Result<Vec<SourceRecord>> {
        Ok(self.source()?.fetch(query, limit).await?)
    }

    // ------------------------------------------------------------------
    // Spotify login
    // ------------------------------------------------------------------

    /// Authorization URL to open in a browser, plus the verifier that must
    /// be handed back to [`SyncService::finish_login`].
    pub fn begin_login(&self) -> Result<(String, PkceVerifier)> {
        Ok(self.oauth()?.build_auth_url()?)
    }

    /// Exchange the redirected URL for tokens and store them.
    #[instrument(skip_all)]
    pub async fn finish_login(
        &self,
        callback_url: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        let tokens = self.oauth()?.complete_login(callback_url, verifier).await?;
        self.token_store.save(&tokens).await?;
        info!("Spotify login stored");
        Ok(tokens)
    }

    /// Forget the stored Spotify login.
    pub async fn logout(&self) -> Result<()> {
        Ok(self.token_store.delete().await?)
    }

    /// Stored tokens, refreshed and re-saved when they are about to expire.
    ///
    /// # Errors
    ///
    /// - `Auth(NotAuthenticated)` when no login is stored, or the stored
    ///   access token expired without a refresh token
    /// - `Auth(TokenRefreshFailed)` when Spotify rejects the refresh token
    pub async fn access_token(&self) -> Result<OAuthTokens> {
        let stored = self
            .token_store
            .load()
            .await?
            .ok_or(AuthError::NotAuthenticated)?;

        let now = self.clock.now();
        if !needs_refresh(&stored, now) {
            return Ok(stored);
        }

        let fresh = self.oauth()?.ensure_fresh(stored.clone(), now).await?;

        if fresh != stored {
            self.token_store.save(&fresh).await?;
        }
        Ok(fresh)
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Run a conversion to completion in the caller's task. The run is
    /// recorded as a job like a background one.
    #[instrument(skip(self, request), fields(username = %request.query.username, mode = %request.query.mode))]
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult> {
        self.require_credentials()?;
        let job_id = self
            .tracker
            .create(&request.query.username, request.clone())
            .await?;
        self.run_tracked(&job_id, &request).await
    }

    /// Create a job for `request`, start it in the background and return
    /// its id immediately. Progress is observable through
    /// [`SyncService::job_status`] and [`SyncService::watch_job`].
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, request), fields(username = %request.query.username, mode = %request.query.mode))]
    pub async fn start_conversion(&self, request: ConversionRequest) -> Result<JobId> {
        self.require_credentials()?;
        let job_id = self
            .tracker
            .create(&request.query.username, request.clone())
            .await?;

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.run_tracked(&job_id, &request).await {
                error!(job_id = %job_id, error = %e, "Background conversion failed");
            }
        });

        Ok(job_id)
    }

    pub async fn job_status(&self, job_id: &JobId) -> Result<Job> {
        Ok(self.tracker.get(job_id).await?)
    }

    /// Most recent jobs of a Last.fm user, newest first.
    pub async fn recent_jobs(&self, username: &str, limit: usize) -> Result<Vec<Job>> {
        Ok(self.tracker.list_for_user(username, limit).await?)
    }

    /// Snapshots of a job at the configured poll interval, ending after the
    /// terminal one.
    pub fn watch_job(
        &self,
        job_id: JobId,
    ) -> impl Stream<Item = core_sync::Result<Job>> + Send + 'static {
        self.tracker.watch(job_id, self.config.sync.job_poll_interval)
    }

    /// Drop jobs older than the configured retention period.
    pub async fn cleanup_jobs(&self) -> Result<usize> {
        Ok(self
            .tracker
            .cleanup_older_than(self.config.sync.job_retention_days)
            .await?)
    }

    async fn run_tracked(
        &self,
        job_id: &JobId,
        request: &ConversionRequest,
    ) -> Result<ConversionResult> {
        let tokens = match self.access_token().await {
            Ok(tokens) => tokens,
            Err(e) => {
                let reason = credential_failure(&e);
                if let Err(update_err) = self.tracker.update(job_id, JobUpdate::failed(&reason)).await
                {
                    warn!(job_id = %job_id, error = %update_err, "Failed to record job failure");
                }
                return Err(e);
            }
        };

        let pipeline = ConversionPipeline::new(
            Arc::clone(self.source()?),
            (self.target_factory)(&tokens.access_token),
        )
        .with_writer_config(WriterConfig::from(&self.config.sync))
        .with_clock(Arc::clone(&self.clock));

        Ok(pipeline.run_job(&self.tracker, job_id, request).await?)
    }

    /// Both catalogs must be configured before a job is recorded.
    fn require_credentials(&self) -> Result<()> {
        self.source()?;
        self.oauth()?;
        Ok(())
    }

    fn source(&self) -> Result<&Arc<dyn SourceCatalog>> {
        match &self.source {
            Some(source) => Ok(source),
            None => {
                self.config.credentials.require_lastfm_api_key()?;
                Err(CoreError::InitializationFailed(
                    "Last.fm catalog not configured".to_string(),
                ))
            }
        }
    }

    fn oauth(&self) -> Result<&OAuthFlowManager> {
        match &self.oauth {
            Some(oauth) => Ok(oauth),
            None => {
                self.config.credentials.require_spotify_client_id()?;
                Err(CoreError::InitializationFailed(
                    "Spotify login not configured".to_string(),
                ))
            }
        }
    }
}

/// How a credential problem is recorded on the job it stopped.
fn credential_failure(error: &CoreError) -> SyncError {
    match error {
        CoreError::Auth(AuthError::NetworkError(msg)) => SyncError::Transient(msg.clone()),
        CoreError::Auth(AuthError::Storage(msg)) => SyncError::Storage(msg.clone()),
        CoreError::Runtime(config) => SyncError::InvalidRequest(config.to_string()),
        other => SyncError::Unauthorized(format!(
            "{}. Run the login command to authorize Spotify access",
            other
        )),
    }
}
