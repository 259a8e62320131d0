//! Last.fm API Client
//!
//! Read-only access to a user's listening history.
//!
//! ## API Endpoints
//!
//! All calls are `GET https://ws.audioscrobbler.com/2.0/?method={method}&api_key={key}&format=json`:
//!
//! - `user.gettoptracks` (`period`, `limit`, `page`)
//! - `user.getrecenttracks` (`limit`, `page`, optional `from`)
//! - `user.getlovedtracks` (`limit`, `page`)
//! - `user.getinfo`
//!
//! ## Rate Limiting
//!
//! Consecutive requests are spaced by a fixed delay (100 ms by default).
//! Failures are returned as-is; the caller decides whether to retry.

use crate::error::{LastFmError, Result, ERROR_USER_NOT_FOUND};
use crate::types::{ErrorResponse, TrackPage, UserInfoResponse};
use async_trait::async_trait;
use bridge_traits::catalog::{
    ListeningMode, SourceCatalog, SourceQuery, SourceRecord, SourceUser,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Last.fm API base URL
pub const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

/// Default spacing between requests
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Last.fm API client
pub struct LastFmClient {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Simple rate limiter to enforce delay between requests
struct RateLimiter {
    last_request: Option<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(min_delay: Duration) -> Self {
        Self {
            last_request: None,
            min_delay,
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl LastFmClient {
    /// Creates a new Last.fm API client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client for making requests
    /// * `api_key` - Last.fm API key
    /// * `throttle` - Minimum delay between requests
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        throttle: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: LASTFM_API_BASE.to_string(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(throttle))),
        }
    }

    /// Point the client at another endpoint (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}?method={}&api_key={}&format=json",
            self.base_url,
            method,
            urlencoding::encode(&self.api_key)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// Issue one throttled GET and classify the response.
    async fn get(
        &self,
        method: &str,
        params: &[(&str, String)],
        username: &str,
    ) -> Result<HttpResponse> {
        let url = self.method_url(method, params);

        self.rate_limiter.lock().await.wait_if_needed().await;

        let request =
            HttpRequest::new(HttpMethod::Get, url).header("Accept", "application/json");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| LastFmError::Network(e.to_string()))?;

        // Error payloads come back with both 2xx and 4xx statuses.
        if let Ok(error_resp) = serde_json::from_slice::<ErrorResponse>(&response.body) {
            if error_resp.error == ERROR_USER_NOT_FOUND {
                debug!(method, "Last.fm user not found");
                return Err(LastFmError::UserNotFound(username.to_string()));
            }
            warn!(
                method,
                code = error_resp.error,
                message = %error_resp.message,
                "Last.fm API error"
            );
            return Err(LastFmError::Api {
                code: error_resp.error,
                message: error_resp.message,
            });
        }

        if !response.is_success() {
            if response.status == 429 {
                return Err(LastFmError::RateLimited {
                    retry_after_seconds: response.retry_after_seconds().unwrap_or(60),
                });
            }

            return Err(LastFmError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        Ok(response)
    }

    /// One page of the requested listening list.
    #[instrument(skip(self, query), fields(user = %query.username, mode = %query.mode))]
    pub async fn track_page(
        &self,
        query: &SourceQuery,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<SourceRecord>> {
        let mut params = vec![
            ("user", query.username.clone()),
            ("limit", page_size.to_string()),
            ("page", page.to_string()),
        ];

        let method = match query.mode {
            ListeningMode::Top => {
                params.push(("period", query.period.as_str().to_string()));
                "user.gettoptracks"
            }
            ListeningMode::Recent => {
                if let Some(from) = query.from {
                    params.push(("from", from.to_string()));
                }
                "user.getrecenttracks"
            }
            ListeningMode::Loved => "user.getlovedtracks",
        };

        let response = self.get(method, &params, &query.username).await?;
        let track_page: TrackPage = serde_json::from_slice(&response.body)
            .map_err(|e| LastFmError::Parse(format!("{}: {}", method, e)))?;

        let records = track_page.into_records();
        debug!(count = records.len(), "Fetched Last.fm page");
        Ok(records)
    }

    /// `user.getinfo`
    #[instrument(skip(self))]
    pub async fn get_user_info(&self, username: &str) -> Result<SourceUser> {
        let response = self
            .get("user.getinfo", &[("user", username.to_string())], username)
            .await?;

        let info: UserInfoResponse = serde_json::from_slice(&response.body)
            .map_err(|e| LastFmError::Parse(format!("user.getinfo: {}", e)))?;

        let user = info.user.into_user(username);
        info!(
            user = %user.username,
            play_count = user.play_count,
            "Fetched Last.fm user info"
        );
        Ok(user)
    }
}

#[async_trait]
impl SourceCatalog for LastFmClient {
    async fn fetch_page(
        &self,
        query: &SourceQuery,
        page: u32,
        page_size: usize,
    ) -> BridgeResult<Vec<SourceRecord>> {
        Ok(self.track_page(query, page, page_size).await?)
    }

    async fn user_info(&self, username: &str) -> BridgeResult<SourceUser> {
        Ok(self.get_user_info(username).await?)
    }
}
