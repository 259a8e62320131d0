//! Spotify authorization code flow with PKCE (RFC 7636).
//!
//! Login is two calls. [`OAuthFlowManager::build_auth_url`] returns the URL
//! to open plus a [`PkceVerifier`] the caller holds on to. Once the user
//! approves, the browser is redirected to `redirect_uri`; the caller passes
//! that URL to [`OAuthFlowManager::complete_login`] which checks `state`
//! and trades the code for tokens.
//!
//! Codes, verifiers and tokens never appear in log output.
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use std::sync::Arc;
//!
//! # async fn example(http_client: Arc<dyn bridge_traits::http::HttpClient>) -> core_auth::Result<()> {
//! let manager = OAuthFlowManager::new(
//!     OAuthConfig::spotify("client-id", None, "http://127.0.0.1:8000/callback"),
//!     http_client,
//! );
//! let (url, verifier) = manager.build_auth_url()?;
//! println!("open {url}");
//! # let redirected = String::new();
//! let tokens = manager.complete_login(&redirected, &verifier).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{needs_refresh, OAuthTokens};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Profile read plus playlist writes, public and private.
pub const SPOTIFY_SCOPES: [&str; 3] = [
    "user-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
];

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Confidential clients send it with every token request; PKCE-only
    /// clients leave it out.
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Always show the consent screen, even for a returning user.
    pub show_dialog: bool,
}

impl OAuthConfig {
    pub fn spotify(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            scopes: SPOTIFY_SCOPES.iter().map(ToString::to_string).collect(),
            auth_url: SPOTIFY_AUTH_URL.into(),
            token_url: SPOTIFY_TOKEN_URL.into(),
            show_dialog: true,
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = self.client_secret.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// Per-login secret pair. `verifier` stays on this side until the code
/// exchange; only its S256 challenge goes into the authorization URL.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes for the verifier (43 chars encoded) and 16 for state.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let verifier: [u8; 32] = rng.gen();
        let state: [u8; 16] = rng.gen();
        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier),
            state: URL_SAFE_NO_PAD.encode(state),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// `BASE64URL(SHA256(verifier))`, unpadded.
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes()))
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// `code` and `state` read off the redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCallback {
    pub code: String,
    pub state: String,
}

/// Read the redirect URL the user pasted back. A denied consent comes back
/// as `?error=access_denied` and maps to [`AuthError::AuthenticationFailed`].
pub fn parse_callback(callback_url: &str) -> Result<AuthCallback> {
    let raw = callback_url.trim();
    let url = Url::parse(raw).map_err(|e| AuthError::InvalidCallback(format!("{raw}: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => {
                return Err(AuthError::AuthenticationFailed {
                    reason: value.into_owned(),
                })
            }
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(AuthCallback { code, state }),
        (None, _) => Err(AuthError::InvalidCallback("no 'code' in redirect URL".into())),
        (_, None) => Err(AuthError::InvalidCallback("no 'state' in redirect URL".into())),
    }
}

/// Body of a successful token endpoint response. `token_type` and `scope`
/// are ignored.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN
}

/// Talks to the Spotify accounts service. Holds no tokens itself; callers
/// keep them in a [`crate::TokenStore`].
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    /// Clock used to turn `expires_in` into an absolute expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Authorization URL for a fresh [`PkceVerifier`].
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid authorization endpoint: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", verifier.state())
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &verifier.challenge());
        if self.config.show_dialog {
            url.query_pairs_mut().append_pair("show_dialog", "true");
        }

        debug!("Authorization URL ready");
        Ok((url.into(), verifier))
    }

    /// Trade an authorization code for tokens. `state` must be the one
    /// issued with `verifier`; a mismatch fails without contacting Spotify.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        if state != verifier.state() {
            warn!("Redirect state does not match this login attempt");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        let granted = self
            .request_tokens(&form, |status, body| {
                AuthError::InvalidAuthCode(format!("HTTP {status}: {body}"))
            })
            .await?;

        info!(
            expires_in = granted.expires_in,
            has_refresh_token = granted.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(OAuthTokens::new_at(
            granted.access_token,
            granted.refresh_token,
            granted.expires_in,
            self.clock.now(),
        ))
    }

    /// [`parse_callback`] followed by [`Self::exchange_code`].
    pub async fn complete_login(
        &self,
        callback_url: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        let AuthCallback { code, state } = parse_callback(callback_url)?;
        let tokens = self.exchange_code(&code, &state, verifier).await?;
        self.emit(AuthEvent::SignedIn { user_id: None });
        Ok(tokens)
    }

    /// One refresh attempt. Spotify may leave out `refresh_token`; the old
    /// one then stays valid and is carried over.
    ///
    /// A 4xx answer means the refresh token is dead
    /// ([`AuthError::TokenRefreshFailed`]); anything else is reported as
    /// [`AuthError::NetworkError`].
    #[instrument(skip_all)]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let granted = self
            .request_tokens(&form, |status, body| {
                let message = format!("HTTP {status}: {body}");
                if (400..500).contains(&status) {
                    AuthError::TokenRefreshFailed(message)
                } else {
                    AuthError::NetworkError(message)
                }
            })
            .await?;

        info!(expires_in = granted.expires_in, "Access token refreshed");
        Ok(OAuthTokens::new_at(
            granted.access_token,
            granted.refresh_token.or_else(|| Some(refresh_token.to_string())),
            granted.expires_in,
            self.clock.now(),
        ))
    }

    /// `tokens` as-is while they are fresh at `now`, refreshed otherwise.
    /// The caller saves the result if it changed.
    pub async fn ensure_fresh(&self, tokens: OAuthTokens, now: DateTime<Utc>) -> Result<OAuthTokens> {
        if !needs_refresh(&tokens, now) {
            debug!(expires_at = %tokens.expires_at, "Access token still valid");
            return Ok(tokens);
        }

        let refresh_token = match tokens.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!("Access token expired and there is no refresh token");
                self.emit(AuthEvent::AuthError {
                    message: "No refresh token stored".to_string(),
                    recoverable: false,
                });
                return Err(AuthError::NotAuthenticated);
            }
        };

        let outcome = self.refresh_access_token(refresh_token).await;
        self.emit(match &outcome {
            Ok(refreshed) => AuthEvent::TokenRefreshed {
                expires_at: refreshed.expires_at.timestamp(),
            },
            Err(e) => AuthEvent::AuthError {
                message: e.to_string(),
                recoverable: !e.requires_reauth(),
            },
        });
        outcome
    }

    /// POST a form to the token endpoint. Client credentials are appended
    /// here; `rejected` classifies a non-2xx answer.
    async fn request_tokens(
        &self,
        form: &[(&str, &str)],
        rejected: impl FnOnce(u16, String) -> AuthError,
    ) -> Result<TokenResponse> {
        let mut fields = form.to_vec();
        fields.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            fields.push(("client_secret", secret));
        }
        let body = serde_urlencoded::to_string(&fields)
            .map_err(|e| AuthError::Other(format!("Cannot encode token request: {e}")))?;

        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let detail = response.text().unwrap_or_default();
            warn!(status = response.status, "Token endpoint refused the request");
            return Err(rejected(response.status, detail));
        }

        response
            .json()
            .map_err(|e| AuthError::Other(format!("Malformed token response: {e}")))
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}
