use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens are refreshed this many seconds before they actually expire.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on a server-reported token lifetime (ten years).
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 86_400;

/// OAuth 2.0 token set for the destination account.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug` implementation
/// redacts sensitive information.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::Utc;
///
/// let now = Utc::now();
/// let tokens = OAuthTokens::new_at("access".to_string(), Some("refresh".to_string()), 3600, now);
/// assert!(!core_auth::needs_refresh(&tokens, now));
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Create a token set that expires `expires_in` seconds after `now`.
    /// Negative or absurd lifetimes are clamped to `0..=10 years`.
    pub fn new_at(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now + Duration::seconds(expires_in.clamp(0, MAX_EXPIRES_IN_SECS)),
        }
    }

    /// Get the time remaining until token expiration
    ///
    /// Returns `None` if the token is already expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whether `tokens` must be refreshed before being used at `now`.
///
/// True once the access token is within [`REFRESH_MARGIN_SECS`] of expiry.
pub fn needs_refresh(tokens: &OAuthTokens, now: DateTime<Utc>) -> bool {
    now >= tokens.expires_at - Duration::seconds(REFRESH_MARGIN_SECS)
}
