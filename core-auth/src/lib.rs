//! # Authentication Module
//!
//! Credential handling for the destination (Spotify) account.
//!
//! ## Overview
//!
//! - OAuth 2.0 authorization code flow with PKCE and forced consent dialog
//! - Pure expiry check ([`needs_refresh`]) and [`OAuthFlowManager::ensure_fresh`],
//!   called once before each conversion run
//! - JSON token file persisted through the filesystem bridge
//!
//! Tokens are plain values passed into each run; nothing here refreshes
//! credentials behind the caller's back.

pub mod error;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{parse_callback, AuthCallback, OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use token_store::TokenStore;
pub use types::{needs_refresh, OAuthTokens, REFRESH_MARGIN_SECS};
