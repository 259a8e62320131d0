//! # Spotify Provider
//!
//! [`TargetCatalog`](bridge_traits::catalog::TargetCatalog) backed by the
//! Spotify Web API: track search, playlist creation, playlist listing and
//! batched track appends.
//!
//! ## Search
//!
//! Two query styles are offered and the caller chooses between them:
//!
//! - structured `artist:{artist} track:{title}`, capped at 250 characters
//! - free text with `(feat. …)` / `[Remix]` qualifiers and punctuation removed
//!
//! Both ask for 10 track results.
//!
//! ## Errors
//!
//! HTTP 401 surfaces as `BridgeError::Unauthorized` so callers can ask for a
//! new login; 429 surfaces as `BridgeError::RateLimited`.

pub mod client;
pub mod error;
pub mod query;
pub mod types;

pub use client::{SpotifyClient, SEARCH_LIMIT, SPOTIFY_API_BASE};
pub use error::{Result, SpotifyError};
pub use query::{fuzzy_query, strip_punctuation, structured_query, MAX_QUERY_CHARS};
