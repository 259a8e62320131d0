//! # Last.fm Provider
//!
//! [`SourceCatalog`](bridge_traits::catalog::SourceCatalog) backed by the
//! Last.fm web API: top, recent and loved tracks plus the user profile.
//!
//! Payload quirks (string-or-object artists, string-or-number counts, single
//! objects in place of lists) are normalized in [`types`] and never leave
//! this crate.

pub mod client;
pub mod error;
pub mod types;

pub use client::{LastFmClient, DEFAULT_THROTTLE, LASTFM_API_BASE};
pub use error::{LastFmError, Result};
