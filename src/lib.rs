//! Umbrella crate for the scrobble-sync workspace.
//!
//! With the default `desktop-shims` feature it re-exports the
//! [`core_service`] facade, wired to the reqwest and tokio::fs adapters.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
