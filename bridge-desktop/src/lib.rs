//! Desktop implementations of the bridge traits: a `reqwest` HTTP client and
//! `tokio::fs` file access.
//!
//! `core-runtime` picks these up as defaults when its `desktop-shims`
//! feature is on:
//!
//! ```ignore
//! let config = AppConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()))
//!     .file_system(Arc::new(TokioFileSystem::with_data_directory(dir)))
//!     .build()?;
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
