//! Seams between the sync core and everything it talks to.
//!
//! - [`SourceCatalog`](catalog::SourceCatalog): listening history, read page by page
//! - [`TargetCatalog`](catalog::TargetCatalog): track search and playlist writes
//! - [`HttpClient`](http::HttpClient): one request per call, no retries
//! - [`FileSystemAccess`](storage::FileSystemAccess): the job and token files
//! - [`Clock`](time::Clock) and [`LoggerSink`](time::LoggerSink)
//!
//! Implementations report failures as [`BridgeError`] and keep the failure
//! class (`Unauthorized`, `NotFound`, `RateLimited`, `RemoteApi`) so the
//! pipeline can decide whether a run is worth repeating. All traits are
//! `Send + Sync`; a conversion run moves them into a spawned task.

pub mod catalog;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{
    CandidateMatch, ListeningMode, NewPlaylist, PlaylistRef, SourceCatalog, SourceQuery,
    SourceRecord, SourceUser, TargetCatalog, TargetUser, TimePeriod,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::FileSystemAccess;
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
