//! # Conversion Core
//!
//! Matches listening history against the destination catalog and writes the
//! result into playlists.
//!
//! ## Components
//!
//! - **Matcher** (`matcher`): tiered candidate selection (exact, similar, first result)
//! - **Playlist Writer** (`writer`): create or append, deduplicated, batched and capped
//! - **Conversion Pipeline** (`pipeline`): fetch → search → match → write, with progress
//! - **Job State Machine** (`job`): job lifecycle with validated transitions
//! - **Job Store** (`store`): in-memory and JSON-file persistence for jobs
//! - **Job Tracker** (`tracker`): create/update/get/list/cleanup/watch on top of a store

pub mod error;
pub mod job;
pub mod matcher;
pub mod pipeline;
pub mod store;
pub mod tracker;
pub mod writer;

pub use error::{Result, SyncError};
pub use job::{Job, JobId, JobStatus, JobUpdate};
pub use matcher::{best_match, MatchStats, MatchTier, TrackMatch};
pub use pipeline::{
    default_description, default_playlist_name, match_rate, ConversionPipeline,
    ConversionRequest, ConversionResult, PlaylistTarget,
};
pub use store::{InMemoryJobStore, JobStore, JsonFileJobStore};
pub use tracker::{JobTracker, DEFAULT_LIST_LIMIT, DEFAULT_RETENTION_DAYS, DEFAULT_WATCH_INTERVAL};
pub use writer::{PlaylistWriter, WriteOutcome, WriterConfig, MAX_PLAYLIST_TRACKS};
