//! # Conversion Pipeline
//!
//! Turns a slice of listening history into a destination playlist.
//!
//! ## Workflow
//!
//! 1. Fetch up to `limit` records from the source catalog (0-20 %)
//! 2. Search the destination for each record, structured query first and the
//!    fuzzy query only when the first returns nothing, then pick the best
//!    candidate (20-90 %)
//! 3. Create or append to the playlist (90-100 %)
//!
//! Records are processed one at a time. A failed search leaves that record
//! unmatched and the run continues, except for `Unauthorized`, which aborts
//! the run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ConversionPipeline, ConversionRequest};
//! use bridge_traits::catalog::{ListeningMode, SourceQuery, TimePeriod};
//!
//! let pipeline = ConversionPipeline::new(lastfm, spotify);
//! let request = ConversionRequest::new(
//!     SourceQuery::new("rj", ListeningMode::Top).with_period(TimePeriod::ThreeMonths),
//!     100,
//! );
//! let result = pipeline.run(&request).await?;
//! println!("{} ({:.1}% matched)", result.playlist.url, result.match_rate);
//! ```

use crate::job::{JobId, JobUpdate};
use crate::matcher::{best_match, MatchStats, TrackMatch};
use crate::tracker::JobTracker;
use crate::writer::{PlaylistWriter, WriteOutcome, WriterConfig};
use crate::{Result, SyncError};
use bridge_traits::catalog::{
    ListeningMode, NewPlaylist, PlaylistRef, SourceCatalog, SourceQuery, SourceRecord,
    TargetCatalog, TimePeriod,
};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const FETCH_DONE_PERCENT: u8 = 20;
const SEARCH_DONE_PERCENT: u8 = 90;

/// Search progress is reported every this many records.
const PROGRESS_EVERY: usize = 10;

/// Where matched tracks go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistTarget {
    /// Create a new playlist
    New,
    /// Append to the user's playlist with this exact name
    Existing(String),
}

/// Parameters of one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub query: SourceQuery,
    pub limit: usize,
    /// Defaults to a name derived from the source profile
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub target: PlaylistTarget,
}

impl ConversionRequest {
    pub fn new(query: SourceQuery, limit: usize) -> Self {
        Self {
            query,
            limit,
            name: None,
            description: None,
            is_public: true,
            target: PlaylistTarget::New,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn append_to(mut self, playlist_name: impl Into<String>) -> Self {
        self.target = PlaylistTarget::Existing(playlist_name.into());
        self
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub playlist: PlaylistRef,
    pub total_source_records: usize,
    pub matched_count: usize,
    pub added_count: usize,
    pub unmatched: Vec<SourceRecord>,
    /// 0-100
    pub match_rate: f64,
    #[serde(default)]
    pub skipped_duplicates: usize,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub match_stats: MatchStats,
    pub created_at: DateTime<Utc>,
}

/// `matched / total * 100`, or 0 when there is nothing to match.
pub fn match_rate(matched: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (matched as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Default playlist name for a listening list of `display`.
pub fn default_playlist_name(display: &str, mode: ListeningMode, period: TimePeriod) -> String {
    match mode {
        ListeningMode::Top => format!("{}'s Top Tracks ({})", display, period.label()),
        ListeningMode::Recent => format!("{}'s Recent Tracks", display),
        ListeningMode::Loved => format!("{}'s Loved Tracks", display),
    }
}

pub fn default_description(username: &str, mode: ListeningMode, period: TimePeriod) -> String {
    match mode {
        ListeningMode::Top => format!(
            "Top tracks from Last.fm user {} for period: {}",
            username,
            period.as_str()
        ),
        ListeningMode::Recent => format!("Recent tracks from Last.fm user {}", username),
        ListeningMode::Loved => format!("Loved tracks from Last.fm user {}", username),
    }
}

/// Linear position of `done` out of `total` between `from` and `to` percent.
fn interpolate(from: u8, to: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return to;
    }
    let span = f64::from(to - from);
    from + (span * done as f64 / total as f64).round().min(span) as u8
}

/// Reports to a tracked job, or nowhere.
struct Progress<'a> {
    job: Option<(&'a JobTracker, &'a JobId)>,
}

impl Progress<'_> {
    async fn report(&self, percent: u8, message: impl Into<String>) {
        if let Some((tracker, job_id)) = self.job {
            if let Err(e) = tracker
                .update(job_id, JobUpdate::running(percent, message))
                .await
            {
                warn!(job_id = %job_id, error = %e, "Failed to record job progress");
            }
        }
    }
}

pub struct ConversionPipeline {
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetCatalog>,
    writer: PlaylistWriter,
    clock: Arc<dyn Clock>,
}

impl ConversionPipeline {
    pub fn new(source: Arc<dyn SourceCatalog>, target: Arc<dyn TargetCatalog>) -> Self {
        Self {
            writer: PlaylistWriter::new(Arc::clone(&target)),
            source,
            target,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_writer_config(mut self, config: WriterConfig) -> Self {
        self.writer = PlaylistWriter::with_config(Arc::clone(&self.target), config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Normalized records that a run with the same query would import.
    /// Nothing is sent to the destination.
    #[instrument(skip(self, query), fields(username = %query.username, mode = %query.mode))]
    pub async fn preview(&self, query: &SourceQuery, limit: usize) -> Result<Vec<SourceRecord>> {
        Ok(self.source.fetch(query, limit).await?)
    }

    /// Run a conversion without job tracking.
    pub async fn run(&self, request: &ConversionRequest) -> Result<ConversionResult> {
        self.execute(request, &Progress { job: None }).await
    }

    /// Run a conversion and record it on `job_id`: running at start, then
    /// progress checkpoints, then completed or failed.
    #[instrument(skip(self, tracker, job_id, request), fields(job_id = %job_id))]
    pub async fn run_job(
        &self,
        tracker: &JobTracker,
        job_id: &JobId,
        request: &ConversionRequest,
    ) -> Result<ConversionResult> {
        tracker
            .update(job_id, JobUpdate::running(0, "Fetching tracks from Last.fm..."))
            .await?;

        let progress = Progress {
            job: Some((tracker, job_id)),
        };
        match self.execute(request, &progress).await {
            Ok(result) => {
                tracker
                    .update(job_id, JobUpdate::completed(result.clone()))
                    .await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(update_err) = tracker.update(job_id, JobUpdate::failed(&e)).await {
                    warn!(error = %update_err, "Failed to record job failure");
                }
                Err(e)
            }
        }
    }

    #[instrument(
        skip(self, request, progress),
        fields(username = %request.query.username, mode = %request.query.mode, limit = request.limit)
    )]
    async fn execute(
        &self,
        request: &ConversionRequest,
        progress: &Progress<'_>,
    ) -> Result<ConversionResult> {
        let query = &request.query;

        info!("Phase 1: Fetching source tracks");
        let records = self.source.fetch(query, request.limit).await?;
        if records.is_empty() {
            return Err(SyncError::NotFound(format!(
                "No {} tracks found for Last.fm user '{}'",
                query.mode, query.username
            )));
        }
        let total = records.len();
        info!(total, "Fetched source tracks");
        progress
            .report(FETCH_DONE_PERCENT, format!("Fetched {} tracks", total))
            .await;

        info!("Phase 2: Matching tracks");
        let mut matched: Vec<TrackMatch> = Vec::new();
        let mut unmatched: Vec<SourceRecord> = Vec::new();
        let mut stats = MatchStats::default();

        for (index, record) in records.iter().enumerate() {
            match self.match_record(record).await {
                Ok(Some(found)) => {
                    debug!(
                        artist = %record.artist,
                        title = %record.title,
                        tier = %found.tier,
                        uri = %found.candidate.uri,
                        "Matched"
                    );
                    stats.record(found.tier);
                    matched.push(found);
                }
                Ok(None) => {
                    debug!(artist = %record.artist, title = %record.title, "No match");
                    unmatched.push(record.clone());
                }
                Err(e) if e.requires_reauth() => return Err(e),
                Err(e) => {
                    warn!(
                        artist = %record.artist,
                        title = %record.title,
                        error = %e,
                        "Search failed, leaving track unmatched"
                    );
                    unmatched.push(record.clone());
                }
            }

            let done = index + 1;
            if done % PROGRESS_EVERY == 0 && done < total {
                let percent = interpolate(FETCH_DONE_PERCENT, SEARCH_DONE_PERCENT, done, total);
                progress
                    .report(percent, format!("Searched {} of {} tracks", done, total))
                    .await;
            }
        }

        let matched_count = matched.len();
        let rate = match_rate(matched_count, total);
        info!(
            matched = matched_count,
            unmatched = unmatched.len(),
            exact = stats.exact,
            similar = stats.similar,
            fallback = stats.fallback,
            match_rate = rate,
            "Match results"
        );
        if matched.is_empty() {
            return Err(SyncError::NoMatches { total });
        }

        info!("Phase 3: Writing playlist");
        progress
            .report(
                SEARCH_DONE_PERCENT,
                format!("Adding {} tracks to playlist...", matched_count),
            )
            .await;

        let uris: Vec<String> = matched.into_iter().map(|m| m.candidate.uri).collect();
        let outcome = self.write(request, &uris).await?;

        if outcome.truncated {
            warn!(added = outcome.added, "Playlist was capped at the track ceiling");
        }

        Ok(ConversionResult {
            playlist: outcome.playlist,
            total_source_records: total,
            matched_count,
            added_count: outcome.added,
            unmatched,
            match_rate: rate,
            skipped_duplicates: outcome.skipped_duplicates,
            truncated: outcome.truncated,
            match_stats: stats,
            created_at: self.clock.now(),
        })
    }

    /// Structured search, fuzzy search only if that found nothing, then pick.
    async fn match_record(&self, record: &SourceRecord) -> Result<Option<TrackMatch>> {
        if record.artist.is_empty() && record.title.is_empty() {
            return Ok(None);
        }

        let mut candidates = self.target.search(&record.artist, &record.title).await?;
        if candidates.is_empty() {
            candidates = self
                .target
                .search_fuzzy(&record.artist, &record.title)
                .await?;
        }
        Ok(best_match(record, &candidates))
    }

    async fn write(&self, request: &ConversionRequest, uris: &[String]) -> Result<WriteOutcome> {
        match &request.target {
            PlaylistTarget::Existing(name) => self.writer.append_to_existing(name, uris).await,
            PlaylistTarget::New => {
                let playlist = self.new_playlist(request).await;
                self.writer.create_and_fill(&playlist, uris).await
            }
        }
    }

    async fn new_playlist(&self, request: &ConversionRequest) -> NewPlaylist {
        let query = &request.query;

        let name = match &request.name {
            Some(name) => name.clone(),
            None => {
                let display = match self.source.user_info(&query.username).await {
                    Ok(user) => user.display_name().to_string(),
                    Err(e) => {
                        warn!(error = %e, "User lookup failed, naming playlist after the username");
                        query.username.clone()
                    }
                };
                default_playlist_name(&display, query.mode, query.period)
            }
        };

        let description = request
            .description
            .clone()
            .unwrap_or_else(|| default_description(&query.username, query.mode, query.period));

        NewPlaylist {
            name,
            description,
            is_public: request.is_public,
        }
    }
}
