//! # Playlist Writer
//!
//! Materializes matched tracks into a destination playlist.
//!
//! - A new playlist is created once, empty, under the account returned by
//!   the profile lookup made right before creation.
//! - Appending targets the first of the user's playlists with the exact name.
//!   Tracks already in it are skipped.
//! - Duplicate URIs within the input are dropped, first occurrence wins.
//! - The playlist never grows past the track ceiling. Excess input is cut and
//!   the outcome is flagged `truncated`.
//! - URIs are added in batches of at most 100 with a pause between batches.
//!
//! A failing batch after creation yields [`SyncError::WriteFailed`]; the
//! partially filled playlist is kept.

use crate::{Result, SyncError};
use bridge_traits::catalog::{NewPlaylist, PlaylistRef, TargetCatalog, MAX_ADD_BATCH};
use core_runtime::config::SyncSettings;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Hard ceiling on tracks in one destination playlist.
pub const MAX_PLAYLIST_TRACKS: usize = 10_000;

pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// URIs per add call, capped at [`MAX_ADD_BATCH`]
    pub batch_size: usize,
    /// Pause between two add calls
    pub batch_pause: Duration,
    pub max_playlist_tracks: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_ADD_BATCH,
            batch_pause: DEFAULT_BATCH_PAUSE,
            max_playlist_tracks: MAX_PLAYLIST_TRACKS,
        }
    }
}

impl From<&SyncSettings> for WriterConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            batch_pause: settings.batch_pause,
            max_playlist_tracks: settings.max_playlist_tracks,
        }
    }
}

impl WriterConfig {
    fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_ADD_BATCH)
    }

    fn ceiling(&self) -> usize {
        self.max_playlist_tracks.min(MAX_PLAYLIST_TRACKS)
    }
}

/// What a write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub playlist: PlaylistRef,
    pub added: usize,
    /// URIs dropped because they were already present or repeated
    pub skipped_duplicates: usize,
    /// Input was cut to fit the ceiling
    pub truncated: bool,
    /// A new playlist was created (as opposed to appended to)
    pub created: bool,
}

pub struct PlaylistWriter {
    target: Arc<dyn TargetCatalog>,
    config: WriterConfig,
}

/// Drop URIs already in `seen` or repeated in `uris`; returns kept URIs and
/// the number dropped.
fn dedup(uris: &[String], seen: &mut HashSet<String>) -> (Vec<String>, usize) {
    let mut kept = Vec::with_capacity(uris.len());
    for uri in uris {
        if seen.insert(uri.clone()) {
            kept.push(uri.clone());
        }
    }
    let skipped = uris.len() - kept.len();
    (kept, skipped)
}

impl PlaylistWriter {
    pub fn new(target: Arc<dyn TargetCatalog>) -> Self {
        Self::with_config(target, WriterConfig::default())
    }

    pub fn with_config(target: Arc<dyn TargetCatalog>, config: WriterConfig) -> Self {
        Self { target, config }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Create `playlist` and fill it with `uris`.
    ///
    /// # Errors
    ///
    /// - `NoMatches` when `uris` is empty (nothing is created)
    /// - `Unauthorized` / `Transient` from the profile lookup or creation
    /// - `WriteFailed` when a batch fails after creation
    #[instrument(skip(self, playlist, uris), fields(name = %playlist.name, tracks = uris.len()))]
    pub async fn create_and_fill(
        &self,
        playlist: &NewPlaylist,
        uris: &[String],
    ) -> Result<WriteOutcome> {
        if uris.is_empty() {
            return Err(SyncError::NoMatches { total: 0 });
        }

        let (mut unique, skipped_duplicates) = dedup(uris, &mut HashSet::new());
        let truncated = self.cap(&mut unique, self.config.ceiling());

        let owner = self.target.current_user().await?;
        info!(owner = %owner.id, "Creating playlist");
        let created = self.target.create_playlist(&owner.id, playlist).await?;
        if created.owner_id != owner.id {
            warn!(
                expected = %owner.id,
                actual = %created.owner_id,
                "Created playlist reports a different owner"
            );
        }

        let added = self.add_in_batches(&created, &unique).await?;
        Ok(WriteOutcome {
            playlist: created,
            added,
            skipped_duplicates,
            truncated,
            created: true,
        })
    }

    /// Append `uris` to the user's playlist called `name`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the user has no playlist with that exact name
    /// - `WriteFailed` when a batch fails
    #[instrument(skip(self, uris), fields(tracks = uris.len()))]
    pub async fn append_to_existing(&self, name: &str, uris: &[String]) -> Result<WriteOutcome> {
        let playlist = self
            .target
            .find_playlist_by_name(name)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Playlist '{}' not found", name)))?;

        let existing = self.target.playlist_track_uris(&playlist.id).await?;
        let current_size = existing.len();
        let mut seen: HashSet<String> = existing.into_iter().collect();
        debug!(
            playlist_id = %playlist.id,
            current_size,
            distinct = seen.len(),
            "Loaded existing playlist tracks"
        );

        let (mut fresh, skipped_duplicates) = dedup(uris, &mut seen);
        let capacity = self.config.ceiling().saturating_sub(current_size);
        let truncated = self.cap(&mut fresh, capacity);

        let added = self.add_in_batches(&playlist, &fresh).await?;
        Ok(WriteOutcome {
            playlist,
            added,
            skipped_duplicates,
            truncated,
            created: false,
        })
    }

    fn cap(&self, uris: &mut Vec<String>, capacity: usize) -> bool {
        if uris.len() <= capacity {
            return false;
        }
        warn!(
            requested = uris.len(),
            capacity,
            "Playlist track ceiling reached, dropping the excess"
        );
        uris.truncate(capacity);
        true
    }

    async fn add_in_batches(&self, playlist: &PlaylistRef, uris: &[String]) -> Result<usize> {
        let batch_size = self.config.effective_batch_size();
        let batches = uris.len().div_ceil(batch_size);
        let mut added = 0;

        for (index, batch) in uris.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            if let Err(e) = self.target.add_tracks(&playlist.id, batch).await {
                warn!(
                    playlist_id = %playlist.id,
                    batch = index + 1,
                    added,
                    error = %e,
                    "Adding tracks failed"
                );
                return Err(SyncError::WriteFailed {
                    playlist: playlist.clone(),
                    added,
                    reason: e.to_string(),
                });
            }

            added += batch.len();
            debug!(batch = index + 1, batches, added, "Added batch");
        }

        info!(playlist_id = %playlist.id, added, "Playlist written");
        Ok(added)
    }
}
