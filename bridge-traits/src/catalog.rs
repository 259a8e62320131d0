//! Catalog Contracts
//!
//! The two remote catalogs the sync core talks to: a read-only *source*
//! (listening history) and a writable *target* (search + playlists). Both
//! are expressed in terms of normalized records so provider-specific payload
//! shapes never leak past the provider crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Largest page the source API serves per call.
pub const MAX_SOURCE_PAGE_SIZE: usize = 50;

/// Largest number of track URIs the target API accepts in one add call.
pub const MAX_ADD_BATCH: usize = 100;

/// Which listening list to read from the source catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListeningMode {
    Top,
    Recent,
    Loved,
}

impl ListeningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListeningMode::Top => "top",
            ListeningMode::Recent => "recent",
            ListeningMode::Loved => "loved",
        }
    }
}

impl fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListeningMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(ListeningMode::Top),
            "recent" => Ok(ListeningMode::Recent),
            "loved" => Ok(ListeningMode::Loved),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown listening mode '{}'",
                other
            ))),
        }
    }
}

/// Aggregation window for top tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimePeriod {
    #[default]
    #[serde(rename = "overall")]
    Overall,
    #[serde(rename = "7day")]
    SevenDays,
    #[serde(rename = "1month")]
    OneMonth,
    #[serde(rename = "3month")]
    ThreeMonths,
    #[serde(rename = "6month")]
    SixMonths,
    #[serde(rename = "12month")]
    TwelveMonths,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 6] = [
        TimePeriod::Overall,
        TimePeriod::SevenDays,
        TimePeriod::OneMonth,
        TimePeriod::ThreeMonths,
        TimePeriod::SixMonths,
        TimePeriod::TwelveMonths,
    ];

    /// Wire value understood by the source API.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Overall => "overall",
            TimePeriod::SevenDays => "7day",
            TimePeriod::OneMonth => "1month",
            TimePeriod::ThreeMonths => "3month",
            TimePeriod::SixMonths => "6month",
            TimePeriod::TwelveMonths => "12month",
        }
    }

    /// Human label used in default playlist names.
    pub fn label(&self) -> &'static str {
        match self {
            TimePeriod::Overall => "overall",
            TimePeriod::SevenDays => "7 days",
            TimePeriod::OneMonth => "1 months",
            TimePeriod::ThreeMonths => "3 months",
            TimePeriod::SixMonths => "6 months",
            TimePeriod::TwelveMonths => "12 months",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        TimePeriod::ALL
            .into_iter()
            .find(|period| period.as_str() == wanted)
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!(
                    "Unknown period '{}' (expected one of: overall, 7day, 1month, 3month, 6month, 12month)",
                    s
                ))
            })
    }
}

/// One normalized listening record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub artist: String,
    pub title: String,
    pub play_count: u64,
    pub source_url: String,
    /// MusicBrainz id, when the source supplies a non-empty one
    pub external_id: Option<String>,
}

impl SourceRecord {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            play_count: 0,
            source_url: String::new(),
            external_id: None,
        }
    }
}

/// A track returned by the target catalog's search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub id: String,
    pub uri: String,
    pub title: String,
    /// First credited artist
    pub artist: String,
    pub album: String,
    pub popularity: u32,
    /// Public web link
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub url: String,
    pub name: String,
    pub owner_id: String,
    pub is_public: bool,
}

/// Parameters for creating a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub is_public: bool,
}

/// Source account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub username: String,
    pub real_name: Option<String>,
    pub country: Option<String>,
    pub play_count: u64,
    /// Registration time as a unix timestamp
    pub registered: Option<i64>,
    pub url: String,
}

impl SourceUser {
    /// Real name if set, otherwise the account name.
    pub fn display_name(&self) -> &str {
        self.real_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// The authenticated target-catalog principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub id: String,
    pub display_name: Option<String>,
    pub url: Option<String>,
}

/// What to read from the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuery {
    pub username: String,
    pub mode: ListeningMode,
    /// Only meaningful for [`ListeningMode::Top`]
    #[serde(default)]
    pub period: TimePeriod,
    /// Lower bound (unix seconds) for recent tracks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
}

impl SourceQuery {
    pub fn new(username: impl Into<String>, mode: ListeningMode) -> Self {
        Self {
            username: username.into(),
            mode,
            period: TimePeriod::Overall,
            from: None,
        }
    }

    pub fn with_period(mut self, period: TimePeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_from(mut self, from: i64) -> Self {
        self.from = Some(from);
        self
    }
}

/// Read-only listening-history catalog.
///
/// Providers implement [`SourceCatalog::fetch_page`]; the default
/// [`SourceCatalog::fetch`] drives pagination. Providers own throttling
/// between page requests.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Fetch one page (1-based) of at most `page_size` records.
    async fn fetch_page(
        &self,
        query: &SourceQuery,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<SourceRecord>>;

    /// Look up the source account profile.
    async fn user_info(&self, username: &str) -> Result<SourceUser>;

    /// Fetch up to `limit` records, paging at `min(50, limit)` until the
    /// limit is reached or a short/empty page signals the end of the data.
    async fn fetch(&self, query: &SourceQuery, limit: usize) -> Result<Vec<SourceRecord>> {
        let mut records = Vec::new();
        if limit == 0 {
            return Ok(records);
        }

        let page_size = limit.min(MAX_SOURCE_PAGE_SIZE);
        let mut page = 1u32;

        loop {
            let batch = self.fetch_page(query, page, page_size).await?;
            let received = batch.len();
            records.extend(batch);

            if received < page_size || records.len() >= limit {
                break;
            }
            page += 1;
        }

        records.truncate(limit);
        Ok(records)
    }
}

/// Writable destination catalog.
#[async_trait]
pub trait TargetCatalog: Send + Sync {
    /// Profile of the account the credential belongs to.
    async fn current_user(&self) -> Result<TargetUser>;

    /// Structured field search (`artist:… track:…`).
    async fn search(&self, artist: &str, title: &str) -> Result<Vec<CandidateMatch>>;

    /// Free-text search with punctuation and qualifiers stripped.
    async fn search_fuzzy(&self, artist: &str, title: &str) -> Result<Vec<CandidateMatch>>;

    async fn create_playlist(&self, owner_id: &str, playlist: &NewPlaylist) -> Result<PlaylistRef>;

    /// First playlist of the current user whose name matches exactly.
    async fn find_playlist_by_name(&self, name: &str) -> Result<Option<PlaylistRef>>;

    /// Every track URI currently in the playlist, across all pages.
    async fn playlist_track_uris(&self, playlist_id: &str) -> Result<Vec<String>>;

    /// Append one batch of at most [`MAX_ADD_BATCH`] URIs.
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PagedSource {
        available: usize,
        calls: Mutex<Vec<(u32, usize)>>,
    }

    impl PagedSource {
        fn new(available: usize) -> Self {
            Self {
                available,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SourceCatalog for PagedSource {
        async fn fetch_page(
            &self,
            _query: &SourceQuery,
            page: u32,
            page_size: usize,
        ) -> Result<Vec<SourceRecord>> {
            self.calls.lock().unwrap().push((page, page_size));
            let start = (page as usize - 1) * page_size;
            let end = (start + page_size).min(self.available);
            Ok((start..end)
                .map(|i| SourceRecord::new("Artist", format!("Track {}", i)))
                .collect())
        }

        async fn user_info(&self, username: &str) -> Result<SourceUser> {
            Err(BridgeError::NotFound(username.to_string()))
        }
    }

    fn query() -> SourceQuery {
        SourceQuery::new("listener", ListeningMode::Top)
    }

    #[tokio::test]
    async fn test_fetch_never_exceeds_limit() {
        for available in [0usize, 1, 49, 50, 51, 120, 300] {
            for limit in [1usize, 10, 50, 51, 100, 137] {
                let source = PagedSource::new(available);
                let records = source.fetch(&query(), limit).await.unwrap();
                assert_eq!(
                    records.len(),
                    limit.min(available),
                    "available={} limit={}",
                    available,
                    limit
                );
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_pages_are_contiguous() {
        let source = PagedSource::new(500);
        let records = source.fetch(&query(), 120).await.unwrap();

        let titles: Vec<_> = records.iter().map(|r| r.title.clone()).collect();
        let expected: Vec<_> = (0..120).map(|i| format!("Track {}", i)).collect();
        assert_eq!(titles, expected);
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![(1, 50), (2, 50), (3, 50)]
        );
    }

    #[tokio::test]
    async fn test_fetch_zero_limit_makes_no_calls() {
        let source = PagedSource::new(10);
        let records = source.fetch(&query(), 0).await.unwrap();

        assert!(records.is_empty());
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_page_ends_fetch() {
        let source = PagedSource::new(30);
        let records = source.fetch(&query(), 100).await.unwrap();

        assert_eq!(records.len(), 30);
        assert_eq!(*source.calls.lock().unwrap(), vec![(1, 50)]);
    }

    #[test]
    fn test_period_parsing_and_labels() {
        assert_eq!("7day".parse::<TimePeriod>().unwrap(), TimePeriod::SevenDays);
        assert_eq!(TimePeriod::ThreeMonths.label(), "3 months");
        assert_eq!(TimePeriod::Overall.label(), "overall");
        assert!("fortnight".parse::<TimePeriod>().is_err());
        assert_eq!(
            serde_json::to_string(&TimePeriod::TwelveMonths).unwrap(),
            "\"12month\""
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Loved".parse::<ListeningMode>().unwrap(), ListeningMode::Loved);
        assert!("skipped".parse::<ListeningMode>().is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user = SourceUser {
            username: "rj".to_string(),
            real_name: Some("  ".to_string()),
            country: None,
            play_count: 0,
            registered: None,
            url: String::new(),
        };
        assert_eq!(user.display_name(), "rj");

        user.real_name = Some("Richard".to_string());
        assert_eq!(user.display_name(), "Richard");
    }
}
