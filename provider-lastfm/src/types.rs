//! Last.fm payload shapes.
//!
//! The track lists of `user.gettoptracks`, `user.getrecenttracks` and
//! `user.getlovedtracks` disagree on how artists and counts are encoded, and
//! collapse a one-element list into a bare object. Everything here is
//! deserialized loosely and normalized into [`SourceRecord`] before leaving
//! the crate.

use bridge_traits::catalog::{SourceRecord, SourceUser};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Artist and track names are cut to this many characters.
pub const MAX_FIELD_CHARS: usize = 200;

/// A JSON list that degrades to a bare value when it holds one element.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// `{"toptracks": {"track": [...]}}` and its recent/loved siblings.
#[derive(Debug, Deserialize)]
pub struct TrackPage {
    #[serde(
        rename = "tracks",
        alias = "toptracks",
        alias = "recenttracks",
        alias = "lovedtracks"
    )]
    tracks: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    track: Option<OneOrMany<Value>>,
}

impl TrackPage {
    /// Normalized records of this page, in API order.
    pub fn into_records(self) -> Vec<SourceRecord> {
        self.tracks
            .and_then(|list| list.track)
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(normalize_track)
            .collect()
    }
}

/// Artist as a bare string (`loved`/`top` in some versions) or an object
/// carrying `name` or `#text` (`recent`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawArtist {
    Name(String),
    Object {
        name: Option<String>,
        #[serde(rename = "#text")]
        text: Option<String>,
    },
}

impl RawArtist {
    fn name(&self) -> &str {
        match self {
            RawArtist::Name(name) => name,
            RawArtist::Object { name, text } => name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .or(text.as_deref())
                .unwrap_or(""),
        }
    }
}

/// A count that may arrive as a number, a numeric string, or garbage.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCount {
    Number(serde_json::Number),
    Text(String),
    Other(Value),
}

impl RawCount {
    /// Zero, empty and null values do not count as supplied.
    fn is_supplied(&self) -> bool {
        match self {
            RawCount::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            RawCount::Text(s) => !s.trim().is_empty(),
            RawCount::Other(v) => !v.is_null(),
        }
    }

    fn parse(&self) -> Option<u64> {
        match self {
            RawCount::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
            RawCount::Text(s) => s.trim().parse().ok(),
            RawCount::Other(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAttr {
    rank: Option<RawCount>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrack {
    name: Option<String>,
    artist: Option<RawArtist>,
    playcount: Option<RawCount>,
    count: Option<RawCount>,
    #[serde(rename = "@attr")]
    attr: Option<RawAttr>,
    url: Option<String>,
    mbid: Option<String>,
}

impl RawTrack {
    /// First supplied of `playcount`, `count`, `@attr.rank`; 0 when it does not parse.
    fn play_count(&self) -> u64 {
        let rank = self.attr.as_ref().and_then(|attr| attr.rank.as_ref());
        [self.playcount.as_ref(), self.count.as_ref(), rank]
            .into_iter()
            .flatten()
            .find(|count| count.is_supplied())
            .and_then(RawCount::parse)
            .unwrap_or(0)
    }

    fn into_record(self) -> SourceRecord {
        let play_count = self.play_count();
        SourceRecord {
            artist: clean_field(self.artist.as_ref().map(RawArtist::name).unwrap_or("")),
            title: clean_field(self.name.as_deref().unwrap_or("")),
            play_count,
            source_url: self.url.unwrap_or_default(),
            external_id: self.mbid.filter(|id| !id.trim().is_empty()),
        }
    }
}

/// Normalize one raw track object.
///
/// A record that does not even deserialize loosely becomes an empty record
/// so it still counts toward the page and ends up unmatched.
pub fn normalize_track(value: Value) -> SourceRecord {
    match serde_json::from_value::<RawTrack>(value) {
        Ok(raw) => raw.into_record(),
        Err(e) => {
            warn!(error = %e, "Malformed Last.fm track record");
            RawTrack::default().into_record()
        }
    }
}

/// Trim, then cut to [`MAX_FIELD_CHARS`] on a char boundary.
pub fn clean_field(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= MAX_FIELD_CHARS {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .take(MAX_FIELD_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// `{"error": 6, "message": "User not found"}`
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub user: RawUser,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawUser {
    name: Option<String>,
    realname: Option<String>,
    country: Option<String>,
    playcount: Option<RawCount>,
    registered: Option<RawRegistered>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRegistered {
    Object {
        unixtime: Option<RawCount>,
        #[serde(rename = "#text")]
        text: Option<RawCount>,
    },
    Bare(RawCount),
}

impl RawUser {
    pub fn into_user(self, requested: &str) -> SourceUser {
        let registered = self.registered.and_then(|reg| match reg {
            RawRegistered::Object { unixtime, text } => unixtime
                .as_ref()
                .and_then(RawCount::parse)
                .or_else(|| text.as_ref().and_then(RawCount::parse)),
            RawRegistered::Bare(count) => count.parse(),
        });

        SourceUser {
            username: non_blank(self.name).unwrap_or_else(|| requested.to_string()),
            real_name: non_blank(self.realname),
            // Last.fm reports an unset country as the string "None"
            country: non_blank(self.country).filter(|c| c != "None"),
            play_count: self.playcount.as_ref().and_then(RawCount::parse).unwrap_or(0),
            registered: registered.and_then(|ts| i64::try_from(ts).ok()),
            url: self.url.unwrap_or_default(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
