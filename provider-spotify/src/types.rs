//! Spotify Web API response types
//!
//! Only the fields the sync needs are modelled.

use bridge_traits::catalog::{CandidateMatch, PlaylistRef, TargetUser};
use serde::{Deserialize, Serialize};

/// Generic paging object.
///
/// See: https://developer.spotify.com/documentation/web-api/concepts/api-calls
#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    /// Entries may be `null` (unavailable or removed items)
    #[serde(default = "Vec::new")]
    pub items: Vec<Option<T>>,

    /// URL of the next page, absent on the last one
    pub next: Option<String>,

    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AlbumRef {
    pub name: String,
}

/// Track object as returned by `/search`.
#[derive(Debug, Deserialize)]
pub struct Track {
    /// `null` for local files
    pub id: Option<String>,
    pub uri: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl Track {
    /// Tracks without an id or uri cannot be added to a playlist.
    pub fn into_candidate(self) -> Option<CandidateMatch> {
        let id = self.id?;
        let uri = self.uri?;
        Some(CandidateMatch {
            url: self
                .external_urls
                .spotify
                .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", id)),
            id,
            uri,
            title: self.name,
            artist: self
                .artists
                .into_iter()
                .next()
                .map(|artist| artist.name)
                .unwrap_or_default(),
            album: self.album.map(|album| album.name).unwrap_or_default(),
            popularity: self.popularity,
        })
    }
}

/// `/search?type=track`
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<Track>>,
}

/// `/me`
#[derive(Debug, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl From<UserProfile> for TargetUser {
    fn from(profile: UserProfile) -> Self {
        TargetUser {
            id: profile.id,
            display_name: profile.display_name,
            url: profile.external_urls.spotify,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: Option<String>,
}

/// Simplified playlist object (`/me/playlists`, playlist creation).
#[derive(Debug, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub public: Option<bool>,
    pub owner: Owner,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl From<Playlist> for PlaylistRef {
    fn from(playlist: Playlist) -> Self {
        PlaylistRef {
            url: playlist
                .external_urls
                .spotify
                .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", playlist.id)),
            id: playlist.id,
            name: playlist.name,
            owner_id: playlist.owner.id,
            is_public: playlist.public.unwrap_or(false),
        }
    }
}

/// Item of `/playlists/{id}/tracks`. Episodes and removed tracks may have no uri.
#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<PlaylistItemTrack>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemTrack {
    pub uri: Option<String>,
}

/// Body of `POST /users/{user_id}/playlists`
#[derive(Debug, Serialize)]
pub struct CreatePlaylistBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub public: bool,
}

/// Body of `POST /playlists/{id}/tracks`
#[derive(Debug, Serialize)]
pub struct AddTracksBody<'a> {
    pub uris: &'a [String],
}

/// `{"error": {"status": 401, "message": "The access token expired"}}`
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_skips_null_items() {
        let json = r#"{
            "tracks": {
                "items": [
                    null,
                    {
                        "id": "3n3Ppam7vgaVa1iaRUc9Lp",
                        "uri": "spotify:track:3n3Ppam7vgaVa1iaRUc9Lp",
                        "name": "Mr. Brightside",
                        "artists": [{"name": "The Killers"}, {"name": "Other"}],
                        "album": {"name": "Hot Fuss"},
                        "popularity": 87,
                        "external_urls": {"spotify": "https://open.spotify.com/track/3n3Ppam7vgaVa1iaRUc9Lp"}
                    }
                ],
                "next": null,
                "total": 1
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates: Vec<CandidateMatch> = response
            .tracks
            .unwrap()
            .items
            .into_iter()
            .flatten()
            .filter_map(Track::into_candidate)
            .collect();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].artist, "The Killers");
        assert_eq!(candidates[0].album, "Hot Fuss");
        assert_eq!(candidates[0].popularity, 87);
    }

    #[test]
    fn test_local_track_is_not_a_candidate() {
        let track: Track = serde_json::from_str(
            r#"{"id": null, "uri": "spotify:local:a:b:c:1", "name": "Local", "artists": []}"#,
        )
        .unwrap();

        assert!(track.into_candidate().is_none());
    }

    #[test]
    fn test_playlist_conversion() {
        let playlist: Playlist = serde_json::from_str(
            r#"{"id": "pl1", "name": "Mix", "public": false, "owner": {"id": "me", "display_name": "Me"}}"#,
        )
        .unwrap();

        let playlist_ref = PlaylistRef::from(playlist);

        assert_eq!(playlist_ref.owner_id, "me");
        assert!(!playlist_ref.is_public);
        assert_eq!(playlist_ref.url, "https://open.spotify.com/playlist/pl1");
    }
}
