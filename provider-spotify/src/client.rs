//! Spotify Web API client
//!
//! Implements `TargetCatalog` for the Spotify Web API v1.

use async_trait::async_trait;
use bridge_traits::catalog::{
    CandidateMatch, NewPlaylist, PlaylistRef, TargetCatalog, TargetUser, MAX_ADD_BATCH,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::query::{fuzzy_query, structured_query};
use crate::types::{
    AddTracksBody, CreatePlaylistBody, ErrorEnvelope, Paging, Playlist, PlaylistItem,
    SearchResponse, UserProfile,
};

/// Spotify Web API base URL
pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Results requested per search
pub const SEARCH_LIMIT: usize = 10;

/// Page size for playlist listings (API maximum: 50)
const PLAYLISTS_PAGE_SIZE: u32 = 50;

/// Page size for playlist item listings (API maximum: 100)
const PLAYLIST_ITEMS_PAGE_SIZE: u32 = 100;

/// Spotify Web API client
///
/// Holds one access token for the lifetime of a run; refreshing the token is
/// the caller's job.
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyClient;
/// use bridge_traits::catalog::TargetCatalog;
///
/// let client = SpotifyClient::new(http_client, tokens.access_token.clone());
/// let candidates = client.search("ABBA", "Dancing Queen").await?;
/// ```
pub struct SpotifyClient {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    api_base: String,
}

impl SpotifyClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - OAuth 2.0 access token with the playlist-modify scopes
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            api_base: SPOTIFY_API_BASE.to_string(),
        }
    }

    /// Point the client at another endpoint (test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send an authorized request and map non-2xx statuses to errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        if response.is_success() {
            return Ok(response);
        }

        let message = serde_json::from_slice::<ErrorEnvelope>(&response.body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());

        Err(match response.status {
            401 => SpotifyError::Unauthorized(message),
            429 => {
                let retry_after_seconds = response.retry_after_seconds().unwrap_or(1);
                warn!(retry_after_seconds, "Spotify rate limit hit");
                SpotifyError::RateLimited {
                    retry_after_seconds,
                }
            }
            404 => SpotifyError::NotFound(message),
            status => SpotifyError::Api { status, message },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.send(HttpRequest::new(HttpMethod::Get, url)).await?;
        response
            .json()
            .map_err(|e| SpotifyError::Parse(e.to_string()))
    }

    async fn search_query(&self, query: &str) -> Result<Vec<CandidateMatch>> {
        let url = self.url(&format!(
            "/search?q={}&type=track&limit={}",
            urlencoding::encode(query),
            SEARCH_LIMIT
        ));

        let response: SearchResponse = self.get_json(url).await?;
        let candidates: Vec<CandidateMatch> = response
            .tracks
            .map(|paging| paging.items)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|track| track.into_candidate())
            .collect();

        debug!(results = candidates.len(), "Search completed");
        Ok(candidates)
    }

    /// `GET /me`
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<TargetUser> {
        let profile: UserProfile = self.get_json(self.url("/me")).await?;
        Ok(profile.into())
    }

    /// Structured `artist:… track:…` search.
    #[instrument(skip(self))]
    pub async fn search_tracks(&self, artist: &str, title: &str) -> Result<Vec<CandidateMatch>> {
        self.search_query(&structured_query(artist, title)).await
    }

    /// Free-text search with qualifiers and punctuation removed.
    #[instrument(skip(self))]
    pub async fn search_tracks_fuzzy(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CandidateMatch>> {
        let query = fuzzy_query(artist, title);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.search_query(&query).await
    }

    /// `POST /users/{owner_id}/playlists`
    #[instrument(skip(self, playlist), fields(name = %playlist.name, public = playlist.is_public))]
    pub async fn create_user_playlist(
        &self,
        owner_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<PlaylistRef> {
        let body = CreatePlaylistBody {
            name: &playlist.name,
            description: &playlist.description,
            public: playlist.is_public,
        };

        let request = HttpRequest::new(
            HttpMethod::Post,
            self.url(&format!("/users/{}/playlists", urlencoding::encode(owner_id))),
        )
        .json(&body)
        .map_err(|e| SpotifyError::InvalidRequest(e.to_string()))?;

        let response = self.send(request).await?;
        let created: Playlist = response
            .json()
            .map_err(|e| SpotifyError::Parse(e.to_string()))?;

        info!(
            playlist_id = %created.id,
            owner = %created.owner.id,
            "Playlist created"
        );

        Ok(created.into())
    }

    /// Walk `GET /me/playlists` until a playlist named exactly `name` shows up.
    #[instrument(skip(self))]
    pub async fn find_user_playlist(&self, name: &str) -> Result<Option<PlaylistRef>> {
        let first_page = format!("/me/playlists?limit={}", PLAYLISTS_PAGE_SIZE);
        let mut next = Some(self.url(&first_page));

        while let Some(url) = next {
            let page: Paging<Playlist> = self.get_json(url).await?;
            if let Some(found) = page.items.into_iter().flatten().find(|p| p.name == name) {
                debug!(playlist_id = %found.id, "Found existing playlist");
                return Ok(Some(found.into()));
            }
            next = page.next;
        }

        Ok(None)
    }

    /// Every track URI in the playlist, following `next` links.
    #[instrument(skip(self))]
    pub async fn playlist_uris(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let mut next = Some(self.url(&format!(
            "/playlists/{}/tracks?fields=items(track(uri)),next&limit={}",
            urlencoding::encode(playlist_id),
            PLAYLIST_ITEMS_PAGE_SIZE
        )));

        while let Some(url) = next {
            let page: Paging<PlaylistItem> = self.get_json(url).await?;
            uris.extend(
                page.items
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item.track.and_then(|track| track.uri)),
            );
            next = page.next;
        }

        debug!(count = uris.len(), "Fetched playlist track URIs");
        Ok(uris)
    }

    /// `POST /playlists/{id}/tracks` with at most 100 URIs.
    #[instrument(skip(self, uris), fields(count = uris.len()))]
    pub async fn add_playlist_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        if uris.len() > MAX_ADD_BATCH {
            return Err(SpotifyError::InvalidRequest(format!(
                "{} tracks in one add call (maximum {})",
                uris.len(),
                MAX_ADD_BATCH
            )));
        }
        if uris.is_empty() {
            return Ok(());
        }

        let request = HttpRequest::new(
            HttpMethod::Post,
            self.url(&format!("/playlists/{}/tracks", urlencoding::encode(playlist_id))),
        )
        .json(&AddTracksBody { uris })
        .map_err(|e| SpotifyError::InvalidRequest(e.to_string()))?;

        self.send(request).await?;
        debug!("Added tracks to playlist");
        Ok(())
    }
}

#[async_trait]
impl TargetCatalog for SpotifyClient {
    async fn current_user(&self) -> BridgeResult<TargetUser> {
        Ok(self.me().await?)
    }

    async fn search(&self, artist: &str, title: &str) -> BridgeResult<Vec<CandidateMatch>> {
        Ok(self.search_tracks(artist, title).await?)
    }

    async fn search_fuzzy(&self, artist: &str, title: &str) -> BridgeResult<Vec<CandidateMatch>> {
        Ok(self.search_tracks_fuzzy(artist, title).await?)
    }

    async fn create_playlist(
        &self,
        owner_id: &str,
        playlist: &NewPlaylist,
    ) -> BridgeResult<PlaylistRef> {
        Ok(self.create_user_playlist(owner_id, playlist).await?)
    }

    async fn find_playlist_by_name(&self, name: &str) -> BridgeResult<Option<PlaylistRef>> {
        Ok(self.find_user_playlist(name).await?)
    }

    async fn playlist_track_uris(&self, playlist_id: &str) -> BridgeResult<Vec<String>> {
        Ok(self.playlist_uris(playlist_id).await?)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> BridgeResult<()> {
        Ok(self.add_playlist_tracks(playlist_id, uris).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn track_json(id: &str, name: &str, artist: &str) -> String {
        format!(
            r#"{{"id":"{id}","uri":"spotify:track:{id}","name":"{name}","artists":[{{"name":"{artist}"}}],"album":{{"name":"Album"}},"popularity":50,"external_urls":{{"spotify":"https://open.spotify.com/track/{id}"}}}}"#
        )
    }

    fn client(http: MockHttpClient) -> SpotifyClient {
        SpotifyClient::new(Arc::new(http), "token-123")
    }

    #[tokio::test]
    async fn test_search_sends_structured_query() {
        let mut http = MockHttpClient::new();
        let body = format!(
            r#"{{"tracks":{{"items":[{}],"next":null,"total":1}}}}"#,
            track_json("t1", "SOS", "ABBA")
        );
        http.expect_execute()
            .withf(|req| {
                req.url.starts_with("https://api.spotify.com/v1/search?q=artist%3AABBA%20track%3ASOS")
                    && req.url.contains("type=track")
                    && req.url.contains("limit=10")
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer token-123")
            })
            .times(1)
            .returning(move |_| Ok(response(200, &body)));

        let results = client(http).search("ABBA", "SOS").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "spotify:track:t1");
        assert_eq!(results[0].artist, "ABBA");
    }

    #[tokio::test]
    async fn test_empty_search_result() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(response(200, r#"{"tracks":{"items":[],"next":null,"total":0}}"#)));

        let results = client(http).search_fuzzy("Nobody", "Nothing").await.unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_bridge_unauthorized() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                401,
                r#"{"error":{"status":401,"message":"The access token expired"}}"#,
            ))
        });

        let err = client(http).current_user().await.unwrap_err();

        match err {
            BridgeError::Unauthorized(message) => assert_eq!(message, "The access token expired"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            let mut resp = response(429, "");
            resp.headers.insert("Retry-After".to_string(), "7".to_string());
            Ok(resp)
        });

        let err = client(http).search("a", "b").await.unwrap_err();

        assert!(matches!(
            err,
            BridgeError::RateLimited {
                retry_after_seconds: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_create_playlist_posts_to_owner() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.method == HttpMethod::Post
                    && req.url == "https://api.spotify.com/v1/users/me-123/playlists"
                    && body["name"] == "Mix"
                    && body["public"] == false
            })
            .returning(|_| {
                Ok(response(
                    201,
                    r#"{"id":"pl1","name":"Mix","public":false,"owner":{"id":"me-123","display_name":"Me"},"external_urls":{"spotify":"https://open.spotify.com/playlist/pl1"}}"#,
                ))
            });

        let playlist = client(http)
            .create_playlist(
                "me-123",
                &NewPlaylist {
                    name: "Mix".into(),
                    description: "desc".into(),
                    is_public: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(playlist.id, "pl1");
        assert_eq!(playlist.owner_id, "me-123");
    }

    #[tokio::test]
    async fn test_playlist_track_uris_follows_next() {
        let mut http = MockHttpClient::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|req| req.url.contains("/playlists/pl1/tracks"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"items":[{"track":{"uri":"spotify:track:a"}},{"track":null}],"next":"https://api.spotify.com/v1/playlists/pl1/tracks?offset=100"}"#,
                ))
            });
        http.expect_execute()
            .withf(|req| req.url.ends_with("offset=100"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"items":[{"track":{"uri":"spotify:track:b"}}],"next":null}"#,
                ))
            });

        let uris = client(http).playlist_track_uris("pl1").await.unwrap();

        assert_eq!(uris, vec!["spotify:track:a", "spotify:track:b"]);
    }

    #[tokio::test]
    async fn test_find_playlist_by_exact_name() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                200,
                r#"{"items":[
                    {"id":"p1","name":"Mix 2","public":true,"owner":{"id":"me"}},
                    {"id":"p2","name":"Mix","public":true,"owner":{"id":"me"}}
                ],"next":null}"#,
            ))
        });

        let found = client(http).find_playlist_by_name("Mix").await.unwrap();

        assert_eq!(found.map(|p| p.id), Some("p2".to_string()));
    }

    #[tokio::test]
    async fn test_add_tracks_rejects_oversized_batch() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(0);
        let uris: Vec<String> = (0..101).map(|i| format!("spotify:track:{i}")).collect();

        let err = client(http).add_tracks("pl1", &uris).await.unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_add_tracks_posts_uris() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.url.ends_with("/playlists/pl1/tracks")
                    && body["uris"].as_array().map(|a| a.len()) == Some(2)
            })
            .times(1)
            .returning(|_| Ok(response(201, r#"{"snapshot_id":"abc"}"#)));
        let uris = vec!["spotify:track:a".to_string(), "spotify:track:b".to_string()];

        client(http).add_tracks("pl1", &uris).await.unwrap();
    }
}
