use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    domain::{
        history::{LibraryTrack, PlayedCursor, RecentlyPlayed},
        profile::{PlaylistSummary, TimeRange, UserProfile},
        track::{Album, Artist, Track},
    },
    spotify::{
        auth::{Authenticator, TokenGrant},
        cache::TtlCache,
        error::{ProviderError, ProviderFailure},
        pages::Pages,
        payload::{
            AlbumPayload, ArtistPayload, Page, PlayHistoryPayload, PlaylistPayload,
            SavedTrackPayload, SearchPayload, TrackPayload, UserPayload,
        },
        transport::{ApiRequest, ApiResponse, Auth, Body, Transport},
    },
};

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Largest page the provider serves for top items and library feeds.
pub const MAX_LIMIT: u32 = 50;
const MAX_PLAYLIST_ITEMS_PER_CALL: usize = 100;
const MAX_IDS_PER_CALL: usize = 50;

pub type RecentlyPlayedFeed<'a> = Pages<'a, PlayHistoryPayload, RecentlyPlayed>;
pub type SavedTracksFeed<'a> = Pages<'a, SavedTrackPayload, LibraryTrack>;
pub type PlaylistsFeed<'a> = Pages<'a, PlaylistPayload, PlaylistSummary>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Artist,
    Album,
}

impl SearchKind {
    fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Artist => "artist",
            SearchKind::Album => "album",
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub tracks: Vec<Track>,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
}

/// Clamps a requested result count to what the provider accepts.
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIMIT)
}

/// Authenticated client for the provider's Web API.
///
/// Constructed once and passed to whoever needs it; owns the token state
/// and a time-bounded cache of the current user's profile.
pub struct SpotifyClient {
    transport: Box<dyn Transport>,
    auth: Authenticator,
    api_url: String,
    profile: TtlCache<UserProfile>,
}

impl SpotifyClient {
    pub fn new(
        transport: Box<dyn Transport>,
        auth: Authenticator,
        api_url: &str,
        profile_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            auth,
            api_url: api_url.trim_end_matches('/').to_string(),
            profile: TtlCache::new(profile_ttl),
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        self.auth.authorize_url(state)
    }

    /// Trades an authorization code for tokens. The code may belong to a
    /// different account, so the cached profile is dropped.
    pub fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let grant = self.auth.exchange_code(self.transport.as_ref(), code)?;
        self.profile.invalidate();
        Ok(grant)
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.api_url, path_and_query)
    }

    fn send(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Body,
    ) -> Result<ApiResponse, ProviderError> {
        let token = self.auth.access_token(self.transport.as_ref())?;

        let request = ApiRequest::new(method, url)
            .with_auth(Auth::Bearer(token))
            .with_body(body);

        let response = self
            .transport
            .execute(&request)
            .map_err(|e| ProviderError::transport(operation, e))?;

        match ProviderFailure::from_response(&response) {
            None => Ok(response),
            Some(failure) => {
                if failure == ProviderFailure::Unauthorized {
                    self.auth.invalidate();
                }
                warn!("{operation} failed: {failure}");
                Err(ProviderError::new(operation, failure))
            }
        }
    }

    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
    ) -> Result<T, ProviderError> {
        let response = self.send(operation, Method::GET, url, Body::Empty)?;
        serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::malformed(operation, e.to_string()))
    }

    fn get_converted<P, T>(&self, operation: &str, url: &str) -> Result<T, ProviderError>
    where
        P: DeserializeOwned,
        T: TryFrom<P, Error = String>,
    {
        let payload: P = self.get_json(operation, url)?;
        T::try_from(payload).map_err(|reason| ProviderError::malformed(operation, reason))
    }

    /// Profile of the authenticated user, served from cache while fresh.
    pub fn current_user(&self) -> Result<UserProfile, ProviderError> {
        self.profile.get_or_try_insert(|| {
            debug!("Fetching current user profile");
            let payload: UserPayload = self.get_json("fetch user profile", &self.url("/me"))?;
            Ok(payload.into())
        })
    }

    /// The cached profile, if one is fresh. Never calls the provider.
    pub fn cached_profile(&self) -> Option<UserProfile> {
        self.profile.get()
    }

    pub fn clear_cache(&self) {
        info!("Clearing cached user profile");
        self.profile.invalidate();
    }

    pub fn top_tracks(&self, range: TimeRange, limit: u32) -> Result<Vec<Track>, ProviderError> {
        const OPERATION: &str = "fetch top tracks";
        let url = self.url(&format!(
            "/me/top/tracks?time_range={range}&limit={}",
            clamp_limit(limit)
        ));
        let page: Page<TrackPayload> = self.get_json(OPERATION, &url)?;
        page.items
            .into_iter()
            .map(|p| Track::try_from(p).map_err(|r| ProviderError::malformed(OPERATION, r)))
            .collect()
    }

    pub fn top_artists(&self, range: TimeRange, limit: u32) -> Result<Vec<Artist>, ProviderError> {
        let url = self.url(&format!(
            "/me/top/artists?time_range={range}&limit={}",
            clamp_limit(limit)
        ));
        let page: Page<ArtistPayload> = self.get_json("fetch top artists", &url)?;
        Ok(page.items.into_iter().map(Artist::from).collect())
    }

    /// Recently played tracks, newest first, optionally bounded by a cursor.
    pub fn recently_played(&self, cursor: Option<PlayedCursor>) -> RecentlyPlayedFeed<'_> {
        let mut url = self.url(&format!("/me/player/recently-played?limit={MAX_LIMIT}"));
        if let Some(cursor) = cursor {
            url.push('&');
            url.push_str(&cursor.query());
        }
        Pages::new(self, "fetch recently played tracks", url)
    }

    /// Tracks saved in the user's library, most recently added first.
    pub fn saved_tracks(&self) -> SavedTracksFeed<'_> {
        Pages::new(
            self,
            "fetch saved tracks",
            self.url(&format!("/me/tracks?limit={MAX_LIMIT}&offset=0")),
        )
    }

    pub fn playlists(&self) -> PlaylistsFeed<'_> {
        Pages::new(
            self,
            "fetch user playlists",
            self.url(&format!("/me/playlists?limit={MAX_LIMIT}&offset=0")),
        )
    }

    pub fn get_track(&self, track_id: &str) -> Result<Track, ProviderError> {
        let url = self.url(&format!("/tracks/{}", urlencoding::encode(track_id)));
        self.get_converted::<TrackPayload, _>("fetch track information", &url)
    }

    pub fn get_artist(&self, artist_id: &str) -> Result<Artist, ProviderError> {
        let url = self.url(&format!("/artists/{}", urlencoding::encode(artist_id)));
        let payload: ArtistPayload = self.get_json("fetch artist information", &url)?;
        Ok(payload.into())
    }

    pub fn get_album(&self, album_id: &str) -> Result<Album, ProviderError> {
        let url = self.url(&format!("/albums/{}", urlencoding::encode(album_id)));
        self.get_converted::<AlbumPayload, _>("fetch album information", &url)
    }

    pub fn search(
        &self,
        query: &str,
        kinds: &[SearchKind],
        limit: u32,
    ) -> Result<SearchResults, ProviderError> {
        const OPERATION: &str = "perform search";
        let types = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
        let url = self.url(&format!(
            "/search?q={}&type={}&limit={}",
            urlencoding::encode(query),
            urlencoding::encode(&types),
            clamp_limit(limit)
        ));
        let payload: SearchPayload = self.get_json(OPERATION, &url)?;
        let malformed = |r: String| ProviderError::malformed(OPERATION, r);

        let mut results = SearchResults::default();
        if let Some(page) = payload.tracks {
            results.tracks = page
                .items
                .into_iter()
                .map(|p| Track::try_from(p).map_err(malformed))
                .collect::<Result<_, _>>()?;
        }
        if let Some(page) = payload.artists {
            results.artists = page.items.into_iter().map(Artist::from).collect();
        }
        if let Some(page) = payload.albums {
            results.albums = page
                .items
                .into_iter()
                .map(|p| Album::try_from(p).map_err(malformed))
                .collect::<Result<_, _>>()?;
        }
        Ok(results)
    }

    pub fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<PlaylistSummary, ProviderError> {
        const OPERATION: &str = "create playlist";
        let user = self
            .current_user()
            .map_err(|e| ProviderError::new(OPERATION, e.failure))?;
        let url = self.url(&format!("/users/{}/playlists", urlencoding::encode(&user.id)));
        let body = json!({
            "name": name,
            "description": description,
            "public": public,
        });

        let response = self.send(OPERATION, Method::POST, &url, Body::Json(body))?;
        let payload: PlaylistPayload = serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::malformed(OPERATION, e.to_string()))?;

        info!("Created playlist {} ({})", payload.name, payload.id);
        Ok(payload.into())
    }

    pub fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), ProviderError> {
        let url = self.url(&format!("/playlists/{}/tracks", urlencoding::encode(playlist_id)));
        for chunk in track_ids.chunks(MAX_PLAYLIST_ITEMS_PER_CALL) {
            let uris = chunk
                .iter()
                .map(|id| format!("spotify:track:{id}"))
                .collect::<Vec<_>>();
            self.send(
                "add tracks to playlist",
                Method::POST,
                &url,
                Body::Json(json!({ "uris": uris })),
            )?;
        }
        info!(
            "Added {} tracks to playlist {}",
            track_ids.len(),
            playlist_id
        );
        Ok(())
    }

    fn send_ids(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        extra_query: &str,
        ids: &[String],
    ) -> Result<(), ProviderError> {
        for chunk in ids.chunks(MAX_IDS_PER_CALL) {
            let url = self.url(&format!(
                "{path}?{extra_query}ids={}",
                urlencoding::encode(&chunk.join(","))
            ));
            self.send(operation, method.clone(), &url, Body::Empty)?;
        }
        Ok(())
    }

    pub fn follow_artists(&self, artist_ids: &[String]) -> Result<(), ProviderError> {
        self.send_ids("follow artist", Method::PUT, "/me/following", "type=artist&", artist_ids)
    }

    pub fn unfollow_artists(&self, artist_ids: &[String]) -> Result<(), ProviderError> {
        self.send_ids(
            "unfollow artist",
            Method::DELETE,
            "/me/following",
            "type=artist&",
            artist_ids,
        )
    }

    pub fn save_tracks(&self, track_ids: &[String]) -> Result<(), ProviderError> {
        self.send_ids("save tracks", Method::PUT, "/me/tracks", "", track_ids)
    }

    pub fn remove_saved_tracks(&self, track_ids: &[String]) -> Result<(), ProviderError> {
        self.send_ids("remove saved tracks", Method::DELETE, "/me/tracks", "", track_ids)
    }

    /// Creates a private playlist holding the user's top tracks for `range`.
    pub fn create_top_tracks_playlist(
        &self,
        range: TimeRange,
    ) -> Result<PlaylistSummary, ProviderError> {
        let tracks = self.top_tracks(range, MAX_LIMIT)?;
        let playlist = self.create_playlist(
            &format!("Personalized {range} Playlist"),
            &format!("Top {} tracks, {range}", tracks.len()),
            false,
        )?;
        let ids = tracks.into_iter().map(|t| t.id).collect::<Vec<_>>();
        self.add_tracks_to_playlist(&playlist.id, &ids)?;

        Ok(PlaylistSummary {
            track_count: u32::try_from(ids.len()).unwrap_or(u32::MAX),
            ..playlist
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::spotify::{
        payload::samples::{artist_json, track_json},
        transport::fake::FakeTransport,
    };

    #[test]
    fn test_recently_played_follows_next_until_null() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        paginate(
            &transport,
            RECENT_URL,
            vec![
                vec![
                    played("a", "2024-03-01T10:00:00.000Z"),
                    played("b", "2024-03-01T09:00:00.000Z"),
                ],
                vec![played("c", "2024-03-01T08:00:00.000Z")],
            ],
        );

        let mut feed = client.recently_played(None);
        let ids = feed
            .by_ref()
            .map(|item| item.map(|i| i.track.id))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(feed.pages_fetched(), 2);
        assert!(feed.next().is_none());
        Ok(())
    }

    #[test]
    fn test_feed_is_lazy() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let urls = paginate(
            &transport,
            SAVED_URL,
            vec![
                vec![saved("a", "2024-01-02T00:00:00Z")],
                vec![saved("b", "2024-01-01T00:00:00Z")],
            ],
        );

        let first = client.saved_tracks().next().unwrap()?;

        assert_eq!(first.track.id, "a");
        assert_eq!(transport.requests_to(&urls[0]), 1);
        assert_eq!(transport.requests_to(&urls[1]), 0);
        Ok(())
    }

    #[test]
    fn test_feed_skips_empty_intermediate_page() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        paginate(
            &transport,
            SAVED_URL,
            vec![vec![], vec![saved("z", "2024-01-01T00:00:00Z")]],
        );

        let items = client.saved_tracks().collect::<Result<Vec<_>, _>>()?;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].track.id, "z");
        Ok(())
    }

    #[test]
    fn test_empty_feed() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        paginate(&transport, RECENT_URL, vec![vec![]]);

        assert_eq!(client.recently_played(None).count(), 0);
        Ok(())
    }

    #[test]
    fn test_malformed_item_ends_the_feed() {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let mut broken = played("x", "2024-01-01T00:00:00Z");
        broken["track"]["album"]["album_type"] = json!("mixtape");
        paginate(
            &transport,
            RECENT_URL,
            vec![vec![played("a", "2024-01-02T00:00:00Z"), broken, played("b", "2024-01-01T00:00:00Z")]],
        );

        let results = client.recently_played(None).collect::<Vec<_>>();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err.failure, ProviderFailure::Malformed(_)));
        assert_eq!(err.operation, "fetch recently played tracks");
    }

    #[test]
    fn test_item_without_id_is_skipped() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let mut local = played("x", "2024-01-01T12:00:00Z");
        local["track"]["id"] = serde_json::Value::Null;
        local["track"]["album"]["id"] = serde_json::Value::Null;
        paginate(
            &transport,
            RECENT_URL,
            vec![vec![played("a", "2024-01-02T00:00:00Z"), local, played("b", "2024-01-01T00:00:00Z")]],
        );

        let ids = client
            .recently_played(None)
            .map(|item| item.map(|i| i.track.id))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(ids, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_recently_played_cursor_sets_first_url() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let after = format!("{RECENT_URL}&after=1709294400000");
        let before = format!("{RECENT_URL}&before=1709294400000");
        paginate(&transport, &after, vec![vec![played("a", "2024-03-01T13:00:00Z")]]);
        paginate(&transport, &before, vec![vec![]]);
        let moment = "2024-03-01T12:00:00Z".parse()?;

        assert_eq!(client.recently_played(Some(PlayedCursor::After(moment))).count(), 1);
        assert_eq!(client.recently_played(Some(PlayedCursor::Before(moment))).count(), 0);
        assert_eq!(transport.requests_to(&after), 1);
        assert_eq!(transport.requests_to(&before), 1);
        assert_eq!(transport.requests_to(RECENT_URL), 0);
        Ok(())
    }

    #[test]
    fn test_requests_carry_bearer_token() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        with_user(&transport, "me");

        client.current_user()?;

        let request = transport
            .requests()
            .into_iter()
            .find(|r| r.url == format!("{API}/me"))
            .unwrap();
        assert_eq!(request.auth, Auth::Bearer("test-token".to_string()));
        Ok(())
    }

    #[test]
    fn test_current_user_is_cached() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        with_user(&transport, "me");

        assert_eq!(client.current_user()?.id, "me");
        assert_eq!(client.current_user()?.name(), "Test User");
        assert_eq!(transport.requests_to(&format!("{API}/me")), 1);

        transport.respond_json(
            Method::POST,
            TOKEN_URL,
            json!({
                "access_token": "other-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "other-refresh"
            }),
        );
        client.exchange_code("new-code")?;
        client.current_user()?;
        assert_eq!(transport.requests_to(&format!("{API}/me")), 2);
        Ok(())
    }

    #[test]
    fn test_clear_cache_forces_refetch() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        with_user(&transport, "me");

        assert!(client.cached_profile().is_none());
        client.current_user()?;
        assert_eq!(client.cached_profile().map(|p| p.id), Some("me".to_string()));

        client.clear_cache();
        assert!(client.cached_profile().is_none());
        client.current_user()?;
        assert_eq!(transport.requests_to(&format!("{API}/me")), 2);
        Ok(())
    }

    #[test]
    fn test_unauthorized_invalidates_token() {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        transport.respond(Method::GET, &format!("{API}/me"), 401, "");

        let first = client.current_user().unwrap_err();
        let _ = client.current_user();

        assert_eq!(first.failure, ProviderFailure::Unauthorized);
        assert_eq!(first.operation, "fetch user profile");
        assert_eq!(transport.requests_to(TOKEN_URL), 2);
    }

    #[test]
    fn test_rate_limit_is_reported() {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let url = format!("{API}/me/top/artists?time_range=short_term&limit=5");
        transport.respond_rate_limited(Method::GET, &url, 7);

        let err = client.top_artists(TimeRange::Short, 5).unwrap_err();

        assert_eq!(
            err.failure,
            ProviderFailure::RateLimited {
                retry_after: Some(7)
            }
        );
    }

    #[test]
    fn test_transport_failure_is_wrapped() {
        let transport = FakeTransport::new();
        let client = test_client(&transport);

        let err = client.get_track("nope").unwrap_err();

        assert!(matches!(err.failure, ProviderFailure::Transport(_)));
        assert_eq!(err.operation, "fetch track information");
    }

    #[test]
    fn test_top_limit_is_clamped() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let url = format!("{API}/me/top/tracks?time_range=long_term&limit=50");
        transport.respond_json(
            Method::GET,
            &url,
            json!({"items": [track_json("t1"), track_json("t2")], "next": null}),
        );

        let tracks = client.top_tracks(TimeRange::Long, 500)?;

        assert_eq!(tracks.len(), 2);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(20), 20);
        Ok(())
    }

    #[test]
    fn test_top_artists() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        transport.respond_json(
            Method::GET,
            &format!("{API}/me/top/artists?time_range=medium_term&limit=2"),
            json!({"items": [artist_json("x"), artist_json("y")], "next": null}),
        );

        let artists = client.top_artists(TimeRange::Medium, 2)?;

        assert_eq!(
            artists.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["x", "y"]
        );
        Ok(())
    }

    #[test]
    fn test_search_encodes_query() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        transport.respond_json(
            Method::GET,
            &format!("{API}/search?q=my%20bloody%20valentine&type=track%2Cartist&limit=10"),
            json!({
                "tracks": {"items": [track_json("t")], "next": null},
                "artists": {"items": [artist_json("a")], "next": null}
            }),
        );

        let results = client.search(
            "my bloody valentine",
            &[SearchKind::Track, SearchKind::Artist],
            10,
        )?;

        assert_eq!(results.tracks.len(), 1);
        assert_eq!(results.artists.len(), 1);
        assert!(results.albums.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_tracks_is_chunked() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let ids = (0..120).map(|i| format!("t{i}")).collect::<Vec<_>>();
        for chunk in ids.chunks(50) {
            let url = format!("{API}/me/tracks?ids={}", urlencoding::encode(&chunk.join(",")));
            transport.respond(Method::PUT, &url, 200, "");
        }

        client.save_tracks(&ids)?;

        let puts = transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::PUT)
            .count();
        assert_eq!(puts, 3);
        Ok(())
    }

    #[test]
    fn test_empty_id_list_sends_nothing() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);

        client.unfollow_artists(&[])?;
        client.remove_saved_tracks(&[])?;

        assert!(transport.requests().is_empty());
        Ok(())
    }

    #[test]
    fn test_follow_artist_url() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        let url = format!("{API}/me/following?type=artist&ids=a1%2Ca2");
        transport.respond(Method::PUT, &url, 204, "");

        client.follow_artists(&["a1".to_string(), "a2".to_string()])?;

        assert_eq!(transport.requests_to(&url), 1);
        Ok(())
    }

    #[test]
    fn test_create_top_tracks_playlist() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let client = test_client(&transport);
        with_user(&transport, "me");
        transport.respond_json(
            Method::GET,
            &format!("{API}/me/top/tracks?time_range=short_term&limit=50"),
            json!({"items": [track_json("t1"), track_json("t2")], "next": null}),
        );
        transport.respond_json(
            Method::POST,
            &format!("{API}/users/me/playlists"),
            json!({
                "id": "pl1",
                "name": "Personalized short_term Playlist",
                "public": false,
                "tracks": {"total": 0},
                "external_urls": {"spotify": "https://open.spotify.com/playlist/pl1"}
            }),
        );
        transport.respond_json(
            Method::POST,
            &format!("{API}/playlists/pl1/tracks"),
            json!({"snapshot_id": "s"}),
        );

        let playlist = client.create_top_tracks_playlist(TimeRange::Short)?;

        assert_eq!(playlist.id, "pl1");
        assert_eq!(playlist.track_count, 2);
        assert!(!playlist.public);

        let add = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/playlists/pl1/tracks"))
            .unwrap();
        assert_eq!(
            add.body,
            Body::Json(json!({"uris": ["spotify:track:t1", "spotify:track:t2"]}))
        );
        Ok(())
    }
}
