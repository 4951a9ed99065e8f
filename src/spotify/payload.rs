//! Raw provider payloads and their conversion into domain records.
//!
//! Everything the provider sends is deserialized into these structs first,
//! then converted. Conversion rejects items missing data the domain needs,
//! so malformed input fails at the boundary.

use std::{collections::HashMap, convert::Infallible, fmt};

use serde::Deserialize;

use crate::domain::{
    history::{LibraryTrack, RecentlyPlayed, Timestamp},
    profile::{PlaylistSummary, UserProfile},
    track::{Album, AlbumType, Artist, ArtistRef, Image, ReleaseDate, Track},
};

/// One page of a paginated provider response.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistRefPayload {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ArtistPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: u8,
    pub followers: Option<Followers>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumPayload {
    pub id: Option<String>,
    pub name: String,
    pub release_date: Option<String>,
    #[serde(default)]
    pub total_tracks: u32,
    pub album_type: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRefPayload>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    pub id: Option<String>,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: u8,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub artists: Vec<ArtistRefPayload>,
    pub album: Option<AlbumPayload>,
    pub uri: String,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PlayHistoryPayload {
    pub track: TrackPayload,
    pub played_at: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct SavedTrackPayload {
    pub track: TrackPayload,
    pub added_at: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
    pub followers: Option<Followers>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistTracksRef {
    pub total: u32,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistPayload {
    pub id: String,
    pub name: String,
    pub public: Option<bool>,
    pub tracks: Option<PlaylistTracksRef>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchPayload {
    pub tracks: Option<Page<TrackPayload>>,
    pub artists: Option<Page<ArtistPayload>>,
    pub albums: Option<Page<AlbumPayload>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

fn spotify_url(urls: &HashMap<String, String>) -> Option<String> {
    urls.get("spotify").cloned()
}

impl From<ImagePayload> for Image {
    fn from(p: ImagePayload) -> Self {
        Image {
            url: p.url,
            width: p.width,
            height: p.height,
        }
    }
}

impl TryFrom<ArtistRefPayload> for ArtistRef {
    type Error = String;

    fn try_from(p: ArtistRefPayload) -> Result<Self, Self::Error> {
        let id = p
            .id
            .ok_or_else(|| format!("artist '{}' has no id", p.name))?;
        Ok(ArtistRef { id, name: p.name })
    }
}

impl From<ArtistPayload> for Artist {
    fn from(p: ArtistPayload) -> Self {
        Artist {
            id: p.id,
            name: p.name,
            genres: p.genres,
            popularity: p.popularity,
            followers: p.followers.map(|f| f.total).unwrap_or_default(),
            images: p.images.into_iter().map(Image::from).collect(),
        }
    }
}

fn artist_refs(artists: Vec<ArtistRefPayload>) -> Result<Vec<ArtistRef>, String> {
    artists.into_iter().map(ArtistRef::try_from).collect()
}

impl TryFrom<AlbumPayload> for Album {
    type Error = String;

    fn try_from(p: AlbumPayload) -> Result<Self, Self::Error> {
        let id = p.id.ok_or_else(|| format!("album '{}' has no id", p.name))?;
        let album_type = match p.album_type.as_deref() {
            None => AlbumType::Album,
            Some(raw) => AlbumType::parse(raw)
                .ok_or_else(|| format!("album {id} has unknown type '{raw}'"))?,
        };
        let release_date = match p.release_date.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                ReleaseDate::parse(raw)
                    .ok_or_else(|| format!("album {id} has invalid release date '{raw}'"))?,
            ),
        };

        Ok(Album {
            id,
            name: p.name,
            release_date,
            total_tracks: p.total_tracks,
            album_type,
            artists: artist_refs(p.artists)?,
            images: p.images.into_iter().map(Image::from).collect(),
        })
    }
}

impl TryFrom<TrackPayload> for Track {
    type Error = String;

    fn try_from(p: TrackPayload) -> Result<Self, Self::Error> {
        // local files in the user's library come without an id
        let id = p
            .id
            .ok_or_else(|| format!("track '{}' has no id", p.name))?;
        let album = Album::try_from(
            p.album
                .ok_or_else(|| format!("track {id} has no album"))?,
        )?;

        Ok(Track {
            external_url: spotify_url(&p.external_urls),
            id,
            name: p.name,
            duration_ms: p.duration_ms,
            popularity: p.popularity,
            explicit: p.explicit,
            artists: artist_refs(p.artists)?,
            album,
            uri: p.uri,
        })
    }
}

/// Why a feed item could not be turned into a domain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    /// Valid item without a catalog id, such as a local file. Feeds skip it.
    Unidentified(String),
    /// Item missing data the domain needs.
    Malformed(String),
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::Unidentified(what) => write!(f, "{what} has no catalog id"),
            Rejected::Malformed(reason) => f.write_str(reason),
        }
    }
}

impl From<String> for Rejected {
    fn from(reason: String) -> Self {
        Rejected::Malformed(reason)
    }
}

impl From<Infallible> for Rejected {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

fn identified(track: TrackPayload) -> Result<Track, Rejected> {
    if track.id.is_none() {
        return Err(Rejected::Unidentified(format!("track '{}'", track.name)));
    }
    Ok(Track::try_from(track)?)
}

impl TryFrom<PlayHistoryPayload> for RecentlyPlayed {
    type Error = Rejected;

    fn try_from(p: PlayHistoryPayload) -> Result<Self, Self::Error> {
        Ok(RecentlyPlayed {
            track: identified(p.track)?,
            played_at: p.played_at,
        })
    }
}

impl TryFrom<SavedTrackPayload> for LibraryTrack {
    type Error = Rejected;

    fn try_from(p: SavedTrackPayload) -> Result<Self, Self::Error> {
        Ok(LibraryTrack {
            track: identified(p.track)?,
            added_at: p.added_at,
        })
    }
}

impl From<UserPayload> for UserProfile {
    fn from(p: UserPayload) -> Self {
        UserProfile {
            id: p.id,
            display_name: p.display_name,
            email: p.email,
            country: p.country,
            product: p.product,
            followers: p.followers.map(|f| f.total).unwrap_or_default(),
        }
    }
}

impl From<PlaylistPayload> for PlaylistSummary {
    fn from(p: PlaylistPayload) -> Self {
        PlaylistSummary {
            external_url: spotify_url(&p.external_urls),
            id: p.id,
            name: p.name,
            public: p.public.unwrap_or(false),
            track_count: p.tracks.map(|t| t.total).unwrap_or_default(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{track::mock_track, track::DatePrecision};
    use samples::*;
    use serde_json::json;

    #[test]
    fn test_track_conversion() -> anyhow::Result<()> {
        let payload: TrackPayload = serde_json::from_value(track_json("abc"))?;
        let track = Track::try_from(payload).map_err(anyhow::Error::msg)?;

        assert_eq!(track, mock_track("abc"));
        Ok(())
    }

    #[test]
    fn test_local_track_without_id_is_rejected() -> anyhow::Result<()> {
        let mut raw = track_json("abc");
        raw["id"] = json!(null);
        let payload: TrackPayload = serde_json::from_value(raw)?;

        let err = Track::try_from(payload).unwrap_err();
        assert!(err.contains("has no id"), "{err}");
        Ok(())
    }

    #[test]
    fn test_feed_item_without_id_is_unidentified() -> anyhow::Result<()> {
        let mut raw = json!({"track": track_json("abc"), "added_at": "2024-01-01T00:00:00Z"});
        raw["track"]["id"] = json!(null);
        raw["track"]["name"] = json!("home recording.mp3");
        let payload: SavedTrackPayload = serde_json::from_value(raw.clone())?;

        assert_eq!(
            LibraryTrack::try_from(payload).unwrap_err(),
            Rejected::Unidentified("track 'home recording.mp3'".to_string())
        );

        raw["track"]["id"] = json!("abc");
        raw["track"]["album"]["album_type"] = json!("mixtape");
        let payload: SavedTrackPayload = serde_json::from_value(raw)?;
        assert!(matches!(
            LibraryTrack::try_from(payload),
            Err(Rejected::Malformed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_album_year_precision_and_unknown_type() -> anyhow::Result<()> {
        let payload: AlbumPayload = serde_json::from_value(json!({
            "id": "a", "name": "Old", "release_date": "1971", "total_tracks": 8,
            "album_type": "compilation", "artists": []
        }))?;
        let album = Album::try_from(payload).map_err(anyhow::Error::msg)?;
        assert_eq!(album.album_type, AlbumType::Compilation);
        assert_eq!(album.release_date.unwrap().precision, DatePrecision::Year);

        let payload: AlbumPayload = serde_json::from_value(json!({
            "id": "a", "name": "Odd", "album_type": "mixtape"
        }))?;
        assert!(Album::try_from(payload).is_err());
        Ok(())
    }

    #[test]
    fn test_artist_conversion() -> anyhow::Result<()> {
        let payload: ArtistPayload = serde_json::from_value(artist_json("x"))?;
        let artist = Artist::from(payload);

        assert_eq!(artist.followers, 1200);
        assert_eq!(artist.genres, vec!["shoegaze".to_string()]);
        assert_eq!(artist.main_image_url(), Some("https://i.scdn.co/image/x"));
        Ok(())
    }

    #[test]
    fn test_page_with_null_next() -> anyhow::Result<()> {
        let page: Page<PlayHistoryPayload> =
            serde_json::from_value(json!({"items": [], "next": null}))?;
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_items_field_is_an_error() {
        let page = serde_json::from_value::<Page<PlayHistoryPayload>>(json!({"next": null}));
        assert!(page.is_err());
    }
}
