use std::fmt::Display;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Represent a music track as returned by the provider.
///
/// Tracks are immutable once fetched; the same document is stored in the
/// `tracks` table keyed by [`Track::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub popularity: u8,
    pub explicit: bool,
    pub artists: Vec<ArtistRef>,
    pub album: Album,
    pub uri: String,
    pub external_url: Option<String>,
}

impl Track {
    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.iter().map(|a| a.name.as_str()).collect()
    }

    /// duration formatted as `m:ss`
    pub fn duration_formatted(&self) -> String {
        let total_seconds = self.duration_ms / 1000;
        format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {} ({})",
            self.name,
            self.artist_names().join(", "),
            self.duration_formatted()
        )
    }
}

/// Simplified artist embedded in tracks and albums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// Full artist object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: u8,
    pub followers: u64,
    pub images: Vec<Image>,
}

impl Artist {
    pub fn main_image_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
}

impl AlbumType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "album" => Some(Self::Album),
            "single" => Some(Self::Single),
            "compilation" => Some(Self::Compilation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// Album release date.
///
/// Some albums only carry a year (or year and month); those resolve to the
/// first day of the period and remember the precision they came with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

impl ReleaseDate {
    pub fn parse(raw: &str) -> Option<Self> {
        let parts = raw
            .split('-')
            .map(|p| p.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;

        let (year, month, day, precision) = match parts.as_slice() {
            [y] => (*y, 1, 1, DatePrecision::Year),
            [y, m] => (*y, *m, 1, DatePrecision::Month),
            [y, m, d] => (*y, *m, *d, DatePrecision::Day),
            _ => return None,
        };

        let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
        Some(Self { date, precision })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub release_date: Option<ReleaseDate>,
    pub total_tracks: u32,
    pub album_type: AlbumType,
    pub artists: Vec<ArtistRef>,
    pub images: Vec<Image>,
}

#[cfg(test)]
pub(crate) fn mock_track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {id}"),
        duration_ms: 215_000,
        popularity: 42,
        explicit: false,
        artists: vec![ArtistRef {
            id: "artist-1".to_string(),
            name: "Some Artist".to_string(),
        }],
        album: Album {
            id: "album-1".to_string(),
            name: "Some Album".to_string(),
            release_date: ReleaseDate::parse("2020-05-01"),
            total_tracks: 10,
            album_type: AlbumType::Album,
            artists: vec![ArtistRef {
                id: "artist-1".to_string(),
                name: "Some Artist".to_string(),
            }],
            images: vec![],
        },
        uri: format!("spotify:track:{id}"),
        external_url: Some(format!("https://open.spotify.com/track/{id}")),
    }
}
