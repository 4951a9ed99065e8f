//! Listening history records mirrored from the provider.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::track::Track;

pub type Timestamp = DateTime<Utc>;

/// Timestamps are kept with millisecond precision, the resolution the
/// provider reports and the one stored in the database.
pub fn normalize(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(3)
}

pub fn to_millis(ts: &Timestamp) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(ms)
}

/// One play of a track by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayEvent {
    pub user_id: String,
    pub track_id: String,
    pub played_at: Timestamp,
}

impl PlayEvent {
    pub fn new(user_id: impl Into<String>, track_id: impl Into<String>, played_at: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            track_id: track_id.into(),
            played_at: normalize(played_at),
        }
    }

    pub fn key(&self) -> PlayKey {
        PlayKey {
            user_id: self.user_id.clone(),
            track_id: self.track_id.clone(),
            played_at: self.played_at,
        }
    }
}

/// Natural key of a [`PlayEvent`].
///
/// The timestamp is part of the key, so repeated listens of the same track
/// are separate records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayKey {
    pub user_id: String,
    pub track_id: String,
    pub played_at: Timestamp,
}

/// A track the user saved to their library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavedTrack {
    pub user_id: String,
    pub track_id: String,
    pub added_at: Timestamp,
}

impl SavedTrack {
    pub fn new(user_id: impl Into<String>, track_id: impl Into<String>, added_at: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            track_id: track_id.into(),
            added_at: normalize(added_at),
        }
    }

    pub fn key(&self) -> SavedKey {
        SavedKey {
            user_id: self.user_id.clone(),
            track_id: self.track_id.clone(),
        }
    }
}

/// Natural key of a [`SavedTrack`]: a track is saved at most once per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavedKey {
    pub user_id: String,
    pub track_id: String,
}

/// Bound on the play time of a recently played window.
///
/// The provider accepts one of the two per request, both in unix
/// milliseconds and both exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayedCursor {
    /// plays strictly after this moment
    After(Timestamp),
    /// plays strictly before this moment
    Before(Timestamp),
}

impl PlayedCursor {
    /// Builds a cursor from optional `after`/`before` unix milliseconds.
    /// At most one may be given.
    pub fn from_millis(after: Option<i64>, before: Option<i64>) -> Result<Option<Self>, String> {
        let at = |ms: i64| from_millis(ms).ok_or_else(|| format!("timestamp {ms} is out of range"));
        match (after, before) {
            (None, None) => Ok(None),
            (Some(ms), None) => Ok(Some(PlayedCursor::After(at(ms)?))),
            (None, Some(ms)) => Ok(Some(PlayedCursor::Before(at(ms)?))),
            (Some(_), Some(_)) => Err("only one of after and before may be given".to_string()),
        }
    }

    /// Query parameter in the provider's format, e.g. `after=1709294400000`.
    pub fn query(&self) -> String {
        match self {
            PlayedCursor::After(ts) => format!("after={}", to_millis(ts)),
            PlayedCursor::Before(ts) => format!("before={}", to_millis(ts)),
        }
    }

    pub fn contains(&self, played_at: &Timestamp) -> bool {
        match self {
            PlayedCursor::After(ts) => played_at > ts,
            PlayedCursor::Before(ts) => played_at < ts,
        }
    }
}

/// Item of the provider's recently played feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentlyPlayed {
    pub track: Track,
    pub played_at: Timestamp,
}

impl RecentlyPlayed {
    pub fn to_play_event(&self, user_id: &str) -> PlayEvent {
        PlayEvent::new(user_id, self.track.id.clone(), self.played_at)
    }
}

/// Item of the provider's saved tracks feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTrack {
    pub track: Track,
    pub added_at: Timestamp,
}

impl LibraryTrack {
    pub fn to_saved_track(&self, user_id: &str) -> SavedTrack {
        SavedTrack::new(user_id, self.track.id.clone(), self.added_at)
    }
}
