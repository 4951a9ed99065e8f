use anyhow::anyhow;
use log::info;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    config::HttpConfig,
    domain::{
        history::{
            PlayEvent, PlayKey, PlayedCursor, SavedKey, SavedTrack, Timestamp, from_millis,
            normalize,
        },
        profile::{TimeRange, UserProfile},
        track::Track,
    },
    http::{error::ApiError, views},
    mirror::{self, MirrorOutcome, MirrorReport},
    spotify::client::{MAX_LIMIT, SpotifyClient},
    storage::{error::StorageError, operations::Storage},
};

pub const DEFAULT_LIMIT: u32 = 20;

pub struct HttpServer {
    storage: Arc<Mutex<Storage>>,
    spotify: Arc<SpotifyClient>,
    pub config: HttpConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayEventBody {
    user_id: String,
    track_id: String,
    played_at: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedTrackBody {
    user_id: String,
    track_id: String,
    added_at: Timestamp,
}

/// Result of a sync request.
#[derive(Debug, Serialize, Deserialize)]
struct SyncResponse<R> {
    user_id: String,
    /// records added by this sync, newest first
    added: Vec<R>,
    /// records stored for the user after the sync
    total: usize,
    /// whether the sync stopped at an already stored record
    caught_up: bool,
}

impl<R> SyncResponse<R> {
    fn from_report<K>(user_id: String, report: MirrorReport<K, R>) -> Self {
        Self {
            user_id,
            total: report.snapshot.len(),
            caught_up: matches!(report.outcome, MirrorOutcome::Overlap(_)),
            added: report.added,
        }
    }
}

/// What the client currently caches.
#[derive(Debug, Serialize, Deserialize)]
struct CacheState {
    profile: Option<UserProfile>,
}

fn respond(result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(ApiError::into_response)
}

fn parse_limit(request: &Request) -> Result<u32, ApiError> {
    let Some(raw) = request.get_param("limit") else {
        return Ok(DEFAULT_LIMIT);
    };
    match raw.parse::<u32>() {
        Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(ApiError::BadRequest(format!(
            "limit must be an integer between 1 and {MAX_LIMIT}, got '{raw}'"
        ))),
    }
}

fn parse_time_range(request: &Request) -> Result<TimeRange, ApiError> {
    match request.get_param("time_range") {
        None => Ok(TimeRange::default()),
        Some(raw) => raw.parse().map_err(ApiError::BadRequest),
    }
}

/// Optional `after`/`before` query parameters, unix milliseconds.
fn parse_cursor(request: &Request) -> Result<Option<PlayedCursor>, ApiError> {
    let millis = |name: &str| -> Result<Option<i64>, ApiError> {
        request
            .get_param(name)
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ApiError::BadRequest(format!("{name} must be unix milliseconds, got '{raw}'"))
                })
            })
            .transpose()
    };
    PlayedCursor::from_millis(millis("after")?, millis("before")?).map_err(ApiError::BadRequest)
}

/// Play time in a path, either unix milliseconds or RFC 3339.
fn parse_played_at(raw: &str) -> Result<Timestamp, ApiError> {
    raw.parse::<i64>()
        .ok()
        .and_then(from_millis)
        .or_else(|| raw.parse::<Timestamp>().ok())
        .map(normalize)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "played_at must be unix milliseconds or RFC 3339, got '{raw}'"
            ))
        })
}

fn json_body<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, ApiError> {
    rouille::input::json_input(request)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

fn created_or_conflict<T: Serialize>(stored: bool, body: &T, what: &str) -> Response {
    if stored {
        Response::json(body).with_status_code(201)
    } else {
        ApiError::Conflict(format!("{what} already exists")).into_response()
    }
}

impl HttpServer {
    pub fn new(storage: Storage, spotify: SpotifyClient, config: HttpConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            spotify: Arc::new(spotify),
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (GET) (/) => { respond(self.handle_profile_page()) },
            (GET) (/top_tracks) => { respond(self.handle_top_tracks_page()) },
            (GET) (/top_artists) => { respond(self.handle_top_artists_page()) },
            (GET) (/saved_tracks) => { respond(self.handle_saved_tracks_page(request)) },

            (GET) (/cache) => { respond(self.handle_cache()) },
            (POST) (/cache/clear) => { respond(self.handle_clear_cache()) },

            (GET) (/me) => { respond(self.handle_me()) },
            (GET) (/top/tracks) => { respond(self.handle_top_tracks(request)) },
            (GET) (/top/artists) => { respond(self.handle_top_artists(request)) },

            (POST) (/recently_played/sync) => {
                respond(self.handle_sync_recently_played(request))
            },
            (POST) (/recently_played) => { respond(self.handle_store_play(request)) },
            (GET) (/recently_played/{user_id: String}) => {
                respond(self.handle_list_plays(&user_id, request))
            },
            (DELETE) (/recently_played/{user_id: String}) => {
                respond(self.handle_delete_plays(&user_id))
            },
            (GET) (/recently_played/{user_id: String}/{track_id: String}/{played_at: String}) => {
                respond(self.handle_get_play(user_id, track_id, &played_at))
            },
            (DELETE) (/recently_played/{user_id: String}/{track_id: String}/{played_at: String}) => {
                respond(self.handle_delete_play(user_id, track_id, &played_at))
            },

            (POST) (/saved_tracks/sync) => { respond(self.handle_sync_saved_tracks()) },
            (POST) (/saved_tracks) => { respond(self.handle_store_saved(request)) },
            (GET) (/saved_tracks/{user_id: String}) => {
                respond(self.handle_list_saved(&user_id, request))
            },
            (DELETE) (/saved_tracks/{user_id: String}) => {
                respond(self.handle_delete_all_saved(&user_id))
            },
            (GET) (/saved_tracks/{user_id: String}/{track_id: String}) => {
                respond(self.handle_get_saved(user_id, track_id))
            },
            (DELETE) (/saved_tracks/{user_id: String}/{track_id: String}) => {
                respond(self.handle_delete_saved(user_id, track_id))
            },

            (POST) (/tracks) => { respond(self.handle_store_track(request)) },
            (GET) (/tracks) => { respond(self.handle_list_tracks()) },
            (GET) (/tracks/{track_id: String}) => { respond(self.handle_get_track(&track_id)) },
            (DELETE) (/tracks/{track_id: String}) => {
                respond(self.handle_delete_track(&track_id))
            },

            _ => Response::empty_404()
        );

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn storage(&self) -> Result<MutexGuard<'_, Storage>, ApiError> {
        self.storage.lock().map_err(|e| {
            StorageError::Internal(anyhow!("Could not access storage under lock: {e}")).into()
        })
    }

    // ---------------------------------------------------------------
    // pages
    // ---------------------------------------------------------------

    fn handle_profile_page(&self) -> Result<Response, ApiError> {
        let profile = self.spotify.current_user()?;
        Ok(Response::html(views::profile_page(&profile)))
    }

    fn handle_top_tracks_page(&self) -> Result<Response, ApiError> {
        let sections = TimeRange::ALL
            .iter()
            .map(|&range| -> Result<_, ApiError> {
                Ok((range, self.spotify.top_tracks(range, views::TOP_PER_RANGE)?))
            })
            .collect::<Result<Vec<_>, ApiError>>()?;
        Ok(Response::html(views::top_tracks_page(&sections)))
    }

    fn handle_top_artists_page(&self) -> Result<Response, ApiError> {
        let sections = TimeRange::ALL
            .iter()
            .map(|&range| -> Result<_, ApiError> {
                Ok((range, self.spotify.top_artists(range, views::TOP_PER_RANGE)?))
            })
            .collect::<Result<Vec<_>, ApiError>>()?;
        Ok(Response::html(views::top_artists_page(&sections)))
    }

    fn handle_saved_tracks_page(&self, request: &Request) -> Result<Response, ApiError> {
        let limit = parse_limit(request)?;
        let profile = self.spotify.current_user()?;

        let entries = {
            let mut storage = self.storage()?;
            storage
                .list_saved_tracks(&profile.id, limit)?
                .into_iter()
                .map(|saved| {
                    let track = storage.get_track(&saved.track_id)?;
                    Ok((saved, track))
                })
                .collect::<Result<Vec<_>, StorageError>>()?
        };
        Ok(Response::html(views::saved_tracks_page(&profile, &entries)))
    }

    // ---------------------------------------------------------------
    // provider passthrough
    // ---------------------------------------------------------------

    fn handle_me(&self) -> Result<Response, ApiError> {
        Ok(Response::json(&self.spotify.current_user()?))
    }

    fn handle_top_tracks(&self, request: &Request) -> Result<Response, ApiError> {
        let range = parse_time_range(request)?;
        let limit = parse_limit(request)?;
        Ok(Response::json(&self.spotify.top_tracks(range, limit)?))
    }

    fn handle_top_artists(&self, request: &Request) -> Result<Response, ApiError> {
        let range = parse_time_range(request)?;
        let limit = parse_limit(request)?;
        Ok(Response::json(&self.spotify.top_artists(range, limit)?))
    }

    fn handle_cache(&self) -> Result<Response, ApiError> {
        Ok(Response::json(&CacheState {
            profile: self.spotify.cached_profile(),
        }))
    }

    fn handle_clear_cache(&self) -> Result<Response, ApiError> {
        self.spotify.clear_cache();
        Ok(Response::json(&true))
    }

    // ---------------------------------------------------------------
    // recently played
    // ---------------------------------------------------------------

    fn handle_list_plays(&self, user_id: &str, request: &Request) -> Result<Response, ApiError> {
        let limit = parse_limit(request)?;
        let cursor = parse_cursor(request)?;
        let plays = self.storage()?.list_plays(user_id, cursor, limit)?;
        Ok(Response::json(&plays))
    }

    fn handle_get_play(
        &self,
        user_id: String,
        track_id: String,
        played_at: &str,
    ) -> Result<Response, ApiError> {
        let key = PlayKey {
            user_id,
            track_id,
            played_at: parse_played_at(played_at)?,
        };
        match self.storage()?.get_play(&key)? {
            Some(play) => Ok(Response::json(&play)),
            None => Err(ApiError::NotFound(format!(
                "play of {} by {} at {} not found",
                key.track_id, key.user_id, key.played_at
            ))),
        }
    }

    fn handle_delete_play(
        &self,
        user_id: String,
        track_id: String,
        played_at: &str,
    ) -> Result<Response, ApiError> {
        let key = PlayKey {
            user_id,
            track_id,
            played_at: parse_played_at(played_at)?,
        };
        self.storage()?.delete_play(&key)?;
        Ok(Response::json(&true))
    }

    fn handle_store_play(&self, request: &Request) -> Result<Response, ApiError> {
        let body: PlayEventBody = json_body(request)?;
        let play = PlayEvent::new(body.user_id, body.track_id, body.played_at);
        let stored = self.storage()?.store_play(&play)?;
        Ok(created_or_conflict(stored, &play, "play"))
    }

    fn handle_delete_plays(&self, user_id: &str) -> Result<Response, ApiError> {
        self.storage()?.delete_all_plays(user_id)?;
        Ok(Response::json(&true))
    }

    fn handle_sync_recently_played(&self, request: &Request) -> Result<Response, ApiError> {
        let cursor = parse_cursor(request)?;
        let user = self.spotify.current_user()?;
        let mut store: &Mutex<Storage> = &self.storage;
        let report = mirror::sync_recently_played(&self.spotify, &mut store, &user.id, cursor)?;
        Ok(Response::json(&SyncResponse::from_report(user.id, report)))
    }

    // ---------------------------------------------------------------
    // saved tracks
    // ---------------------------------------------------------------

    fn handle_list_saved(&self, user_id: &str, request: &Request) -> Result<Response, ApiError> {
        let limit = parse_limit(request)?;
        let saved = self.storage()?.list_saved_tracks(user_id, limit)?;
        Ok(Response::json(&saved))
    }

    fn handle_store_saved(&self, request: &Request) -> Result<Response, ApiError> {
        let body: SavedTrackBody = json_body(request)?;
        let saved = SavedTrack::new(body.user_id, body.track_id, body.added_at);
        let stored = self.storage()?.store_saved_track(&saved)?;
        Ok(created_or_conflict(stored, &saved, "saved track"))
    }

    fn handle_get_saved(&self, user_id: String, track_id: String) -> Result<Response, ApiError> {
        let key = SavedKey { user_id, track_id };
        match self.storage()?.get_saved_track(&key)? {
            Some(saved) => Ok(Response::json(&saved)),
            None => Err(ApiError::NotFound(format!(
                "saved track {} of {} not found",
                key.track_id, key.user_id
            ))),
        }
    }

    fn handle_delete_all_saved(&self, user_id: &str) -> Result<Response, ApiError> {
        self.storage()?.delete_all_saved_tracks(user_id)?;
        Ok(Response::json(&true))
    }

    fn handle_delete_saved(&self, user_id: String, track_id: String) -> Result<Response, ApiError> {
        self.storage()?
            .delete_saved_track(&SavedKey { user_id, track_id })?;
        Ok(Response::json(&true))
    }

    fn handle_sync_saved_tracks(&self) -> Result<Response, ApiError> {
        let user = self.spotify.current_user()?;
        let mut store: &Mutex<Storage> = &self.storage;
        let report = mirror::sync_saved_tracks(&self.spotify, &mut store, &user.id)?;
        Ok(Response::json(&SyncResponse::from_report(user.id, report)))
    }

    // ---------------------------------------------------------------
    // tracks
    // ---------------------------------------------------------------

    fn handle_store_track(&self, request: &Request) -> Result<Response, ApiError> {
        let track: Track = json_body(request)?;
        if track.id.is_empty() {
            return Err(ApiError::BadRequest("track id must not be empty".into()));
        }
        let stored = self.storage()?.store_track(&track)?;
        Ok(created_or_conflict(stored, &track, "track"))
    }

    fn handle_list_tracks(&self) -> Result<Response, ApiError> {
        Ok(Response::json(&self.storage()?.list_tracks()?))
    }

    fn handle_get_track(&self, track_id: &str) -> Result<Response, ApiError> {
        match self.storage()?.get_track(track_id)? {
            Some(track) => Ok(Response::json(&track)),
            None => Err(ApiError::NotFound(format!("track {track_id} not found"))),
        }
    }

    fn handle_delete_track(&self, track_id: &str) -> Result<Response, ApiError> {
        self.storage()?.delete_track(track_id)?;
        Ok(Response::json(&true))
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
