use rusqlite::Connection;

pub mod tables {
    pub const TRACKS: &str = "tracks";
    pub const RECENTLY_PLAYED: &str = "recently_played";
    pub const SAVED_TRACKS: &str = "saved_tracks";

    pub const ALL_TABLES: &[&str] = &[TRACKS, RECENTLY_PLAYED, SAVED_TRACKS];
}

pub mod columns {
    pub const TRACK_ID: &str = "track_id";
    pub const DOCUMENT: &str = "document";
    pub const USER_ID: &str = "user_id";
    pub const PLAYED_AT: &str = "played_at";
    pub const ADDED_AT: &str = "added_at";
}

// timestamps are unix milliseconds
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    track_id TEXT PRIMARY KEY,
    document TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recently_played (
    user_id TEXT NOT NULL,
    track_id TEXT NOT NULL,
    played_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, track_id, played_at)
);

CREATE INDEX IF NOT EXISTS recently_played_by_time
    ON recently_played (user_id, played_at DESC);

CREATE TABLE IF NOT EXISTS saved_tracks (
    user_id TEXT NOT NULL,
    track_id TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, track_id)
);

CREATE INDEX IF NOT EXISTS saved_tracks_by_time
    ON saved_tracks (user_id, added_at DESC);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
