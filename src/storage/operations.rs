use std::collections::HashMap;

use crate::{
    config,
    domain::{
        history::{PlayEvent, PlayKey, PlayedCursor, SavedKey, SavedTrack},
        track::Track,
    },
    storage::{
        db::{self, MillisSinceUnix, millis_to_timestamp, timestamp_to_millis},
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use rusqlite::{OptionalExtension, Transaction, params};
use tables::*;

/// Main structure that implements all storage logic
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
}

type PlayRow = (String, String, MillisSinceUnix);
type SavedRow = (String, String, MillisSinceUnix);

fn play_from_row((user_id, track_id, played_at): PlayRow) -> Result<PlayEvent, StorageError> {
    Ok(PlayEvent {
        user_id,
        track_id,
        played_at: millis_to_timestamp(played_at)?,
    })
}

fn saved_from_row((user_id, track_id, added_at): SavedRow) -> Result<SavedTrack, StorageError> {
    Ok(SavedTrack {
        user_id,
        track_id,
        added_at: millis_to_timestamp(added_at)?,
    })
}

fn insert_play(tx: &Transaction, play: &PlayEvent) -> Result<bool, StorageError> {
    let inserted = tx.execute(
        &format!(
            "INSERT OR IGNORE INTO {RECENTLY_PLAYED} ({USER_ID}, {TRACK_ID}, {PLAYED_AT})
             VALUES (?1, ?2, ?3)"
        ),
        params![
            play.user_id,
            play.track_id,
            timestamp_to_millis(&play.played_at)
        ],
    )?;
    Ok(inserted == 1)
}

fn insert_saved(tx: &Transaction, saved: &SavedTrack) -> Result<bool, StorageError> {
    let inserted = tx.execute(
        &format!(
            "INSERT OR IGNORE INTO {SAVED_TRACKS} ({USER_ID}, {TRACK_ID}, {ADDED_AT})
             VALUES (?1, ?2, ?3)"
        ),
        params![
            saved.user_id,
            saved.track_id,
            timestamp_to_millis(&saved.added_at)
        ],
    )?;
    Ok(inserted == 1)
}

/// Writes the latest known document for a track, replacing an older one.
fn upsert_track(tx: &Transaction, track: &Track) -> Result<(), StorageError> {
    tx.execute(
        &format!(
            "INSERT INTO {TRACKS} ({TRACK_ID}, {DOCUMENT}) VALUES (?1, ?2)
             ON CONFLICT({TRACK_ID}) DO UPDATE SET {DOCUMENT} = excluded.{DOCUMENT}"
        ),
        params![track.id, serde_json::to_string(track)?],
    )?;
    Ok(())
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(db_config: &config::Database) -> Result<Self, StorageError> {
        let db: rusqlite::Connection = db::open(db_config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    // ---------------------------------------------------------------
    // tracks
    // ---------------------------------------------------------------

    /// Stores a track document. Returns `false` if the id is already taken.
    pub fn store_track(&mut self, track: &Track) -> Result<bool, StorageError> {
        let document = serde_json::to_string(track)?;
        let tx = self.db.transaction()?;
        let inserted = tx.execute(
            &format!("INSERT OR IGNORE INTO {TRACKS} ({TRACK_ID}, {DOCUMENT}) VALUES (?1, ?2)"),
            params![track.id, document],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    pub fn get_track(&mut self, track_id: &str) -> Result<Option<Track>, StorageError> {
        let document: Option<String> = self
            .db
            .query_row(
                &format!("SELECT {DOCUMENT} FROM {TRACKS} WHERE {TRACK_ID} = ?1"),
                params![track_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(document
            .map(|doc| serde_json::from_str::<Track>(&doc))
            .transpose()?)
    }

    pub fn list_tracks(&mut self) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {DOCUMENT} FROM {TRACKS} ORDER BY {TRACK_ID}"
        ))?;
        let documents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }

    pub fn delete_track(&mut self, track_id: &str) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {TRACKS} WHERE {TRACK_ID} = ?1"),
            params![track_id],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    // ---------------------------------------------------------------
    // recently played
    // ---------------------------------------------------------------

    /// Returns `false` without writing if this exact play is already stored.
    pub fn store_play(&mut self, play: &PlayEvent) -> Result<bool, StorageError> {
        let tx = self.db.transaction()?;
        let inserted = insert_play(&tx, play)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Stores a play together with the document of the played track.
    /// Nothing is written when the play is already stored.
    pub fn store_play_with_track(
        &mut self,
        play: &PlayEvent,
        track: &Track,
    ) -> Result<bool, StorageError> {
        let tx = self.db.transaction()?;
        let inserted = insert_play(&tx, play)?;
        if inserted {
            upsert_track(&tx, track)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_play(&mut self, key: &PlayKey) -> Result<Option<PlayEvent>, StorageError> {
        let row: Option<PlayRow> = self
            .db
            .query_row(
                &format!(
                    "SELECT {USER_ID}, {TRACK_ID}, {PLAYED_AT} FROM {RECENTLY_PLAYED}
                     WHERE {USER_ID} = ?1 AND {TRACK_ID} = ?2 AND {PLAYED_AT} = ?3"
                ),
                params![
                    key.user_id,
                    key.track_id,
                    timestamp_to_millis(&key.played_at)
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(play_from_row).transpose()
    }

    /// Most recent plays of a user, newest first, optionally only those on
    /// the cursor's side.
    pub fn list_plays(
        &mut self,
        user_id: &str,
        cursor: Option<PlayedCursor>,
        limit: u32,
    ) -> Result<Vec<PlayEvent>, StorageError> {
        let (op, millis) = match cursor {
            None => ("<=", MillisSinceUnix::MAX),
            Some(PlayedCursor::After(ts)) => (">", timestamp_to_millis(&ts)),
            Some(PlayedCursor::Before(ts)) => ("<", timestamp_to_millis(&ts)),
        };
        let mut stmt = self.db.prepare(&format!(
            "SELECT {USER_ID}, {TRACK_ID}, {PLAYED_AT} FROM {RECENTLY_PLAYED}
             WHERE {USER_ID} = ?1 AND {PLAYED_AT} {op} ?3
             ORDER BY {PLAYED_AT} DESC, {TRACK_ID}
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, i64::from(limit), millis], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<PlayRow>, _>>()?;

        rows.into_iter().map(play_from_row).collect()
    }

    pub fn delete_play(&mut self, key: &PlayKey) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let removed = tx.execute(
            &format!(
                "DELETE FROM {RECENTLY_PLAYED}
                 WHERE {USER_ID} = ?1 AND {TRACK_ID} = ?2 AND {PLAYED_AT} = ?3"
            ),
            params![
                key.user_id,
                key.track_id,
                timestamp_to_millis(&key.played_at)
            ],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn delete_all_plays(&mut self, user_id: &str) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {RECENTLY_PLAYED} WHERE {USER_ID} = ?1"),
            params![user_id],
        )?;
        tx.commit()?;
        log::info!("Removed {removed} plays of user {user_id}");
        Ok(removed)
    }

    /// Every stored play of a user, by key.
    pub fn play_snapshot(
        &mut self,
        user_id: &str,
    ) -> Result<HashMap<PlayKey, PlayEvent>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {USER_ID}, {TRACK_ID}, {PLAYED_AT} FROM {RECENTLY_PLAYED} WHERE {USER_ID} = ?1"
        ))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<PlayRow>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let play = play_from_row(row)?;
                Ok((play.key(), play))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // saved tracks
    // ---------------------------------------------------------------

    /// Returns `false` without writing if the user already saved the track.
    pub fn store_saved_track(&mut self, saved: &SavedTrack) -> Result<bool, StorageError> {
        let tx = self.db.transaction()?;
        let inserted = insert_saved(&tx, saved)?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn store_saved_with_track(
        &mut self,
        saved: &SavedTrack,
        track: &Track,
    ) -> Result<bool, StorageError> {
        let tx = self.db.transaction()?;
        let inserted = insert_saved(&tx, saved)?;
        if inserted {
            upsert_track(&tx, track)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_saved_track(&mut self, key: &SavedKey) -> Result<Option<SavedTrack>, StorageError> {
        let row: Option<SavedRow> = self
            .db
            .query_row(
                &format!(
                    "SELECT {USER_ID}, {TRACK_ID}, {ADDED_AT} FROM {SAVED_TRACKS}
                     WHERE {USER_ID} = ?1 AND {TRACK_ID} = ?2"
                ),
                params![key.user_id, key.track_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(saved_from_row).transpose()
    }

    /// Most recently saved tracks of a user, newest first.
    pub fn list_saved_tracks(
        &mut self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<SavedTrack>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {USER_ID}, {TRACK_ID}, {ADDED_AT} FROM {SAVED_TRACKS}
             WHERE {USER_ID} = ?1
             ORDER BY {ADDED_AT} DESC, {TRACK_ID}
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, i64::from(limit)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<SavedRow>, _>>()?;

        rows.into_iter().map(saved_from_row).collect()
    }

    pub fn delete_saved_track(&mut self, key: &SavedKey) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {SAVED_TRACKS} WHERE {USER_ID} = ?1 AND {TRACK_ID} = ?2"),
            params![key.user_id, key.track_id],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn delete_all_saved_tracks(&mut self, user_id: &str) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {SAVED_TRACKS} WHERE {USER_ID} = ?1"),
            params![user_id],
        )?;
        tx.commit()?;
        log::info!("Removed {removed} saved tracks of user {user_id}");
        Ok(removed)
    }

    pub fn saved_snapshot(
        &mut self,
        user_id: &str,
    ) -> Result<HashMap<SavedKey, SavedTrack>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {USER_ID}, {TRACK_ID}, {ADDED_AT} FROM {SAVED_TRACKS} WHERE {USER_ID} = ?1"
        ))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<SavedRow>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let saved = saved_from_row(row)?;
                Ok((saved.key(), saved))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{TimeZone, Utc};
    use rusqlite::params;
    use tempfile::tempdir;

    use super::*;
    use crate::{domain::history::Timestamp, domain::track::mock_track, storage::schema};

    pub(crate) fn setup_storage() -> anyhow::Result<Storage> {
        let conn = rusqlite::Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Storage::from_existing_conn(conn))
    }

    pub(crate) fn at(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    fn count(storage: &Storage, table: &str) -> anyhow::Result<i64> {
        Ok(storage
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    }

    #[test]
    fn test_store_and_get_track() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let track = mock_track("t1");

        assert!(storage.store_track(&track)?);
        assert_eq!(storage.get_track("t1")?, Some(track));
        assert_eq!(storage.get_track("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_store_track_twice_is_rejected() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let track = mock_track("t1");
        let mut renamed = track.clone();
        renamed.name = "Renamed".to_string();

        assert!(storage.store_track(&track)?);
        assert!(!storage.store_track(&renamed)?);
        assert_eq!(storage.get_track("t1")?.unwrap().name, track.name);
        Ok(())
    }

    #[test]
    fn test_list_and_delete_tracks() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.store_track(&mock_track("b"))?;
        storage.store_track(&mock_track("a"))?;

        let ids = storage
            .list_tracks()?
            .into_iter()
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);

        assert_eq!(storage.delete_track("a")?, 1);
        assert_eq!(storage.delete_track("a")?, 0);
        assert_eq!(storage.list_tracks()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_document_is_an_error() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.db.execute(
            &format!("INSERT INTO {TRACKS} ({TRACK_ID}, {DOCUMENT}) VALUES (?1, ?2)"),
            params!["bad", "{not json"],
        )?;

        assert!(matches!(
            storage.get_track("bad"),
            Err(StorageError::Document(_))
        ));
        Ok(())
    }

    #[test]
    fn test_play_round_trip() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let play = PlayEvent::new("u1", "t1", at(5));

        assert!(storage.store_play(&play)?);
        assert_eq!(storage.get_play(&play.key())?, Some(play.clone()));
        assert_eq!(storage.list_plays("u1", None, 20)?, vec![play]);
        Ok(())
    }

    #[test]
    fn test_sub_millisecond_precision_is_dropped() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let precise = Utc.timestamp_nanos(1_709_294_400_123_456_789);
        let play = PlayEvent::new("u1", "t1", precise);

        storage.store_play(&play)?;
        let stored = storage.get_play(&play.key())?.unwrap();

        assert_eq!(stored.played_at.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(stored, play);
        Ok(())
    }

    #[test]
    fn test_store_play_is_idempotent() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let play = PlayEvent::new("u1", "t1", at(5));

        assert!(storage.store_play(&play)?);
        assert!(!storage.store_play(&play)?);
        assert_eq!(count(&storage, RECENTLY_PLAYED)?, 1);

        // same track played again later is a separate record
        assert!(storage.store_play(&PlayEvent::new("u1", "t1", at(9)))?);
        assert_eq!(count(&storage, RECENTLY_PLAYED)?, 2);
        Ok(())
    }

    #[test]
    fn test_list_plays_newest_first_with_limit() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        for (track, minute) in [("a", 1), ("b", 3), ("c", 2)] {
            storage.store_play(&PlayEvent::new("u1", track, at(minute)))?;
        }
        storage.store_play(&PlayEvent::new("u2", "z", at(59)))?;

        let tracks = storage
            .list_plays("u1", None, 2)?
            .into_iter()
            .map(|p| p.track_id)
            .collect::<Vec<_>>();

        assert_eq!(tracks, vec!["b", "c"]);
        assert!(storage.list_plays("nobody", None, 20)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_plays_around_cursor() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        for (track, minute) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            storage.store_play(&PlayEvent::new("u1", track, at(minute)))?;
        }
        let ids = |plays: Vec<PlayEvent>| plays.into_iter().map(|p| p.track_id).collect::<Vec<_>>();

        let after = storage.list_plays("u1", Some(PlayedCursor::After(at(2))), 50)?;
        assert_eq!(ids(after), vec!["d", "c"]);

        let before = storage.list_plays("u1", Some(PlayedCursor::Before(at(3))), 1)?;
        assert_eq!(ids(before), vec!["b"]);
        Ok(())
    }

    #[test]
    fn test_list_plays_with_largest_limit_returns_everything() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        for minute in 0..3 {
            storage.store_play(&PlayEvent::new("u1", "t", at(minute)))?;
        }

        assert_eq!(storage.list_plays("u1", None, u32::MAX)?.len(), 3);
        assert_eq!(storage.list_saved_tracks("u1", u32::MAX)?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_delete_all_plays_then_list() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.store_play(&PlayEvent::new("u1", "a", at(1)))?;
        storage.store_play(&PlayEvent::new("u1", "b", at(2)))?;
        storage.store_play(&PlayEvent::new("u2", "c", at(3)))?;

        assert_eq!(storage.delete_all_plays("u1")?, 2);
        assert!(storage.list_plays("u1", None, 50)?.is_empty());
        assert_eq!(storage.list_plays("u2", None, 50)?.len(), 1);
        assert_eq!(storage.delete_all_plays("u1")?, 0);
        Ok(())
    }

    #[test]
    fn test_delete_single_play() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let first = PlayEvent::new("u1", "a", at(1));
        let second = PlayEvent::new("u1", "a", at(2));
        storage.store_play(&first)?;
        storage.store_play(&second)?;

        assert_eq!(storage.delete_play(&first.key())?, 1);
        assert_eq!(storage.list_plays("u1", None, 50)?, vec![second]);
        Ok(())
    }

    #[test]
    fn test_play_snapshot_is_per_user() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let mine = PlayEvent::new("u1", "a", at(1));
        storage.store_play(&mine)?;
        storage.store_play(&PlayEvent::new("u2", "a", at(1)))?;

        let snapshot = storage.play_snapshot("u1")?;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&mine.key()), Some(&mine));
        Ok(())
    }

    #[test]
    fn test_store_play_with_track_writes_both() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let play = PlayEvent::new("u1", "t1", at(1));
        let mut track = mock_track("t1");

        assert!(storage.store_play_with_track(&play, &track)?);

        track.popularity = 90;
        assert!(!storage.store_play_with_track(&play, &track)?);
        assert_eq!(storage.get_track("t1")?.unwrap().popularity, 42);

        let later = PlayEvent::new("u1", "t1", at(2));
        assert!(storage.store_play_with_track(&later, &track)?);
        assert_eq!(storage.get_track("t1")?.unwrap().popularity, 90);
        Ok(())
    }

    #[test]
    fn test_saved_track_round_trip() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let saved = SavedTrack::new("u1", "t1", at(1));

        assert!(storage.store_saved_track(&saved)?);
        assert!(!storage.store_saved_track(&SavedTrack::new("u1", "t1", at(7)))?);

        assert_eq!(storage.get_saved_track(&saved.key())?, Some(saved.clone()));
        assert_eq!(storage.saved_snapshot("u1")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_saved_tracks_list_and_delete() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        for (track, minute) in [("a", 1), ("b", 2), ("c", 3)] {
            storage.store_saved_track(&SavedTrack::new("u1", track, at(minute)))?;
        }

        let newest = storage.list_saved_tracks("u1", 2)?;
        assert_eq!(newest[0].track_id, "c");
        assert_eq!(newest[1].track_id, "b");

        let key = SavedKey {
            user_id: "u1".to_string(),
            track_id: "c".to_string(),
        };
        assert_eq!(storage.delete_saved_track(&key)?, 1);
        assert_eq!(storage.get_saved_track(&key)?, None);

        assert_eq!(storage.delete_all_saved_tracks("u1")?, 2);
        assert!(storage.list_saved_tracks("u1", 50)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_store_saved_with_track() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let saved = SavedTrack::new("u1", "t1", at(1));

        assert!(storage.store_saved_with_track(&saved, &mock_track("t1"))?);
        assert!(!storage.store_saved_with_track(&saved, &mock_track("t1"))?);
        assert_eq!(count(&storage, TRACKS)?, 1);
        assert_eq!(count(&storage, SAVED_TRACKS)?, 1);
        Ok(())
    }

    #[test]
    fn test_data_survives_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = config::Database {
            in_memory: false,
            path: Some(dir.path().join("mirror.db")),
        };
        let play = PlayEvent::new("u1", "t1", at(1));

        {
            let mut storage = Storage::new(&config)?;
            storage.store_play_with_track(&play, &mock_track("t1"))?;
        }

        let mut storage = Storage::new(&config)?;
        assert_eq!(storage.list_plays("u1", None, 20)?, vec![play]);
        assert!(storage.get_track("t1")?.is_some());
        Ok(())
    }
}
