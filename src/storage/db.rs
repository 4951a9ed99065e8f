use std::path::Path;

use anyhow::anyhow;
use rusqlite::Connection;

use crate::{
    config::Database,
    domain::history::{Timestamp, from_millis, to_millis},
    storage::{error::StorageError, schema},
};

pub type MillisSinceUnix = i64;

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open(path)
}

pub fn open(config: &Database) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.in_memory {
        open_in_memory()?
    } else {
        let path = config.path.as_ref().ok_or_else(|| {
            StorageError::Internal(anyhow!("database.path is required unless in_memory is set"))
        })?;
        open_from_file(path)?
    };
    schema::init(&db)?;
    Ok(db)
}

pub fn timestamp_to_millis(ts: &Timestamp) -> MillisSinceUnix {
    to_millis(ts)
}

pub fn millis_to_timestamp(ms: MillisSinceUnix) -> Result<Timestamp, StorageError> {
    from_millis(ms).ok_or(StorageError::InvalidTimestamp(ms))
}
