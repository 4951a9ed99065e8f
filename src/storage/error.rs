use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored document is not valid: {0}")]
    Document(#[from] serde_json::Error),

    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
