use std::time::Duration;

use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("database operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("player not found")]
    PlayerNotFound,
}

impl DbError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Deadlines, a lost connection and lock contention clear up on their
    /// own; any other SQLite failure will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Timeout(_) | DbError::Connection(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            DbError::Sqlite(_) | DbError::PlayerNotFound => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
