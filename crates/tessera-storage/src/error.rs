use tessera_core::{CursorError, ShardId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the cell storage layer.
///
/// `CellNotFound` and `DuplicateVersion` are ordinary outcomes the caller is
/// expected to branch on; everything else is an unexpected storage failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cell not found")]
    CellNotFound,

    #[error("cell already exists at this (row_key, column_name, ref_key)")]
    DuplicateVersion,

    #[error("no store registered for shard {0}")]
    NoSuchShard(ShardId),

    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("query timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// True when the error is Postgres unique-constraint violation 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
