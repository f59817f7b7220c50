use tessera_core::{CursorError, ShardId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("shard key field {0:?} is missing or not a string")]
    BadShardKey(String),

    #[error("cell body is not a JSON object")]
    BodyNotObject,

    #[error("an entry with this unique field value already exists")]
    DuplicateUniqueField,

    #[error("no index named {0:?}")]
    UnknownIndex(String),

    #[error("index {index:?} has no store for shard {shard}")]
    NoStoreForShard { index: String, shard: ShardId },

    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("query timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// An index write that failed for one definition. The cell write it derives
/// from stands regardless; the coordinator logs and counts these.
#[derive(Debug)]
pub struct IndexFault {
    /// Name of the index definition whose write failed.
    pub index: String,
    pub error: IndexError,
}
