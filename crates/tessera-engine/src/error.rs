//! Engine error taxonomy.
//!
//! Lower-layer errors are wrapped but preserved, so the transport adaptor can
//! branch on [`EngineError::kind`] instead of matching strings:
//! client faults map to 4xx, not-found to 404, storage to 500, and config
//! errors are fatal at startup.

use tessera_index::IndexError;
use tessera_storage::StorageError;
use tessera_trigger::{RpcError, TriggerError};
use thiserror::Error;

/// Fatal startup-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("shard config: no backends defined")]
    NoBackends,

    #[error("shard config: backend {0:?} has an empty database_url")]
    EmptyDatabaseUrl(String),

    #[error("shard config: backend {name:?} has shard_start {start} > shard_end {end}")]
    InvalidRange { name: String, start: u32, end: u32 },

    #[error("shard config: backend {name:?} shard_end {end} is outside [0, {num_shards})")]
    RangeOutOfBounds {
        name: String,
        end: u32,
        num_shards: u32,
    },

    #[error("shard config: shard {0} is covered by multiple backends")]
    ShardOverlap(u32),

    #[error("shard config: shard {0} is not covered by any backend")]
    ShardUncovered(u32),

    #[error("index config: no indexes defined")]
    NoIndexes,

    #[error("index config: index #{0} has an empty name")]
    EmptyIndexName(usize),

    #[error("index config: duplicate index name {0:?}")]
    DuplicateIndexName(String),

    #[error("index config: index {0:?} has an empty source_column")]
    EmptySourceColumn(String),

    #[error("index config: index {0:?} has an empty shard_key_field")]
    EmptyShardKeyField(String),

    #[error("index config: index {index:?} unique field {field:?} is not in fields")]
    UniqueFieldNotProjected { index: String, field: String },

    #[error("shard_config_path is not set")]
    MissingShardConfig,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("column_name must not be empty")]
    EmptyColumnName,

    #[error("invalid partition number {partition} (num_shards is {num_shards})")]
    InvalidPartition { partition: u32, num_shards: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to reach backend {name:?}: {source}")]
    BackendUnavailable {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("trigger: {0}")]
    Trigger(#[from] TriggerError),

    #[error("rpc client: {0}")]
    Rpc(#[from] RpcError),
}

/// Coarse classification for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was malformed or conflicts with existing state (4xx).
    ClientFault,
    /// The addressed cell, index, or plugin does not exist (404).
    NotFound,
    /// An unexpected storage or delivery failure (500).
    Storage,
    /// Fatal startup configuration problem.
    Config,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EmptyColumnName | EngineError::InvalidPartition { .. } => {
                ErrorKind::ClientFault
            }
            EngineError::Config(_) | EngineError::BackendUnavailable { .. } => ErrorKind::Config,
            EngineError::Storage(err) => match err {
                StorageError::DuplicateVersion | StorageError::InvalidCursor(_) => {
                    ErrorKind::ClientFault
                }
                StorageError::CellNotFound => ErrorKind::NotFound,
                _ => ErrorKind::Storage,
            },
            EngineError::Index(err) => match err {
                IndexError::UnknownIndex(_) => ErrorKind::NotFound,
                IndexError::InvalidCursor(_) => ErrorKind::ClientFault,
                _ => ErrorKind::Storage,
            },
            EngineError::Trigger(err) => match err {
                TriggerError::NameConflict(_) => ErrorKind::ClientFault,
                TriggerError::PluginNotFound(_) => ErrorKind::NotFound,
                _ => ErrorKind::Storage,
            },
            EngineError::Rpc(_) => ErrorKind::Storage,
        }
    }
}
