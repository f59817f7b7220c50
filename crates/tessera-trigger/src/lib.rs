//! Tessera Trigger Pipeline
//!
//! Every accepted cell write fans out to external subscribers ("plugins")
//! over JSON-RPC 2.0. This crate owns the whole path:
//!
//! - [`PluginRegistry`]: the in-memory catalog of subscribers, write-through
//!   to a durable [`PluginStore`] so registrations survive restarts
//! - [`RpcClient`]: JSON-RPC 2.0 over HTTP POST with bounded
//!   exponential-backoff retry
//! - [`Notifier`]: the fan-out — one detached task per subscriber per write,
//!   guarded by a per-endpoint circuit breaker
//! - [`Checkpoint`] + [`Watcher`]: the offline replay path, tailing shard
//!   tables by `added_id` with durable high-water marks
//!
//! ## Delivery contract
//!
//! The channel is at-least-once with best-effort ordering per plugin: a
//! delivery that exhausts its retries is dropped (and counted), and nothing
//! on the write path ever waits for a plugin. Plugins are required to be
//! idempotent. Operators who need stronger guarantees drive the [`Watcher`]
//! against the partition-read primitive to replay from a checkpoint.

pub mod breaker;
pub mod checkpoint;
pub mod notifier;
pub mod plugin;
pub mod rpc;
pub mod store;
pub mod watcher;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use checkpoint::{Checkpoint, PostgresCheckpoint};
pub use notifier::Notifier;
pub use plugin::{Plugin, PluginRegistry, PluginSpec, PluginStatus};
pub use rpc::{CellWrittenParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcClient, RpcError};
pub use store::{PluginStore, PostgresPluginStore};
pub use watcher::{CellHandler, HandlerRegistry, Watcher};

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TriggerError>;

/// Errors from the plugin registry and its durable store.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("plugin named {0:?} is already registered")]
    NameConflict(String),

    #[error("plugin {0} not found")]
    PluginNotFound(Uuid),

    #[error("no pool for shard {0}")]
    NoShardPool(tessera_core::ShardId),

    #[error("query timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
