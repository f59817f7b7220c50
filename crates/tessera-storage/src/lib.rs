//! Tessera Cell Storage
//!
//! This crate owns the primary data path of the cell store: one append-only
//! Postgres table per shard, the router that maps shard ids to stores, and
//! the migration runner that creates the per-shard schema.
//!
//! ## Table layout
//!
//! Each shard owns one table, named `cells_0000`, `cells_0001`, … Every table
//! carries:
//!
//! - `added_id BIGSERIAL PRIMARY KEY` — monotonic within the table, the
//!   ordering key for partition scans and trigger tailing
//! - a uniqueness constraint on `(row_key, column_name, ref_key)` — the
//!   immutability guarantee; a second write at the same coordinate fails
//! - an index on `(row_key, column_name, ref_key DESC)` for latest-cell and
//!   get-row queries
//! - an index on `(column_name, added_id)` for scans
//!
//! ## Consistency model
//!
//! Cells are immutable: there is no UPDATE or DELETE anywhere in this crate.
//! Within one shard, `added_id` is strictly monotonic with respect to commit
//! order and the uniqueness constraint linearizes concurrent writers at the
//! same coordinate — at most one wins, the rest see
//! [`StorageError::DuplicateVersion`]. Across shards no ordering is offered.
//!
//! ## Cancellation
//!
//! Every store operation runs under an optional per-query deadline. On expiry
//! the call returns [`StorageError::Timeout`] and the server side rolls back
//! whatever statement was in flight.

pub mod error;
pub mod migrations;
pub mod postgres;
pub mod router;

pub use error::{Result, StorageError};
pub use migrations::{
    create_cell_tables, create_checkpoint_table, create_plugins_table, shard_table,
};
pub use postgres::PostgresCellStore;
pub use router::ShardRouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{Cell, CellRef, WriteCellRequest};
use uuid::Uuid;

/// Which column a partition scan orders and filters by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    AddedId,
    CreatedAt,
}

/// A cursor-paginated request against one shard's cell table.
#[derive(Debug, Clone)]
pub struct PartitionReadRequest {
    pub mode: ReadMode,
    /// Opaque cursor from a previous page; `None` (or empty) starts from the
    /// beginning of the shard.
    pub cursor: Option<String>,
    /// Page size; defaulted and capped by the store.
    pub limit: Option<i64>,
}

/// One page of a partition scan. `next_cursor` is empty when `has_more` is
/// false.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPage {
    pub cells: Vec<Cell>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// The primary storage interface for a single shard.
///
/// Implementations must be safe to share across tasks (`Arc<dyn CellStore>`)
/// and must honor cancellation on every operation.
#[async_trait]
pub trait CellStore: Send + Sync {
    /// Inserts a new immutable cell and returns it with its assigned
    /// `added_id` and `created_at`. Fails with
    /// [`StorageError::DuplicateVersion`] when the coordinate already exists.
    async fn write_cell(&self, req: WriteCellRequest) -> Result<Cell>;

    /// Point lookup at an exact `(row_key, column_name, ref_key)`.
    async fn get_cell(&self, cell_ref: &CellRef) -> Result<Cell>;

    /// The cell with the greatest `ref_key` for `(row_key, column_name)`.
    async fn get_cell_latest(&self, row_key: Uuid, column_name: &str) -> Result<Cell>;

    /// The latest cell for every column present at `row_key`. Ordering of the
    /// returned collection is unspecified.
    async fn get_row(&self, row_key: Uuid) -> Result<Vec<Cell>>;

    /// Cells of one column with `added_id > after_added_id`, ascending,
    /// capped at `limit`. Used by offline replay.
    async fn scan_cells(
        &self,
        column_name: &str,
        after_added_id: i64,
        limit: i64,
    ) -> Result<Vec<Cell>>;

    /// Cursor-paginated sweep over the whole shard.
    async fn partition_read(&self, req: PartitionReadRequest) -> Result<PartitionPage>;
}
