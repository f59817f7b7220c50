//! Cell Data Model
//!
//! A cell is one immutable JSON value at a `(row_key, column_name, ref_key)`
//! coordinate. Cells are never updated or deleted; writing a new version of a
//! `(row_key, column_name)` pair means writing a new cell with a higher
//! `ref_key`. The cell with the greatest `ref_key` for a pair is the "latest"
//! cell, and the set of latest cells across all columns of a `row_key` forms
//! a row.
//!
//! `added_id` is a surrogate sequence number assigned by the shard table on
//! insert. It is monotonic within one shard and is the ordering key for
//! partition scans and trigger tailing. `created_at` is likewise assigned on
//! insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Uniquely identifies a cell in the three-dimensional coordinate space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row_key: Uuid,
    pub column_name: String,
    /// Caller-supplied version number within `(row_key, column_name)`.
    pub ref_key: i64,
}

/// An immutable JSON blob stored at a [`CellRef`] coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Shard-local surrogate key, assigned on insert, monotonic per table.
    pub added_id: i64,
    pub row_key: Uuid,
    pub column_name: String,
    pub ref_key: i64,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// What the caller provides to write a new cell. `added_id` and `created_at`
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteCellRequest {
    pub row_key: Uuid,
    pub column_name: String,
    pub ref_key: i64,
    pub body: serde_json::Value,
}

impl Cell {
    /// The coordinate this cell lives at.
    pub fn cell_ref(&self) -> CellRef {
        CellRef {
            row_key: self.row_key,
            column_name: self.column_name.clone(),
            ref_key: self.ref_key,
        }
    }
}
