//! Tessera Secondary Indexes
//!
//! Secondary indexes are denormalized copies of selected cell fields, written
//! whenever a cell of the index's *source column* is stored. An index entry is
//! placed by hashing a string extracted from the cell body (the *shard key
//! field*) — deliberately independent of where the source cell itself lives —
//! so "find users by email" style lookups hit exactly one shard.
//!
//! Index writes are eventually consistent with cell writes: the cell commits
//! first, then each matching index gets its entry. A failure on the index
//! side never reverses the cell write; the fault is reported to the caller
//! for logging and accounting, and operators can rebuild missing entries
//! offline from a partition scan.
//!
//! Uniqueness (`unique_fields`) is enforced by the database with a unique
//! expression index per field (`body->>'field'`), per shard. That constraint
//! is the authoritative collision check; the registry does not preflight.

pub mod error;
pub mod postgres;
pub mod registry;

pub use error::{IndexError, IndexFault, Result};
pub use postgres::PostgresIndexStore;
pub use registry::IndexRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::ShardId;
use uuid::Uuid;

/// Configuration for one secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Unique index name; part of the physical table names.
    pub name: String,
    /// Writes to this column trigger the index.
    pub source_column: String,
    /// JSON field in the cell body whose string value places the entry.
    pub shard_key_field: String,
    /// JSON fields projected into the entry body. Missing fields are omitted.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Subset of `fields` enforced unique per shard at the database level.
    #[serde(default)]
    pub unique_fields: Vec<String>,
}

/// One row in a secondary index table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub added_id: i64,
    pub shard_key: String,
    /// Back-pointer to the source cell's row.
    pub row_key: Uuid,
    /// The projected subset of the source cell body.
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// What the registry hands a store to persist; `added_id` and `created_at`
/// are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewIndexEntry {
    pub shard_key: String,
    pub row_key: Uuid,
    pub body: serde_json::Value,
}

/// One page of an index lookup. `next_cursor` is empty when `has_more` is
/// false.
#[derive(Debug, Clone, Serialize)]
pub struct IndexPage {
    pub entries: Vec<IndexEntry>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// Index read/write operations for a single shard of one index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Inserts a denormalized entry. Returns
    /// [`IndexError::DuplicateUniqueField`] when a unique expression index is
    /// violated.
    async fn write_entry(&self, entry: NewIndexEntry) -> Result<()>;

    /// Entries whose `shard_key` equals the given value, ascending by
    /// `added_id`, cursor-paginated.
    async fn query_by_shard_key(
        &self,
        shard_key: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<IndexPage>;
}

/// Physical table name for one shard of one index.
pub fn index_table(index_name: &str, shard_id: ShardId) -> String {
    format!("index_{index_name}_{shard_id:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_tables_are_zero_padded() {
        assert_eq!(index_table("user_by_email", 0), "index_user_by_email_0000");
        assert_eq!(index_table("user_by_email", 57), "index_user_by_email_0057");
    }

    #[test]
    fn definition_defaults_empty_field_lists() {
        let def: IndexDefinition = serde_json::from_str(
            r#"{"name":"n","source_column":"c","shard_key_field":"k"}"#,
        )
        .unwrap();
        assert!(def.fields.is_empty());
        assert!(def.unique_fields.is_empty());
    }
}
