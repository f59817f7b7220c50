//! Index registry: definitions plus their per-shard stores.
//!
//! The registry is assembled during startup (one `register_range` call per
//! backend per definition, so coverage accumulates across backends) and is
//! read-only afterwards — callers share it behind an `Arc` with no locking.
//!
//! [`IndexRegistry::index_cell`] is the write-path entry point: it dispatches
//! a freshly written cell to every definition whose `source_column` matches,
//! extracting the shard key, projecting the configured fields, and writing to
//! the index shard the key hashes to. A failure for one definition never
//! stops the others; each failure comes back as an [`IndexFault`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tessera_core::{shard_for_key, Cell, ShardId};

use crate::error::{IndexError, IndexFault, Result};
use crate::postgres::PostgresIndexStore;
use crate::{index_table, IndexDefinition, IndexStore, NewIndexEntry};

#[derive(Default)]
pub struct IndexRegistry {
    definitions: HashMap<String, IndexDefinition>,
    stores: HashMap<String, HashMap<ShardId, Arc<dyn IndexStore>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        IndexRegistry::default()
    }

    /// Registers a definition and creates Postgres stores for shards
    /// `[shard_start, shard_end]` on the given pool. Calling once per backend
    /// builds up full shard coverage.
    pub fn register_range(
        &mut self,
        pool: &PgPool,
        def: IndexDefinition,
        shard_start: ShardId,
        shard_end: ShardId,
        query_timeout: Option<Duration>,
    ) {
        let shard_stores = self.stores.entry(def.name.clone()).or_default();
        for shard_id in shard_start..=shard_end {
            shard_stores.insert(
                shard_id,
                Arc::new(PostgresIndexStore::new(
                    pool.clone(),
                    &def.name,
                    shard_id,
                    query_timeout,
                )),
            );
        }
        self.definitions.insert(def.name.clone(), def);
    }

    /// Registers a definition without any stores. Pair with
    /// [`IndexRegistry::register_store`] for non-Postgres backends and tests.
    pub fn register_definition(&mut self, def: IndexDefinition) {
        self.stores.entry(def.name.clone()).or_default();
        self.definitions.insert(def.name.clone(), def);
    }

    /// Registers a single store for one shard of one index.
    pub fn register_store(
        &mut self,
        index_name: &str,
        shard_id: ShardId,
        store: Arc<dyn IndexStore>,
    ) {
        self.stores
            .entry(index_name.to_string())
            .or_default()
            .insert(shard_id, store);
    }

    pub fn definition(&self, index_name: &str) -> Option<&IndexDefinition> {
        self.definitions.get(index_name)
    }

    /// Definitions triggered by writes to `column_name`.
    pub fn for_column(&self, column_name: &str) -> Vec<&IndexDefinition> {
        self.definitions
            .values()
            .filter(|def| def.source_column == column_name)
            .collect()
    }

    pub fn store_for(&self, index_name: &str, shard_id: ShardId) -> Option<Arc<dyn IndexStore>> {
        self.stores.get(index_name)?.get(&shard_id).cloned()
    }

    /// Creates the index tables (with their unique expression indexes) for
    /// shards `[shard_start, shard_end]` on one backend. Idempotent.
    pub async fn create_tables_range(
        &self,
        pool: &PgPool,
        shard_start: ShardId,
        shard_end: ShardId,
    ) -> Result<()> {
        for def in self.definitions.values() {
            for shard_id in shard_start..=shard_end {
                let table = index_table(&def.name, shard_id);
                let ddl = table_ddl(&table, &def.unique_fields);
                sqlx::raw_sql(&ddl).execute(pool).await?;
            }
            tracing::debug!(index = %def.name, "index tables ready");
        }
        Ok(())
    }

    /// Writes denormalized entries for every definition matching the cell's
    /// column. Returns one fault per failed definition; successful
    /// definitions are unaffected by failing ones.
    pub async fn index_cell(&self, cell: &Cell, num_shards: u32) -> Vec<IndexFault> {
        let mut faults = Vec::new();
        for def in self.for_column(&cell.column_name) {
            if let Err(error) = self.apply(def, cell, num_shards).await {
                faults.push(IndexFault {
                    index: def.name.clone(),
                    error,
                });
            }
        }
        faults
    }

    async fn apply(&self, def: &IndexDefinition, cell: &Cell, num_shards: u32) -> Result<()> {
        let shard_key = extract_string(&cell.body, &def.shard_key_field)?;
        let body = extract_fields(&cell.body, &def.fields)?;
        let shard_id = shard_for_key(&shard_key, num_shards);

        let store = self
            .store_for(&def.name, shard_id)
            .ok_or_else(|| IndexError::NoStoreForShard {
                index: def.name.clone(),
                shard: shard_id,
            })?;

        store
            .write_entry(NewIndexEntry {
                shard_key,
                row_key: cell.row_key,
                body,
            })
            .await
    }
}

/// Reads a string field out of a JSON object body.
fn extract_string(body: &serde_json::Value, field: &str) -> Result<String> {
    let obj = body.as_object().ok_or(IndexError::BodyNotObject)?;
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| IndexError::BadShardKey(field.to_string()))
}

/// Copies only the listed keys from a JSON object. Missing keys are silently
/// omitted.
fn extract_fields(body: &serde_json::Value, fields: &[String]) -> Result<serde_json::Value> {
    let obj = body.as_object().ok_or(IndexError::BodyNotObject)?;
    let mut subset = serde_json::Map::with_capacity(fields.len());
    for field in fields {
        if let Some(value) = obj.get(field) {
            subset.insert(field.clone(), value.clone());
        }
    }
    Ok(serde_json::Value::Object(subset))
}

fn table_ddl(table: &str, unique_fields: &[String]) -> String {
    let mut ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            added_id   BIGSERIAL PRIMARY KEY,
            shard_key  TEXT NOT NULL,
            row_key    UUID NOT NULL,
            body       JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_shard_key
            ON {table} (shard_key);
        "#
    );
    for field in unique_fields {
        ddl.push_str(&format!(
            "\nCREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_{field}\n    ON {table} ((body->>'{field}'));\n"
        ));
    }
    ddl
}
