//! The engine facade: write coordination and the read paths.
//!
//! `write_cell` is the one multi-step sequence in the system. The order is
//! deliberate and the consistency contract hangs off it:
//!
//! 1. hash the row key to its shard and resolve the cell store
//! 2. persist the cell — `DuplicateVersion` surfaces to the caller, any other
//!    failure is a storage fault
//! 3. materialize index entries; faults are logged and counted, never undone:
//!    a crash or refusal between 2 and 3 leaves a cell without index entries,
//!    repaired offline via partition reads
//! 4. enqueue plugin notifications — the response never waits for delivery
//!
//! Reads resolve the shard the same way and delegate to the store.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tessera_core::{
    shard_for_key, shard_for_row_key, Cell, CellRef, ShardId, WriteCellRequest,
};
use tessera_index::{IndexPage, IndexRegistry};
use tessera_storage::{PartitionPage, PartitionReadRequest, ShardRouter};
use tessera_trigger::{Notifier, Plugin, PluginRegistry, PluginSpec};
use uuid::Uuid;

use crate::bootstrap::{shard_pools, Backend};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::health::{check_backends, BackendPinger, ReadinessReport};
use crate::metrics::{EngineMetrics, MetricsSnapshot};

pub struct Engine {
    config: EngineConfig,
    router: Arc<ShardRouter>,
    indexes: Arc<IndexRegistry>,
    plugins: Arc<PluginRegistry>,
    notifier: Arc<Notifier>,
    pingers: Vec<(String, Arc<dyn BackendPinger>)>,
    backends: Vec<Backend>,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// Assembles an engine from already-constructed parts. Called by
    /// [`crate::bootstrap`]; tests use it to inject fakes.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        config: EngineConfig,
        router: Arc<ShardRouter>,
        indexes: Arc<IndexRegistry>,
        plugins: Arc<PluginRegistry>,
        notifier: Arc<Notifier>,
        pingers: Vec<(String, Arc<dyn BackendPinger>)>,
        backends: Vec<Backend>,
    ) -> Self {
        Engine {
            config,
            router,
            indexes,
            plugins,
            notifier,
            pingers,
            backends,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shard_count(&self) -> u32 {
        self.config.num_shards
    }

    /// The connected backends, in shard-map order. Empty for fake-assembled
    /// engines in tests.
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Per-shard pool map for the offline replay checkpoint store.
    pub fn shard_pools(&self) -> HashMap<ShardId, PgPool> {
        shard_pools(&self.backends)
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Persists a cell, materializes its index entries, and enqueues plugin
    /// notifications. Returns the stored cell with its assigned `added_id`.
    pub async fn write_cell(&self, req: WriteCellRequest) -> Result<Cell, EngineError> {
        if req.column_name.is_empty() {
            return Err(EngineError::EmptyColumnName);
        }

        let shard_id = shard_for_row_key(req.row_key, self.config.num_shards);
        let store = self.router.store_for(shard_id)?;
        let cell = store.write_cell(req).await?;

        let faults = self.indexes.index_cell(&cell, self.config.num_shards).await;
        for fault in &faults {
            self.metrics.record_index_failure();
            tracing::warn!(
                index = %fault.index,
                row_key = %cell.row_key,
                column = %cell.column_name,
                added_id = cell.added_id,
                error = %fault.error,
                "index write failed; cell write stands"
            );
        }

        self.notifier.notify_cell(shard_id, &cell).await;
        self.metrics.record_write();
        Ok(cell)
    }

    // ------------------------------------------------------------------
    // Read paths
    // ------------------------------------------------------------------

    pub async fn get_cell(&self, cell_ref: &CellRef) -> Result<Cell, EngineError> {
        let shard_id = shard_for_row_key(cell_ref.row_key, self.config.num_shards);
        let store = self.router.store_for(shard_id)?;
        Ok(store.get_cell(cell_ref).await?)
    }

    pub async fn get_cell_latest(
        &self,
        row_key: Uuid,
        column_name: &str,
    ) -> Result<Cell, EngineError> {
        let shard_id = shard_for_row_key(row_key, self.config.num_shards);
        let store = self.router.store_for(shard_id)?;
        Ok(store.get_cell_latest(row_key, column_name).await?)
    }

    pub async fn get_row(&self, row_key: Uuid) -> Result<Vec<Cell>, EngineError> {
        let shard_id = shard_for_row_key(row_key, self.config.num_shards);
        let store = self.router.store_for(shard_id)?;
        Ok(store.get_row(row_key).await?)
    }

    /// Cursor-paginated sweep of one shard.
    pub async fn partition_read(
        &self,
        partition: u32,
        req: PartitionReadRequest,
    ) -> Result<PartitionPage, EngineError> {
        if partition >= self.config.num_shards {
            return Err(EngineError::InvalidPartition {
                partition,
                num_shards: self.config.num_shards,
            });
        }
        let store = self.router.store_for(partition)?;
        Ok(store.partition_read(req).await?)
    }

    /// Equality lookup on a secondary index. The shard is derived from the
    /// looked-up value, exactly as it was at write time.
    pub async fn query_index(
        &self,
        index_name: &str,
        value: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<IndexPage, EngineError> {
        if self.indexes.definition(index_name).is_none() {
            return Err(tessera_index::IndexError::UnknownIndex(index_name.to_string()).into());
        }
        let shard_id = shard_for_key(value, self.config.num_shards);
        let store = self.indexes.store_for(index_name, shard_id).ok_or_else(|| {
            tessera_index::IndexError::NoStoreForShard {
                index: index_name.to_string(),
                shard: shard_id,
            }
        })?;
        Ok(store.query_by_shard_key(value, cursor, limit).await?)
    }

    // ------------------------------------------------------------------
    // Plugin administration
    // ------------------------------------------------------------------

    pub async fn register_plugin(&self, spec: PluginSpec) -> Result<Plugin, EngineError> {
        let plugin = self.plugins.register(spec).await?;
        tracing::info!(
            id = %plugin.id,
            name = %plugin.name,
            endpoint = %plugin.endpoint,
            "plugin registered"
        );
        Ok(plugin)
    }

    pub async fn list_plugins(&self) -> Vec<Plugin> {
        self.plugins.list().await
    }

    pub async fn get_plugin(&self, id: Uuid) -> Result<Plugin, EngineError> {
        Ok(self.plugins.get(id).await?)
    }

    pub async fn delete_plugin(&self, id: Uuid) -> Result<(), EngineError> {
        self.plugins.delete(id).await?;
        tracing::info!(id = %id, "plugin deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Health & metrics
    // ------------------------------------------------------------------

    /// Process-up probe.
    pub fn liveness(&self) -> bool {
        true
    }

    /// Pings every backend in parallel; ready only when all answer.
    pub async fn readiness(&self) -> ReadinessReport {
        check_backends(&self.pingers).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cells_written: self.metrics.cells_written(),
            index_failures: self.metrics.index_failures(),
            notification_failures: self.notifier.failed_deliveries(),
        }
    }
}
