//! Durable replay checkpoints.
//!
//! One `(shard, column) → last_added_id` row per watched pair, stored on the
//! backend that owns the shard. Only the offline [`crate::Watcher`] reads or
//! writes these; the live write→notify path never consults them.

use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tessera_core::ShardId;

use crate::{Result, TriggerError};

#[async_trait::async_trait]
pub trait Checkpoint: Send + Sync {
    /// The greatest acknowledged `added_id` for `(shard, column)`; 0 if the
    /// pair has never been checkpointed.
    async fn load(&self, shard_id: ShardId, column_name: &str) -> Result<i64>;

    async fn save(&self, shard_id: ShardId, column_name: &str, added_id: i64) -> Result<()>;
}

/// Checkpoint store over the `trigger_checkpoints` table, routed per shard to
/// the owning backend's pool.
pub struct PostgresCheckpoint {
    pools: HashMap<ShardId, PgPool>,
}

impl PostgresCheckpoint {
    pub fn new(pools: HashMap<ShardId, PgPool>) -> Self {
        PostgresCheckpoint { pools }
    }

    fn pool_for(&self, shard_id: ShardId) -> Result<&PgPool> {
        self.pools
            .get(&shard_id)
            .ok_or(TriggerError::NoShardPool(shard_id))
    }
}

#[async_trait::async_trait]
impl Checkpoint for PostgresCheckpoint {
    async fn load(&self, shard_id: ShardId, column_name: &str) -> Result<i64> {
        let pool = self.pool_for(shard_id)?;
        let row = sqlx::query(
            "SELECT last_added_id FROM trigger_checkpoints
             WHERE shard_id = $1 AND column_name = $2",
        )
        .bind(shard_id as i32)
        .bind(column_name)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.get("last_added_id")).unwrap_or(0))
    }

    async fn save(&self, shard_id: ShardId, column_name: &str, added_id: i64) -> Result<()> {
        let pool = self.pool_for(shard_id)?;
        sqlx::query(
            "INSERT INTO trigger_checkpoints (shard_id, column_name, last_added_id, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (shard_id, column_name)
             DO UPDATE SET last_added_id = $3, updated_at = now()",
        )
        .bind(shard_id as i32)
        .bind(column_name)
        .bind(added_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
