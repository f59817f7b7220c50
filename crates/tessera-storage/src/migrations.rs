//! Idempotent schema creation.
//!
//! Every statement is `CREATE … IF NOT EXISTS`, so the migration runner is
//! safe to re-run on every startup. Cell tables and the trigger checkpoint
//! table are created on each backend for its shard range; the plugins table
//! lives on the first-listed backend only. Index tables are created by the
//! index registry at its own startup, not here.

use sqlx::PgPool;
use tessera_core::ShardId;

use crate::error::Result;

/// Table name for a shard. Zero-padded so names sort lexicographically for
/// shard counts up to four digits.
pub fn shard_table(shard_id: ShardId) -> String {
    format!("cells_{shard_id:04}")
}

/// Creates the cell tables for shards `[shard_start, shard_end]` on one
/// backend, with the uniqueness constraint and both secondary indexes.
pub async fn create_cell_tables(
    pool: &PgPool,
    shard_start: ShardId,
    shard_end: ShardId,
) -> Result<()> {
    for shard_id in shard_start..=shard_end {
        let table = shard_table(shard_id);
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                added_id    BIGSERIAL PRIMARY KEY,
                row_key     UUID NOT NULL,
                column_name TEXT NOT NULL,
                ref_key     BIGINT NOT NULL,
                body        JSONB NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),

                CONSTRAINT uq_{table}_ref UNIQUE (row_key, column_name, ref_key)
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_row_col
                ON {table} (row_key, column_name, ref_key DESC);

            CREATE INDEX IF NOT EXISTS idx_{table}_scan
                ON {table} (column_name, added_id);
            "#
        );
        sqlx::raw_sql(&ddl).execute(pool).await?;
        tracing::debug!(shard = shard_id, table = %table, "cell table ready");
    }
    Ok(())
}

/// Creates the trigger checkpoint table. One row per `(shard, column)` holds
/// the greatest `added_id` acknowledged by offline replay for that pair.
pub async fn create_checkpoint_table(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS trigger_checkpoints (
            shard_id      INT NOT NULL,
            column_name   TEXT NOT NULL,
            last_added_id BIGINT NOT NULL,
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),

            PRIMARY KEY (shard_id, column_name)
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Creates the plugins table. This lives on a single designated backend; the
/// plugin registry reloads it at startup.
pub async fn create_plugins_table(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS plugins (
            id                 UUID PRIMARY KEY,
            name               TEXT NOT NULL UNIQUE,
            endpoint           TEXT NOT NULL,
            subscribed_columns TEXT[] NOT NULL,
            status             TEXT NOT NULL,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_tables_are_zero_padded() {
        assert_eq!(shard_table(0), "cells_0000");
        assert_eq!(shard_table(7), "cells_0007");
        assert_eq!(shard_table(63), "cells_0063");
        assert_eq!(shard_table(9999), "cells_9999");
    }

    #[test]
    fn shard_tables_sort_lexicographically() {
        let mut names: Vec<String> = (0..128).map(shard_table).collect();
        let sorted = names.clone();
        names.sort();
        assert_eq!(names, sorted);
    }
}
