//! PostgreSQL cell store for a single shard.
//!
//! Uses runtime queries (`sqlx::query`) instead of the compile-time macros so
//! the crate builds without a live `DATABASE_URL`. The table name is fixed at
//! construction from the shard id; all parameters go through bind variables.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tessera_core::{clamp_limit, Cell, CellRef, Cursor, ShardId, WriteCellRequest};
use uuid::Uuid;

use crate::error::{is_unique_violation, Result, StorageError};
use crate::migrations::shard_table;
use crate::{CellStore, PartitionPage, PartitionReadRequest, ReadMode};

pub struct PostgresCellStore {
    pool: PgPool,
    shard_id: ShardId,
    table: String,
    query_timeout: Option<Duration>,
}

impl PostgresCellStore {
    /// Creates a store bound to one shard's table. `query_timeout` sets the
    /// per-query deadline; `None` means unbounded.
    pub fn new(pool: PgPool, shard_id: ShardId, query_timeout: Option<Duration>) -> Self {
        PostgresCellStore {
            pool,
            shard_id,
            table: shard_table(shard_id),
            query_timeout,
        }
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Runs a query future under the configured deadline.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => Ok(res?),
                Err(_) => Err(StorageError::Timeout),
            },
            None => Ok(fut.await?),
        }
    }
}

fn cell_from_row(row: &PgRow) -> Cell {
    Cell {
        added_id: row.get("added_id"),
        row_key: row.get("row_key"),
        column_name: row.get("column_name"),
        ref_key: row.get("ref_key"),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

#[async_trait::async_trait]
impl CellStore for PostgresCellStore {
    async fn write_cell(&self, req: WriteCellRequest) -> Result<Cell> {
        let query = format!(
            "INSERT INTO {} (row_key, column_name, ref_key, body)
             VALUES ($1, $2, $3, $4)
             RETURNING added_id, row_key, column_name, ref_key, body, created_at",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(req.row_key)
            .bind(&req.column_name)
            .bind(req.ref_key)
            .bind(&req.body)
            .fetch_one(&self.pool);

        let row = self.bounded(fut).await.map_err(|err| match err {
            StorageError::Database(ref db) if is_unique_violation(db) => {
                StorageError::DuplicateVersion
            }
            other => other,
        })?;

        Ok(cell_from_row(&row))
    }

    async fn get_cell(&self, cell_ref: &CellRef) -> Result<Cell> {
        let query = format!(
            "SELECT added_id, row_key, column_name, ref_key, body, created_at
             FROM {}
             WHERE row_key = $1 AND column_name = $2 AND ref_key = $3",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(cell_ref.row_key)
            .bind(&cell_ref.column_name)
            .bind(cell_ref.ref_key)
            .fetch_optional(&self.pool);

        match self.bounded(fut).await? {
            Some(row) => Ok(cell_from_row(&row)),
            None => Err(StorageError::CellNotFound),
        }
    }

    async fn get_cell_latest(&self, row_key: Uuid, column_name: &str) -> Result<Cell> {
        let query = format!(
            "SELECT added_id, row_key, column_name, ref_key, body, created_at
             FROM {}
             WHERE row_key = $1 AND column_name = $2
             ORDER BY ref_key DESC
             LIMIT 1",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(row_key)
            .bind(column_name)
            .fetch_optional(&self.pool);

        match self.bounded(fut).await? {
            Some(row) => Ok(cell_from_row(&row)),
            None => Err(StorageError::CellNotFound),
        }
    }

    async fn get_row(&self, row_key: Uuid) -> Result<Vec<Cell>> {
        let query = format!(
            "SELECT DISTINCT ON (column_name)
                added_id, row_key, column_name, ref_key, body, created_at
             FROM {}
             WHERE row_key = $1
             ORDER BY column_name, ref_key DESC",
            self.table
        );

        let fut = sqlx::query(&query).bind(row_key).fetch_all(&self.pool);
        let rows = self.bounded(fut).await?;
        Ok(rows.iter().map(cell_from_row).collect())
    }

    async fn scan_cells(
        &self,
        column_name: &str,
        after_added_id: i64,
        limit: i64,
    ) -> Result<Vec<Cell>> {
        let query = format!(
            "SELECT added_id, row_key, column_name, ref_key, body, created_at
             FROM {}
             WHERE column_name = $1 AND added_id > $2
             ORDER BY added_id ASC
             LIMIT $3",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(column_name)
            .bind(after_added_id)
            .bind(limit)
            .fetch_all(&self.pool);
        let rows = self.bounded(fut).await?;
        Ok(rows.iter().map(cell_from_row).collect())
    }

    async fn partition_read(&self, req: PartitionReadRequest) -> Result<PartitionPage> {
        let limit = clamp_limit(req.limit);
        let cursor = match req.cursor.as_deref() {
            Some(raw) if !raw.is_empty() => Cursor::decode(raw)?,
            _ => Cursor::default(),
        };

        let rows = match req.mode {
            ReadMode::AddedId => {
                let query = format!(
                    "SELECT added_id, row_key, column_name, ref_key, body, created_at
                     FROM {}
                     WHERE added_id > $1
                     ORDER BY added_id ASC
                     LIMIT $2",
                    self.table
                );
                let after = cursor.added_id.unwrap_or(0);
                let fut = sqlx::query(&query)
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&self.pool);
                self.bounded(fut).await?
            }
            ReadMode::CreatedAt => {
                let query = format!(
                    "SELECT added_id, row_key, column_name, ref_key, body, created_at
                     FROM {}
                     WHERE created_at > $1
                     ORDER BY created_at ASC, added_id ASC
                     LIMIT $2",
                    self.table
                );
                let after = cursor
                    .created_at
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let fut = sqlx::query(&query)
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&self.pool);
                self.bounded(fut).await?
            }
        };

        let cells: Vec<Cell> = rows.iter().map(cell_from_row).collect();
        let has_more = cells.len() as i64 == limit;
        let next_cursor = match (has_more, cells.last()) {
            (true, Some(last)) => match req.mode {
                ReadMode::AddedId => Cursor::from_added_id(last.added_id).encode()?,
                ReadMode::CreatedAt => Cursor::from_created_at(last.created_at).encode()?,
            },
            _ => String::new(),
        };

        Ok(PartitionPage {
            cells,
            next_cursor,
            has_more,
        })
    }
}
