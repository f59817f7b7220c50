//! PostgreSQL index store for a single `(index, shard)` table.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tessera_core::{clamp_limit, Cursor, ShardId};

use crate::error::{IndexError, Result};
use crate::{index_table, IndexEntry, IndexPage, IndexStore, NewIndexEntry};

pub struct PostgresIndexStore {
    pool: PgPool,
    table: String,
    query_timeout: Option<Duration>,
}

impl PostgresIndexStore {
    pub fn new(
        pool: PgPool,
        index_name: &str,
        shard_id: ShardId,
        query_timeout: Option<Duration>,
    ) -> Self {
        PostgresIndexStore {
            pool,
            table: index_table(index_name, shard_id),
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => Ok(res?),
                Err(_) => Err(IndexError::Timeout),
            },
            None => Ok(fut.await?),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn entry_from_row(row: &PgRow) -> IndexEntry {
    IndexEntry {
        added_id: row.get("added_id"),
        shard_key: row.get("shard_key"),
        row_key: row.get("row_key"),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

#[async_trait::async_trait]
impl IndexStore for PostgresIndexStore {
    async fn write_entry(&self, entry: NewIndexEntry) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (shard_key, row_key, body) VALUES ($1, $2, $3)",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(&entry.shard_key)
            .bind(entry.row_key)
            .bind(&entry.body)
            .execute(&self.pool);

        match self.bounded(fut).await {
            Ok(_) => Ok(()),
            Err(IndexError::Database(ref db)) if is_unique_violation(db) => {
                Err(IndexError::DuplicateUniqueField)
            }
            Err(other) => Err(other),
        }
    }

    async fn query_by_shard_key(
        &self,
        shard_key: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<IndexPage> {
        let limit = clamp_limit(limit);
        let after = match cursor {
            Some(raw) if !raw.is_empty() => Cursor::decode(raw)?.added_id.unwrap_or(0),
            _ => 0,
        };

        let query = format!(
            "SELECT added_id, shard_key, row_key, body, created_at
             FROM {}
             WHERE shard_key = $1 AND added_id > $2
             ORDER BY added_id ASC
             LIMIT $3",
            self.table
        );

        let fut = sqlx::query(&query)
            .bind(shard_key)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool);
        let rows = self.bounded(fut).await?;

        let entries: Vec<IndexEntry> = rows.iter().map(entry_from_row).collect();
        let has_more = entries.len() as i64 == limit;
        let next_cursor = match (has_more, entries.last()) {
            (true, Some(last)) => Cursor::from_added_id(last.added_id).encode()?,
            _ => String::new(),
        };

        Ok(IndexPage {
            entries,
            next_cursor,
            has_more,
        })
    }
}
