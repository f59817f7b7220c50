//! Durable plugin storage.
//!
//! One small table on the designated primary backend. The registry is the
//! only reader and writer; it reloads the table at startup and writes through
//! on every mutation.

use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::plugin::{Plugin, PluginStatus};
use crate::{Result, TriggerError};

#[async_trait::async_trait]
pub trait PluginStore: Send + Sync {
    async fn save_plugin(&self, plugin: &Plugin) -> Result<()>;
    async fn delete_plugin(&self, id: Uuid) -> Result<()>;
    async fn list_plugins(&self) -> Result<Vec<Plugin>>;
}

pub struct PostgresPluginStore {
    pool: PgPool,
    query_timeout: Option<Duration>,
}

impl PostgresPluginStore {
    pub fn new(pool: PgPool, query_timeout: Option<Duration>) -> Self {
        PostgresPluginStore {
            pool,
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => Ok(res?),
                Err(_) => Err(TriggerError::Timeout),
            },
            None => Ok(fut.await?),
        }
    }
}

fn plugin_from_row(row: &PgRow) -> Plugin {
    let status: String = row.get("status");
    let status = match status.as_str() {
        "active" => PluginStatus::Active,
        "inactive" => PluginStatus::Inactive,
        other => {
            tracing::warn!(status = other, "unknown plugin status in store, treating as inactive");
            PluginStatus::Inactive
        }
    };
    Plugin {
        id: row.get("id"),
        name: row.get("name"),
        endpoint: row.get("endpoint"),
        subscribed_columns: row.get("subscribed_columns"),
        status,
        created_at: row.get("created_at"),
    }
}

#[async_trait::async_trait]
impl PluginStore for PostgresPluginStore {
    async fn save_plugin(&self, plugin: &Plugin) -> Result<()> {
        let fut = sqlx::query(
            "INSERT INTO plugins (id, name, endpoint, subscribed_columns, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(plugin.id)
        .bind(&plugin.name)
        .bind(&plugin.endpoint)
        .bind(&plugin.subscribed_columns)
        .bind(plugin.status.as_str())
        .bind(plugin.created_at)
        .execute(&self.pool);

        self.bounded(fut).await?;
        Ok(())
    }

    async fn delete_plugin(&self, id: Uuid) -> Result<()> {
        let fut = sqlx::query("DELETE FROM plugins WHERE id = $1")
            .bind(id)
            .execute(&self.pool);
        let result = self.bounded(fut).await?;
        if result.rows_affected() == 0 {
            return Err(TriggerError::PluginNotFound(id));
        }
        Ok(())
    }

    async fn list_plugins(&self) -> Result<Vec<Plugin>> {
        let fut = sqlx::query(
            "SELECT id, name, endpoint, subscribed_columns, status, created_at
             FROM plugins
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool);
        let rows = self.bounded(fut).await?;
        Ok(rows.iter().map(plugin_from_row).collect())
    }
}
