//! Startup wiring.
//!
//! Everything here runs exactly once, before the first request: pools are
//! opened and pinged, schemas are created idempotently, and the router and
//! registries are assembled. Any failure is fatal — a process that cannot
//! reach every configured backend must not serve traffic.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tessera_core::ShardId;
use tessera_index::IndexRegistry;
use tessera_storage::{
    create_cell_tables, create_checkpoint_table, create_plugins_table, PostgresCellStore,
    ShardRouter,
};
use tessera_trigger::{Notifier, PluginRegistry, PostgresPluginStore, RpcClient};

use crate::config::EngineConfig;
use crate::coordinator::Engine;
use crate::error::{ConfigError, EngineError};
use crate::health::BackendPinger;
use crate::index_config::IndexConfig;
use crate::shard_config::ShardMap;

/// One connected backend and the shard range it owns.
pub struct Backend {
    pub name: String,
    pub shard_start: ShardId,
    pub shard_end: ShardId,
    pub pool: PgPool,
}

/// Convenience entry point: loads the shard map (required) and index config
/// (optional) from the paths in `config`, then runs [`bootstrap`].
pub async fn bootstrap_from_paths(config: EngineConfig) -> Result<Engine, EngineError> {
    let shard_path = config
        .shard_config_path
        .clone()
        .ok_or(ConfigError::MissingShardConfig)?;
    let shard_map = ShardMap::load(&shard_path, config.num_shards)?;

    let index_config = match &config.index_config_path {
        Some(path) => Some(IndexConfig::load(path)?),
        None => None,
    };

    bootstrap(config, shard_map, index_config).await
}

/// Validates configuration, connects every backend, runs migrations, and
/// assembles the [`Engine`].
pub async fn bootstrap(
    config: EngineConfig,
    shard_map: ShardMap,
    index_config: Option<IndexConfig>,
) -> Result<Engine, EngineError> {
    shard_map.validate(config.num_shards)?;
    if let Some(indexes) = &index_config {
        indexes.validate()?;
    }

    // One pool per backend, pinged before anything else happens.
    let mut backends = Vec::with_capacity(shard_map.backends.len());
    for spec in &shard_map.backends {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_conns)
            .min_connections(config.db_min_conns)
            .max_lifetime(config.db_max_conn_lifetime)
            .idle_timeout(config.db_max_conn_idle_time)
            .acquire_timeout(config.db_acquire_timeout)
            .connect(&spec.database_url)
            .await
            .map_err(|source| EngineError::BackendUnavailable {
                name: spec.name.clone(),
                source,
            })?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|source| EngineError::BackendUnavailable {
                name: spec.name.clone(),
                source,
            })?;
        tracing::info!(
            backend = %spec.name,
            shard_start = spec.shard_start,
            shard_end = spec.shard_end,
            max_conns = config.db_max_conns,
            "connected to backend"
        );
        backends.push(Backend {
            name: spec.name.clone(),
            shard_start: spec.shard_start,
            shard_end: spec.shard_end,
            pool,
        });
    }

    // Idempotent schema creation per backend range.
    for backend in &backends {
        create_cell_tables(&backend.pool, backend.shard_start, backend.shard_end).await?;
        create_checkpoint_table(&backend.pool).await?;
        tracing::info!(backend = %backend.name, "cell migrations complete");
    }

    let query_timeout = Some(config.db_query_timeout);

    // Shard router: one Postgres cell store per shard.
    let router = ShardRouter::new();
    for backend in &backends {
        for shard_id in backend.shard_start..=backend.shard_end {
            router.register(
                shard_id,
                Arc::new(PostgresCellStore::new(
                    backend.pool.clone(),
                    shard_id,
                    query_timeout,
                )),
            );
        }
    }
    tracing::info!(shards = router.len(), "shard router populated");

    // Index registry: definitions registered across every backend range,
    // tables created lazily here (not in the migration runner).
    let mut index_registry = IndexRegistry::new();
    if let Some(indexes) = index_config {
        for def in &indexes.indexes {
            for backend in &backends {
                index_registry.register_range(
                    &backend.pool,
                    def.clone(),
                    backend.shard_start,
                    backend.shard_end,
                    query_timeout,
                );
            }
        }
        for backend in &backends {
            index_registry
                .create_tables_range(&backend.pool, backend.shard_start, backend.shard_end)
                .await?;
            tracing::info!(backend = %backend.name, "index tables created");
        }
        tracing::info!(count = indexes.indexes.len(), "indexes registered");
    }

    // Plugins live on the first-listed backend.
    let primary = &backends[0];
    create_plugins_table(&primary.pool).await?;
    let plugin_store = Arc::new(PostgresPluginStore::new(primary.pool.clone(), query_timeout));
    let plugin_registry = Arc::new(PluginRegistry::with_store(plugin_store));
    plugin_registry.load_all().await?;
    tracing::info!(
        count = plugin_registry.list().await.len(),
        "plugin registry loaded"
    );

    let rpc = Arc::new(RpcClient::new(
        config.trigger_retry_max,
        config.trigger_retry_backoff,
        config.trigger_rpc_timeout,
    )?);
    let notifier = Arc::new(Notifier::new(Arc::clone(&plugin_registry), rpc));

    let pingers = backends
        .iter()
        .map(|backend| {
            (
                backend.name.clone(),
                Arc::new(backend.pool.clone()) as Arc<dyn BackendPinger>,
            )
        })
        .collect();

    Ok(Engine::assemble(
        config,
        Arc::new(router),
        Arc::new(index_registry),
        plugin_registry,
        notifier,
        pingers,
        backends,
    ))
}

/// Per-shard pool map, as needed by the offline replay checkpoint store.
pub fn shard_pools(backends: &[Backend]) -> HashMap<ShardId, PgPool> {
    let mut pools = HashMap::new();
    for backend in backends {
        for shard_id in backend.shard_start..=backend.shard_end {
            pools.insert(shard_id, backend.pool.clone());
        }
    }
    pools
}
