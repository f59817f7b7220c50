//! Cell-write notification fan-out.
//!
//! `notify_cell` resolves the subscribers for the written column and spawns
//! one detached task per plugin. The caller only pays for the subscriber
//! lookup and the spawns — deliveries, retries, and timeouts all happen off
//! the write path. Failures are logged and counted, never propagated to the
//! writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tessera_core::{Cell, ShardId};

use crate::breaker::CircuitBreaker;
use crate::plugin::PluginRegistry;
use crate::rpc::{CellWrittenParams, RpcClient};

pub struct Notifier {
    registry: Arc<PluginRegistry>,
    rpc: Arc<RpcClient>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    failed_deliveries: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new(registry: Arc<PluginRegistry>, rpc: Arc<RpcClient>) -> Self {
        Notifier {
            registry,
            rpc,
            breakers: Mutex::new(HashMap::new()),
            failed_deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of deliveries dropped after exhausting retries (or skipped by
    /// an open circuit). Operator-visible.
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }

    fn breaker_for(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_defaults()))
            .clone()
    }

    /// Fires one delivery task per active subscriber of the cell's column.
    /// Returns as soon as the tasks are spawned.
    pub async fn notify_cell(&self, shard_id: ShardId, cell: &Cell) {
        let plugins = self.registry.for_column(&cell.column_name).await;
        if plugins.is_empty() {
            return;
        }

        let params = CellWrittenParams::from_cell(shard_id, cell);
        for plugin in plugins {
            let rpc = Arc::clone(&self.rpc);
            let breaker = self.breaker_for(&plugin.endpoint);
            let failures = Arc::clone(&self.failed_deliveries);
            let params = params.clone();

            tokio::spawn(async move {
                if !breaker.allow_request() {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        plugin = %plugin.name,
                        endpoint = %plugin.endpoint,
                        "skipping cell.written delivery, circuit open"
                    );
                    return;
                }

                match rpc.call(&plugin.endpoint, "cell.written", &params).await {
                    Ok(response) => {
                        breaker.report_success();
                        if let Some(err) = response.error {
                            tracing::warn!(
                                plugin = %plugin.name,
                                endpoint = %plugin.endpoint,
                                code = err.code,
                                message = %err.message,
                                "plugin replied with json-rpc error"
                            );
                        }
                    }
                    Err(err) => {
                        breaker.report_failure();
                        failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            plugin = %plugin.name,
                            plugin_id = %plugin.id,
                            endpoint = %plugin.endpoint,
                            error = %err,
                            "cell.written delivery failed"
                        );
                    }
                }
            });
        }
    }
}
