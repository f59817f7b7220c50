//! Plugin model and registry.
//!
//! The registry is the process-local source of truth for "who gets notified
//! about what". It is read on every cell write (`for_column`) and mutated
//! rarely (register/delete), so reads take only the read lock. Mutations
//! persist to the durable store *before* touching memory — a store failure
//! leaves the in-memory map unchanged — and hold the write lock across the
//! store call so concurrent registrations cannot race the name-conflict
//! check.
//!
//! The registry is not replicated: a multi-process deployment sees each
//! process's in-memory copy of the same underlying table, refreshed only by
//! [`PluginRegistry::load_all`] at startup.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::PluginStore;
use crate::{Result, TriggerError};

/// Activation state of a plugin. Only active plugins receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Active,
    Inactive,
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Active => "active",
            PluginStatus::Inactive => "inactive",
        }
    }
}

/// An external JSON-RPC service that receives `cell.written` notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub subscribed_columns: Vec<String>,
    pub status: PluginStatus,
    pub created_at: DateTime<Utc>,
}

/// What a caller provides to register a plugin. The registry assigns the id
/// and creation timestamp; status defaults to active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub endpoint: String,
    pub subscribed_columns: Vec<String>,
    #[serde(default)]
    pub status: Option<PluginStatus>,
}

pub struct PluginRegistry {
    plugins: RwLock<HashMap<Uuid, Plugin>>,
    store: Option<Arc<dyn PluginStore>>,
}

impl PluginRegistry {
    /// In-memory only; registrations are lost on restart.
    pub fn new() -> Self {
        PluginRegistry {
            plugins: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Write-through to the given durable store.
    pub fn with_store(store: Arc<dyn PluginStore>) -> Self {
        PluginRegistry {
            plugins: RwLock::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Populates the in-memory map from the store. Called once at startup;
    /// a no-op without a store.
    pub async fn load_all(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let loaded = store.list_plugins().await?;
        let mut plugins = self.plugins.write().await;
        for plugin in loaded {
            plugins.insert(plugin.id, plugin);
        }
        Ok(())
    }

    /// Registers a plugin, assigning a fresh id and `created_at`. Rejects a
    /// duplicate name (case-sensitive) with [`TriggerError::NameConflict`].
    pub async fn register(&self, spec: PluginSpec) -> Result<Plugin> {
        let mut plugins = self.plugins.write().await;
        if plugins.values().any(|p| p.name == spec.name) {
            return Err(TriggerError::NameConflict(spec.name));
        }

        let plugin = Plugin {
            id: Uuid::new_v4(),
            name: spec.name,
            endpoint: spec.endpoint,
            subscribed_columns: spec.subscribed_columns,
            status: spec.status.unwrap_or(PluginStatus::Active),
            created_at: Utc::now(),
        };

        if let Some(store) = &self.store {
            store.save_plugin(&plugin).await?;
        }
        plugins.insert(plugin.id, plugin.clone());
        Ok(plugin)
    }

    pub async fn get(&self, id: Uuid) -> Result<Plugin> {
        self.plugins
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TriggerError::PluginNotFound(id))
    }

    pub async fn list(&self) -> Vec<Plugin> {
        self.plugins.read().await.values().cloned().collect()
    }

    /// Removes a plugin from store and memory.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        if !plugins.contains_key(&id) {
            return Err(TriggerError::PluginNotFound(id));
        }
        if let Some(store) = &self.store {
            store.delete_plugin(id).await?;
        }
        plugins.remove(&id);
        Ok(())
    }

    /// All active plugins subscribed to `column_name`. Hot path: read lock
    /// only.
    pub async fn for_column(&self, column_name: &str) -> Vec<Plugin> {
        self.plugins
            .read()
            .await
            .values()
            .filter(|p| {
                p.status == PluginStatus::Active
                    && p.subscribed_columns.iter().any(|c| c == column_name)
            })
            .cloned()
            .collect()
    }

    /// Union of active plugins' subscribed columns, sorted.
    pub async fn columns(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        let set: BTreeSet<String> = plugins
            .values()
            .filter(|p| p.status == PluginStatus::Active)
            .flat_map(|p| p.subscribed_columns.iter().cloned())
            .collect();
        set.into_iter().collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        PluginRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::MemoryPluginStore;

    fn spec(name: &str, columns: &[&str]) -> PluginSpec {
        PluginSpec {
            name: name.to_string(),
            endpoint: format!("http://{name}.internal/rpc"),
            subscribed_columns: columns.iter().map(|c| c.to_string()).collect(),
            status: None,
        }
    }

    #[tokio::test]
    async fn register_assigns_id_and_defaults_active() {
        let registry = PluginRegistry::new();
        let plugin = registry.register(spec("billing", &["profile"])).await.unwrap();
        assert!(!plugin.id.is_nil());
        assert_eq!(plugin.status, PluginStatus::Active);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let registry = PluginRegistry::new();
        registry.register(spec("billing", &["profile"])).await.unwrap();
        let err = registry
            .register(spec("billing", &["orders"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::NameConflict(name) if name == "billing"));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_and_missing_id_errors() {
        let registry = PluginRegistry::new();
        let plugin = registry.register(spec("billing", &["profile"])).await.unwrap();
        registry.delete(plugin.id).await.unwrap();
        assert!(registry.list().await.is_empty());

        let err = registry.delete(plugin.id).await.unwrap_err();
        assert!(matches!(err, TriggerError::PluginNotFound(_)));
    }

    #[tokio::test]
    async fn for_column_filters_by_subscription_and_status() {
        let registry = PluginRegistry::new();
        registry.register(spec("billing", &["profile"])).await.unwrap();
        registry
            .register(spec("audit", &["profile", "orders"]))
            .await
            .unwrap();
        let mut dormant = spec("dormant", &["profile"]);
        dormant.status = Some(PluginStatus::Inactive);
        registry.register(dormant).await.unwrap();

        let mut names: Vec<String> = registry
            .for_column("profile")
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, ["audit", "billing"]);

        assert!(registry.for_column("unsubscribed").await.is_empty());
        assert_eq!(registry.columns().await, ["orders", "profile"]);
    }

    #[tokio::test]
    async fn registrations_survive_a_restart_through_the_store() {
        let store = Arc::new(MemoryPluginStore::default());

        let registry = PluginRegistry::with_store(store.clone());
        let plugin = registry.register(spec("billing", &["profile"])).await.unwrap();

        // "Restart": a fresh registry over the same store.
        let reloaded = PluginRegistry::with_store(store);
        reloaded.load_all().await.unwrap();
        let listed = reloaded.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], plugin);

        // And it still routes notifications.
        assert_eq!(reloaded.for_column("profile").await.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_leaves_memory_unchanged() {
        let store = Arc::new(MemoryPluginStore::failing());
        let registry = PluginRegistry::with_store(store);
        assert!(registry.register(spec("billing", &["profile"])).await.is_err());
        assert!(registry.list().await.is_empty());
    }
}
