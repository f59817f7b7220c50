//! Shard router: the `shard_id → cell store` map.
//!
//! Read-mostly by design. Registration happens only during startup, after the
//! shard map has been validated; from then on `store_for` is the single
//! hot-path operation and takes only the read lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tessera_core::ShardId;

use crate::error::{Result, StorageError};
use crate::CellStore;

#[derive(Default)]
pub struct ShardRouter {
    stores: RwLock<HashMap<ShardId, Arc<dyn CellStore>>>,
}

impl ShardRouter {
    pub fn new() -> Self {
        ShardRouter {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Associates a shard with a cell store. Startup only.
    pub fn register(&self, shard_id: ShardId, store: Arc<dyn CellStore>) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(shard_id, store);
    }

    /// Returns the store owning `shard_id`, or [`StorageError::NoSuchShard`]
    /// if the shard was never registered.
    pub fn store_for(&self, shard_id: ShardId) -> Result<Arc<dyn CellStore>> {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&shard_id)
            .cloned()
            .ok_or(StorageError::NoSuchShard(shard_id))
    }

    /// Number of registered shards.
    pub fn len(&self) -> usize {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tessera_core::{Cell, CellRef, WriteCellRequest};
    use uuid::Uuid;

    use crate::{PartitionPage, PartitionReadRequest};

    struct NullStore;

    #[async_trait]
    impl CellStore for NullStore {
        async fn write_cell(&self, _req: WriteCellRequest) -> Result<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_cell(&self, _cell_ref: &CellRef) -> Result<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_cell_latest(&self, _row_key: Uuid, _column_name: &str) -> Result<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_row(&self, _row_key: Uuid) -> Result<Vec<Cell>> {
            Ok(Vec::new())
        }
        async fn scan_cells(
            &self,
            _column_name: &str,
            _after_added_id: i64,
            _limit: i64,
        ) -> Result<Vec<Cell>> {
            Ok(Vec::new())
        }
        async fn partition_read(&self, _req: PartitionReadRequest) -> Result<PartitionPage> {
            Ok(PartitionPage {
                cells: Vec::new(),
                next_cursor: String::new(),
                has_more: false,
            })
        }
    }

    #[test]
    fn unregistered_shard_is_an_error() {
        let router = ShardRouter::new();
        assert!(matches!(
            router.store_for(3),
            Err(StorageError::NoSuchShard(3))
        ));
    }

    #[test]
    fn registered_shards_resolve() {
        let router = ShardRouter::new();
        router.register(0, Arc::new(NullStore));
        router.register(1, Arc::new(NullStore));
        assert!(router.store_for(0).is_ok());
        assert!(router.store_for(1).is_ok());
        assert_eq!(router.len(), 2);
        assert!(matches!(
            router.store_for(2),
            Err(StorageError::NoSuchShard(2))
        ));
    }
}
