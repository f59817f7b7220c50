//! Offline replay watcher.
//!
//! Polls each watched shard for new cells of the registered columns,
//! ordered by `added_id`, and drives [`CellHandler`]s over them. The
//! checkpoint only advances past a cell once every handler has accepted it,
//! so a failing handler halts its batch and the cell is retried on the next
//! poll — handlers must be idempotent.
//!
//! This path is for operators recovering from lost push notifications (the
//! live write path delivers synchronously on write and never reads
//! checkpoints). It runs as detached tasks, one per shard×column, until the
//! cancellation token fires; the final checkpoint is persisted on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::{Cell, ShardId};
use tessera_storage::{CellStore, StorageError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::Checkpoint;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Invoked for each new cell in write order. May be called more than once
/// for the same cell.
#[async_trait::async_trait]
pub trait CellHandler: Send + Sync {
    async fn handle(&self, cell: &Cell) -> std::result::Result<(), HandlerError>;
}

/// Handlers grouped by the column they tail.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn CellHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    pub fn register(&mut self, column_name: &str, handler: Arc<dyn CellHandler>) {
        self.handlers
            .entry(column_name.to_string())
            .or_default()
            .push(handler);
    }

    pub fn columns(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn handlers_for(&self, column_name: &str) -> &[Arc<dyn CellHandler>] {
        self.handlers
            .get(column_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct Watcher {
    registry: Arc<HandlerRegistry>,
    checkpoint: Arc<dyn Checkpoint>,
    stores: HashMap<ShardId, Arc<dyn CellStore>>,
    poll_interval: Duration,
    batch_size: i64,
}

impl Watcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        checkpoint: Arc<dyn Checkpoint>,
        stores: HashMap<ShardId, Arc<dyn CellStore>>,
        poll_interval: Duration,
        batch_size: i64,
    ) -> Self {
        Watcher {
            registry,
            checkpoint,
            stores,
            poll_interval,
            batch_size,
        }
    }

    /// Spawns one polling task per shard×column. The tasks run until
    /// `shutdown` is cancelled, saving a final checkpoint on the way out.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let columns = self.registry.columns();
        if columns.is_empty() {
            tracing::info!("no trigger handlers registered, watcher idle");
            return Vec::new();
        }

        let mut handles = Vec::new();
        for (&shard_id, store) in &self.stores {
            for column in &columns {
                handles.push(tokio::spawn(watch_shard(
                    Arc::clone(&self),
                    shard_id,
                    Arc::clone(store),
                    column.clone(),
                    shutdown.clone(),
                )));
            }
        }
        handles
    }

    /// Runs handlers over one batch of cells, returning the new high-water
    /// mark. Stops at the first handler failure so the failed cell is
    /// retried next poll.
    async fn process_batch(
        &self,
        store: &dyn CellStore,
        shard_id: ShardId,
        column_name: &str,
        after_added_id: i64,
    ) -> Result<i64, StorageError> {
        let cells = store
            .scan_cells(column_name, after_added_id, self.batch_size)
            .await?;
        let handlers = self.registry.handlers_for(column_name);

        let mut last = after_added_id;
        for cell in &cells {
            for handler in handlers {
                if let Err(err) = handler.handle(cell).await {
                    tracing::error!(
                        shard = shard_id,
                        column = column_name,
                        added_id = cell.added_id,
                        error = %err,
                        "trigger handler failed, halting batch"
                    );
                    return Ok(last);
                }
            }
            last = cell.added_id;
        }
        Ok(last)
    }
}

async fn watch_shard(
    watcher: Arc<Watcher>,
    shard_id: ShardId,
    store: Arc<dyn CellStore>,
    column_name: String,
    shutdown: CancellationToken,
) {
    let mut last = match watcher.checkpoint.load(shard_id, &column_name).await {
        Ok(v) => v,
        Err(err) => {
            tracing::error!(shard = shard_id, column = %column_name, error = %err, "failed to load checkpoint");
            return;
        }
    };

    tracing::info!(
        shard = shard_id,
        column = %column_name,
        from_added_id = last,
        "trigger watcher started"
    );

    let mut ticker = tokio::time::interval(watcher.poll_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(err) = watcher.checkpoint.save(shard_id, &column_name, last).await {
                    tracing::error!(shard = shard_id, column = %column_name, error = %err, "failed to save final checkpoint");
                }
                return;
            }
            _ = ticker.tick() => {
                match watcher.process_batch(&*store, shard_id, &column_name, last).await {
                    Ok(new_last) if new_last > last => {
                        last = new_last;
                        if let Err(err) = watcher.checkpoint.save(shard_id, &column_name, last).await {
                            tracing::error!(shard = shard_id, column = %column_name, error = %err, "failed to save checkpoint");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(shard = shard_id, column = %column_name, error = %err, "trigger batch failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tessera_core::{CellRef, WriteCellRequest};
    use tessera_storage::{PartitionPage, PartitionReadRequest, Result as StorageResult};
    use uuid::Uuid;

    struct MemoryCellStore {
        cells: Mutex<Vec<Cell>>,
    }

    impl MemoryCellStore {
        fn with_cells(column: &str, count: i64) -> Self {
            let cells = (1..=count)
                .map(|i| Cell {
                    added_id: i,
                    row_key: Uuid::new_v4(),
                    column_name: column.to_string(),
                    ref_key: 1,
                    body: json!({"n": i}),
                    created_at: Utc::now(),
                })
                .collect();
            MemoryCellStore {
                cells: Mutex::new(cells),
            }
        }
    }

    #[async_trait::async_trait]
    impl CellStore for MemoryCellStore {
        async fn write_cell(&self, _req: WriteCellRequest) -> StorageResult<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_cell(&self, _cell_ref: &CellRef) -> StorageResult<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_cell_latest(
            &self,
            _row_key: Uuid,
            _column_name: &str,
        ) -> StorageResult<Cell> {
            Err(StorageError::CellNotFound)
        }
        async fn get_row(&self, _row_key: Uuid) -> StorageResult<Vec<Cell>> {
            Ok(Vec::new())
        }
        async fn scan_cells(
            &self,
            column_name: &str,
            after_added_id: i64,
            limit: i64,
        ) -> StorageResult<Vec<Cell>> {
            Ok(self
                .cells
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.column_name == column_name && c.added_id > after_added_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }
        async fn partition_read(
            &self,
            _req: PartitionReadRequest,
        ) -> StorageResult<PartitionPage> {
            Ok(PartitionPage {
                cells: Vec::new(),
                next_cursor: String::new(),
                has_more: false,
            })
        }
    }

    #[derive(Default)]
    struct MemoryCheckpoint {
        marks: Mutex<HashMap<(ShardId, String), i64>>,
    }

    #[async_trait::async_trait]
    impl Checkpoint for MemoryCheckpoint {
        async fn load(&self, shard_id: ShardId, column_name: &str) -> crate::Result<i64> {
            Ok(*self
                .marks
                .lock()
                .unwrap()
                .get(&(shard_id, column_name.to_string()))
                .unwrap_or(&0))
        }
        async fn save(
            &self,
            shard_id: ShardId,
            column_name: &str,
            added_id: i64,
        ) -> crate::Result<()> {
            self.marks
                .lock()
                .unwrap()
                .insert((shard_id, column_name.to_string()), added_id);
            Ok(())
        }
    }

    struct RecordingHandler {
        seen: Mutex<Vec<i64>>,
        fail_on: Option<i64>,
        failed_once: AtomicBool,
    }

    impl RecordingHandler {
        fn new() -> Self {
            RecordingHandler {
                seen: Mutex::new(Vec::new()),
                fail_on: None,
                failed_once: AtomicBool::new(false),
            }
        }

        fn failing_once_on(added_id: i64) -> Self {
            RecordingHandler {
                seen: Mutex::new(Vec::new()),
                fail_on: Some(added_id),
                failed_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl CellHandler for RecordingHandler {
        async fn handle(&self, cell: &Cell) -> std::result::Result<(), HandlerError> {
            if self.fail_on == Some(cell.added_id) && !self.failed_once.swap(true, Ordering::SeqCst)
            {
                return Err("transient handler failure".into());
            }
            self.seen.lock().unwrap().push(cell.added_id);
            Ok(())
        }
    }

    fn watcher_with(
        handler: Arc<RecordingHandler>,
        store: Arc<MemoryCellStore>,
        checkpoint: Arc<MemoryCheckpoint>,
    ) -> Arc<Watcher> {
        let mut registry = HandlerRegistry::new();
        registry.register("events", handler);
        let mut stores: HashMap<ShardId, Arc<dyn CellStore>> = HashMap::new();
        stores.insert(0, store);
        Arc::new(Watcher::new(
            Arc::new(registry),
            checkpoint,
            stores,
            Duration::from_millis(10),
            3,
        ))
    }

    async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn processes_cells_in_order_and_advances_checkpoint() {
        let handler = Arc::new(RecordingHandler::new());
        let store = Arc::new(MemoryCellStore::with_cells("events", 8));
        let checkpoint = Arc::new(MemoryCheckpoint::default());
        let watcher = watcher_with(handler.clone(), store, checkpoint.clone());

        let shutdown = CancellationToken::new();
        let handles = watcher.start(shutdown.clone());
        assert_eq!(handles.len(), 1);

        assert!(
            wait_until(Duration::from_secs(2), || {
                handler.seen.lock().unwrap().len() == 8
            })
            .await
        );

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen, (1..=8).collect::<Vec<i64>>());
        assert!(
            wait_until(Duration::from_secs(2), || {
                checkpoint
                    .marks
                    .lock()
                    .unwrap()
                    .get(&(0, "events".to_string()))
                    == Some(&8)
            })
            .await
        );

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn failed_cell_is_retried_next_poll() {
        let handler = Arc::new(RecordingHandler::failing_once_on(4));
        let store = Arc::new(MemoryCellStore::with_cells("events", 6));
        let checkpoint = Arc::new(MemoryCheckpoint::default());
        let watcher = watcher_with(handler.clone(), store, checkpoint.clone());

        let shutdown = CancellationToken::new();
        let handles = watcher.start(shutdown.clone());

        assert!(
            wait_until(Duration::from_secs(2), || {
                handler.seen.lock().unwrap().len() == 6
            })
            .await
        );

        // Cell 4 failed once, halted its batch, and was re-delivered.
        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn resumes_from_persisted_checkpoint() {
        let handler = Arc::new(RecordingHandler::new());
        let store = Arc::new(MemoryCellStore::with_cells("events", 5));
        let checkpoint = Arc::new(MemoryCheckpoint::default());
        checkpoint.save(0, "events", 3).await.unwrap();

        let watcher = watcher_with(handler.clone(), store, checkpoint);
        let shutdown = CancellationToken::new();
        let handles = watcher.start(shutdown.clone());

        assert!(
            wait_until(Duration::from_secs(2), || {
                handler.seen.lock().unwrap().len() == 2
            })
            .await
        );
        assert_eq!(handler.seen.lock().unwrap().clone(), vec![4, 5]);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn no_handlers_means_no_tasks() {
        let registry = Arc::new(HandlerRegistry::new());
        let checkpoint = Arc::new(MemoryCheckpoint::default());
        let stores: HashMap<ShardId, Arc<dyn CellStore>> = HashMap::new();
        let watcher = Arc::new(Watcher::new(
            registry,
            checkpoint,
            stores,
            Duration::from_millis(10),
            10,
        ));
        assert!(watcher.start(CancellationToken::new()).is_empty());
    }
}
