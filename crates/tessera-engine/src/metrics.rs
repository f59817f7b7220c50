//! Operator-visible counters.
//!
//! Plain atomics, snapshotted on demand. Index failures in particular must be
//! trackable by operators: an index write that fails is swallowed by the
//! write path (the cell stands), so this counter is the signal that offline
//! index repair is needed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    cells_written: AtomicU64,
    index_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn record_write(&self) {
        self.cells_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_index_failure(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cells_written(&self) -> u64 {
        self.cells_written.load(Ordering::Relaxed)
    }

    pub fn index_failures(&self) -> u64 {
        self.index_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cells_written: u64,
    pub index_failures: u64,
    pub notification_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = EngineMetrics::default();
        metrics.record_write();
        metrics.record_write();
        metrics.record_index_failure();
        assert_eq!(metrics.cells_written(), 2);
        assert_eq!(metrics.index_failures(), 1);
    }
}
