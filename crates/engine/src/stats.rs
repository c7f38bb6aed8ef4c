//! Engine event counters
//!
//! Records the events a metrics exporter would publish: failed commits
//! tagged with operation and namespace, GC queue traffic, sweeper work and
//! commands per type. Nothing here exports; callers read a [`StatsSnapshot`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tessera_core::DataType;

/// Shared counters, one instance per database
#[derive(Debug, Default)]
pub struct EngineStats {
    failed_txns: DashMap<(String, String), u64>,
    commands: DashMap<&'static str, u64>,
    gc_enqueued: AtomicU64,
    gc_executed: AtomicU64,
    expire_executed: AtomicU64,
}

impl EngineStats {
    /// Empty counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A commit for `operation` in `namespace` was rejected
    pub fn record_failed_txn(&self, operation: &str, namespace: &str) {
        *self
            .failed_txns
            .entry((operation.to_string(), namespace.to_string()))
            .or_insert(0) += 1;
    }

    /// A command ran against an object of `data_type`
    pub fn record_command(&self, data_type: DataType) {
        self.record_command_tag(data_type.name());
    }

    /// A command not tied to one data type ran, counted under `tag`
    /// (`"key"` or `"server"`)
    pub fn record_command_tag(&self, tag: &'static str) {
        *self.commands.entry(tag).or_insert(0) += 1;
    }

    /// Object ids pushed onto a GC queue
    pub fn record_gc_enqueued(&self, n: u64) {
        self.gc_enqueued.fetch_add(n, Ordering::Relaxed);
    }

    /// Queued objects whose data rows were deleted
    pub fn record_gc_executed(&self, n: u64) {
        self.gc_executed.fetch_add(n, Ordering::Relaxed);
    }

    /// Keys removed by the expiration sweeper
    pub fn record_expire_executed(&self, n: u64) {
        self.expire_executed.fetch_add(n, Ordering::Relaxed);
    }

    /// Failed commits for one operation/namespace pair
    pub fn failed_txns(&self, operation: &str, namespace: &str) -> u64 {
        self.failed_txns
            .get(&(operation.to_string(), namespace.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            failed_txns: self
                .failed_txns
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            commands: self
                .commands
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
            gc_enqueued: self.gc_enqueued.load(Ordering::Relaxed),
            gc_executed: self.gc_executed.load(Ordering::Relaxed),
            expire_executed: self.expire_executed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the counters at one moment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Failed commits keyed by `(operation, namespace)`
    pub failed_txns: BTreeMap<(String, String), u64>,
    /// Commands keyed by type name, or `key`/`server` for untyped ones
    pub commands: BTreeMap<&'static str, u64>,
    /// Object ids enqueued for GC
    pub gc_enqueued: u64,
    /// Objects reclaimed by the GC sweeper
    pub gc_executed: u64,
    /// Keys removed by the expiration sweeper
    pub expire_executed: u64,
}

impl StatsSnapshot {
    /// Failed commits across all operations
    pub fn total_failed_txns(&self) -> u64 {
        self.failed_txns.values().sum()
    }
}
