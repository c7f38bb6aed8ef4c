//! Per-session execution state

use std::sync::Arc;

use tessera_core::DataType;
use tracing::{debug, warn};

use crate::namespace::Namespace;
use crate::stats::EngineStats;

/// Active namespace, its key header and the type of the running command
#[derive(Debug, Clone)]
pub struct Environ {
    namespace: Namespace,
    header: Arc<[u8]>,
    data_type: Option<DataType>,
    op_count: u64,
    stats: Arc<EngineStats>,
}

impl Environ {
    /// State bound to `namespace`
    pub fn new(namespace: Namespace, header: Arc<[u8]>, stats: Arc<EngineStats>) -> Self {
        Environ {
            namespace,
            header,
            data_type: None,
            op_count: 0,
            stats,
        }
    }

    /// Switch to another namespace
    pub fn select(&mut self, namespace: Namespace, header: Arc<[u8]>) {
        self.namespace = namespace;
        self.header = header;
    }

    /// Active namespace descriptor
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Namespace name
    pub fn namespace_name(&self) -> &str {
        &self.namespace.name
    }

    /// Prefix every key in the namespace starts with
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Type of the command in flight
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    /// Commands run through this state
    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Mark the start of a command on an object of `data_type`
    pub fn begin_command(&mut self, data_type: DataType) {
        self.data_type = Some(data_type);
        self.op_count += 1;
        self.stats.record_command(data_type);
    }

    /// Mark the start of a command with no object type, counted under `tag`
    pub fn begin_untyped_command(&mut self, tag: &'static str) {
        self.data_type = None;
        self.op_count += 1;
        self.stats.record_command_tag(tag);
    }

    /// A commit for `operation` lost to a concurrent writer
    pub fn failed_txn(&self, operation: &str) {
        self.stats.record_failed_txn(operation, &self.namespace.name);
        warn!(
            operation,
            namespace = %self.namespace.name,
            "transaction commit failed"
        );
    }

    /// Object ids were queued for GC
    pub fn add_gc(&self, n: u64) {
        self.stats.record_gc_enqueued(n);
        debug!(namespace = %self.namespace.name, count = n, "queued objects for gc");
    }

    /// GC reclaimed queued objects
    pub fn exec_gc(&self, n: u64) {
        self.stats.record_gc_executed(n);
    }

    /// The sweeper removed expired keys
    pub fn exec_expire(&self, n: u64) {
        self.stats.record_expire_executed(n);
    }
}
