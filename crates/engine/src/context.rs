//! Transaction context
//!
//! Wraps the ordered store for one session. Reads go to a point-in-time
//! snapshot unless a write transaction is open, in which case every read
//! and scan goes through the transaction so the commit validates it.
//!
//! The store cannot hold zero-length values. Writes of an empty value store
//! [`EMPTY_SENTINEL`] instead, and every read path maps it back.

use std::ops::Bound;
use std::sync::Arc;

use tessera_concurrency::{TransactionContext, TransactionManager};
use tessera_core::{Error, Result, SnapshotView, EMPTY_SENTINEL};
use tessera_storage::{BatchSource, ScanCursor, ScanOptions, Snapshot, UnifiedStore};
use tracing::debug;

use crate::environ::Environ;

fn encode_value(value: Vec<u8>) -> Vec<u8> {
    if value.is_empty() {
        EMPTY_SENTINEL.to_vec()
    } else {
        value
    }
}

fn decode_value(value: Vec<u8>) -> Vec<u8> {
    if value == EMPTY_SENTINEL {
        Vec::new()
    } else {
        value
    }
}

/// Snapshot-or-transaction access to the store
pub struct StoreContext {
    store: Arc<UnifiedStore>,
    manager: Arc<TransactionManager>,
    scan_batch_size: usize,
    snapshot: Snapshot,
    txn: Option<TransactionContext>,
}

impl StoreContext {
    /// Context reading from a fresh snapshot
    pub fn new(
        store: Arc<UnifiedStore>,
        manager: Arc<TransactionManager>,
        scan_batch_size: usize,
    ) -> Self {
        let snapshot = store.snapshot();
        StoreContext {
            store,
            manager,
            scan_batch_size: scan_batch_size.max(1),
            snapshot,
            txn: None,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<UnifiedStore> {
        &self.store
    }

    /// Replace the read snapshot with a current one
    pub fn read_snapshot(&mut self) {
        self.snapshot = self.store.snapshot();
    }

    /// Version the read snapshot was taken at
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Open a write transaction, discarding any transaction left open
    pub fn begin_write(&mut self) {
        if let Some(mut stale) = self.txn.take() {
            let _ = stale.rollback();
        }
        self.txn = Some(self.manager.begin(&self.store));
    }

    /// Whether a write transaction is open
    pub fn in_write(&self) -> bool {
        self.txn.is_some()
    }

    fn txn_mut(&mut self) -> Result<&mut TransactionContext> {
        self.txn
            .as_mut()
            .ok_or_else(|| Error::TransactionNotActive("no write transaction open".into()))
    }

    /// Point read
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = match self.txn.as_mut() {
            Some(txn) => txn.get(key)?,
            None => self.snapshot.get(key)?.map(|vv| vv.value),
        };
        Ok(value.map(decode_value))
    }

    /// Point reads, one result per key in input order
    pub fn batch_get(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Buffer a write; requires a write transaction
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.txn_mut()?.put(key, encode_value(value))
    }

    /// Buffer a delete; requires a write transaction
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.txn_mut()?.delete(key)
    }

    /// Lazy cursor over `prefix`
    ///
    /// `start` positions the cursor (inclusive), `offset` entries are
    /// skipped and at most `limit` are yielded (0 = no cap).
    pub fn scan(
        &mut self,
        prefix: Vec<u8>,
        start: Option<Vec<u8>>,
        offset: u64,
        limit: u64,
    ) -> Cursor<'_> {
        let mut options = ScanOptions::limit(limit)
            .with_offset(offset)
            .with_batch_size(self.scan_batch_size);
        if let Some(start) = start {
            options = options.with_start(start);
        }
        let source = match self.txn.as_mut() {
            Some(txn) => ContextSource::Txn(txn),
            None => ContextSource::Snapshot(&self.snapshot),
        };
        Cursor {
            inner: ScanCursor::new(source, prefix, options),
        }
    }

    /// Commit the open write transaction
    ///
    /// A rejected commit is reported as [`Error::BackendConflict`] tagged with
    /// `operation` and the namespace, and recorded as a failed transaction.
    /// The read snapshot is refreshed either way.
    pub fn commit(&mut self, env: &Environ, operation: &str) -> Result<u64> {
        let mut txn = self.txn.take().ok_or_else(|| {
            Error::TransactionNotActive(format!("{}: no write transaction open", operation))
        })?;
        let result = self.manager.commit(&mut txn, self.store.as_ref());
        self.read_snapshot();
        match result {
            Ok(version) => {
                debug!(operation, namespace = env.namespace_name(), version, "committed");
                Ok(version)
            }
            Err(e) => {
                env.failed_txn(operation);
                Err(Error::from(e).with_operation(operation, env.namespace_name()))
            }
        }
    }

    /// Discard the open write transaction, if any
    pub fn rollback(&mut self) {
        if let Some(mut txn) = self.txn.take() {
            let _ = txn.rollback();
        }
    }

    /// Zero-based position of `key` among the keys under `prefix`
    pub fn index(&mut self, prefix: Vec<u8>, key: &[u8]) -> Result<Option<u64>> {
        let mut position = 0;
        for entry in self.scan(prefix, None, 0, 0) {
            let (k, _) = entry?;
            match k.as_slice().cmp(key) {
                std::cmp::Ordering::Less => position += 1,
                std::cmp::Ordering::Equal => return Ok(Some(position)),
                std::cmp::Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Number of keys under `prefix`
    pub fn count_prefix(&mut self, prefix: Vec<u8>) -> Result<u64> {
        self.scan(prefix, None, 0, 0).count_entries()
    }

    /// Delete every key under `prefix`; requires a write transaction
    pub fn delete_prefix(&mut self, prefix: Vec<u8>) -> Result<u64> {
        let keys = self.scan(prefix, None, 0, 0).keys()?;
        let n = keys.len() as u64;
        for key in keys {
            self.delete(key)?;
        }
        Ok(n)
    }
}

enum ContextSource<'a> {
    Snapshot(&'a Snapshot),
    Txn(&'a mut TransactionContext),
}

impl BatchSource for ContextSource<'_> {
    fn next_batch(
        &mut self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match self {
            ContextSource::Snapshot(snapshot) => {
                let mut view: &Snapshot = *snapshot;
                view.next_batch(prefix, from, limit)
            }
            ContextSource::Txn(txn) => (**txn).next_batch(prefix, from, limit),
        }
    }
}

/// Cursor returned by [`StoreContext::scan`]
pub struct Cursor<'a> {
    inner: ScanCursor<ContextSource<'a>>,
}

impl Cursor<'_> {
    /// Stop early and release the source
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Collect the keys
    pub fn keys(self) -> Result<Vec<Vec<u8>>> {
        self.map(|entry| entry.map(|(key, _)| key)).collect()
    }

    /// Collect the values
    pub fn values(self) -> Result<Vec<Vec<u8>>> {
        self.map(|entry| entry.map(|(_, value)| value)).collect()
    }

    /// Count the entries
    pub fn count_entries(self) -> Result<u64> {
        self.inner.count_entries()
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|entry| entry.map(|(key, value)| (key, decode_value(value))))
    }
}
