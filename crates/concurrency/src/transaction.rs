//! Transaction context for optimistic concurrency control
//!
//! A transaction reads through a snapshot taken when it began and buffers
//! its writes and deletes until commit. Reads see the transaction's own
//! pending changes (read-your-writes), including prefix scans, which merge
//! pending writes into the snapshot's ordered stream.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tessera_core::traits::{SnapshotView, Storage};
use tessera_core::{Error, Result};
use tessera_storage::BatchSource;

use crate::validation::{validate_transaction, ValidationResult};

/// Error type for commit failures
#[derive(Debug, Clone)]
pub enum CommitError {
    /// Transaction aborted due to validation conflicts
    ValidationFailed(ValidationResult),

    /// Transaction was not in correct state for commit
    InvalidState(String),

    /// The store refused the batch
    Storage(String),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::ValidationFailed(result) => {
                write!(f, "Commit failed: {}", result.summary())
            }
            CommitError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CommitError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<CommitError> for Error {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => Error::BackendConflict {
                operation: String::new(),
                namespace: String::new(),
                reason: result.summary(),
            },
            CommitError::InvalidState(msg) => Error::TransactionNotActive(msg),
            CommitError::Storage(msg) => Error::Storage(msg),
        }
    }
}

/// Summary of pending operations that would be discarded on rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of pending put operations
    pub puts: usize,
    /// Number of pending delete operations
    pub deletes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Aborted` (conflict detected)
/// - `Active` → `Aborted` (rollback or error)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// Snapshot-isolated transaction with buffered writes
///
/// # Lifecycle
///
/// 1. **BEGIN**: Create with `with_snapshot()`, status is `Active`
/// 2. **READ/WRITE**: Use `get()`, `put()`, `delete()`, or scan via [`BatchSource`]
/// 3. **COMMIT**: `TransactionManager::commit` validates and applies
/// 4. **ROLLBACK**: `rollback()` discards everything buffered
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,

    /// Version at transaction start (snapshot version)
    pub start_version: u64,

    snapshot: Box<dyn SnapshotView>,

    /// Keys read from the snapshot and the version observed
    ///
    /// Version 0 means the key did not exist when read.
    pub read_set: FxHashMap<Vec<u8>, u64>,

    /// Buffered writes, ordered so scans can merge them
    pub write_set: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Buffered deletes
    pub delete_set: BTreeSet<Vec<u8>>,

    /// Current transaction status
    pub status: TransactionStatus,

    start_time: Instant,
}

impl TransactionContext {
    /// Create a new transaction reading from `snapshot`
    pub fn with_snapshot(txn_id: u64, snapshot: Box<dyn SnapshotView>) -> Self {
        TransactionContext {
            txn_id,
            start_version: snapshot.version(),
            snapshot,
            read_set: FxHashMap::default(),
            write_set: BTreeMap::new(),
            delete_set: BTreeSet::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    // === Read Operations ===

    /// Get a value from the transaction
    ///
    /// 1. Pending write from this transaction (no read_set entry)
    /// 2. Pending delete from this transaction (no read_set entry)
    /// 3. Snapshot read, tracked in read_set
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_active()?;
        if let Some(value) = self.write_set.get(key) {
            return Ok(Some(value.clone()));
        }
        if self.delete_set.contains(key) {
            return Ok(None);
        }
        self.read_from_snapshot(key)
    }

    fn read_from_snapshot(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.snapshot.get(key)? {
            Some(vv) => {
                self.read_set.insert(key.to_vec(), vv.version);
                Ok(Some(vv.value))
            }
            None => {
                // Absent reads are tracked too: a concurrent create must conflict
                self.read_set.insert(key.to_vec(), 0);
                Ok(None)
            }
        }
    }

    /// Version recorded for `key` in the read set
    pub fn get_read_version(&self, key: &[u8]) -> Option<u64> {
        self.read_set.get(key).copied()
    }

    // === Write Operations ===

    /// Buffer a write
    ///
    /// The store cannot hold zero-length values, so they are rejected here.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.ensure_active()?;
        if value.is_empty() {
            return Err(Error::invalid_input(format!(
                "empty value for key {:?}",
                String::from_utf8_lossy(&key)
            )));
        }
        self.delete_set.remove(&key);
        self.write_set.insert(key, value);
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.ensure_active()?;
        self.write_set.remove(&key);
        self.delete_set.insert(key);
        Ok(())
    }

    // === State ===

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// True when nothing has been buffered
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty()
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Error unless the transaction is still active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive(format!("{:?}", self.status)))
        }
    }

    /// Summary of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            puts: self.write_set.len(),
            deletes: self.delete_set.len(),
        }
    }

    /// Number of keys read from the snapshot
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Discard buffered changes and abort
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.write_set.clear();
        self.delete_set.clear();
        self.status = TransactionStatus::Aborted {
            reason: "rolled back".to_string(),
        };
        Ok(())
    }

    // === Commit ===

    /// Validate against `store` and transition to `Committed`
    ///
    /// Must be called with the commit lock held (see `TransactionManager`),
    /// otherwise another transaction may commit between validation and apply.
    pub fn commit<S: Storage>(&mut self, store: &S) -> std::result::Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!("{:?}", self.status)));
        }
        self.status = TransactionStatus::Validating;

        let result = validate_transaction(self, store);
        if !result.is_valid() {
            self.status = TransactionStatus::Aborted {
                reason: result.summary(),
            };
            return Err(CommitError::ValidationFailed(result));
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Finish a transaction that buffered nothing
    ///
    /// Snapshot reads need no validation when nothing is written.
    pub fn commit_read_only(&mut self) -> std::result::Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!("{:?}", self.status)));
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Hand the buffered batch to the store under `commit_version`
    pub fn apply_writes<S: Storage>(
        &mut self,
        store: &S,
        commit_version: u64,
    ) -> std::result::Result<PendingOperations, CommitError> {
        let applied = self.pending_operations();
        let writes = std::mem::take(&mut self.write_set).into_iter().collect();
        let deletes = std::mem::take(&mut self.delete_set).into_iter().collect();
        store
            .apply_batch(writes, deletes, commit_version)
            .map_err(|e| CommitError::Storage(e.to_string()))?;
        Ok(applied)
    }

    /// Ordered view of pending writes inside `prefix` within the given bounds
    fn pending_range<'a>(
        &'a self,
        prefix: &'a [u8],
        lower: Bound<&'a [u8]>,
        upper: Bound<&'a [u8]>,
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> + 'a {
        let lower = match lower {
            Bound::Included(k) if k >= prefix => Bound::Included(k),
            Bound::Excluded(k) if k >= prefix => Bound::Excluded(k),
            _ => Bound::Included(prefix),
        };
        self.write_set
            .range::<[u8], _>((lower, upper))
            .take_while(move |(k, _)| k.starts_with(prefix))
    }
}

impl BatchSource for TransactionContext {
    fn next_batch(
        &mut self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.ensure_active()?;
        let limit = limit.max(1);
        let mut out = Vec::new();
        let mut lower: Bound<Vec<u8>> = match from {
            Bound::Included(k) => Bound::Included(k.to_vec()),
            Bound::Excluded(k) => Bound::Excluded(k.to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };

        loop {
            let lower_ref = match &lower {
                Bound::Included(k) => Bound::Included(k.as_slice()),
                Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };
            let batch = self.snapshot.scan_batch(prefix, lower_ref, limit)?;
            let snapshot_done = batch.len() < limit;
            let last_snapshot_key = batch.last().map(|(k, _)| k.clone());

            let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
            for (key, vv) in batch {
                if !self.write_set.contains_key(&key) && !self.delete_set.contains(&key) {
                    self.read_set.insert(key.clone(), vv.version);
                    merged.insert(key, vv.value);
                }
            }
            let upper = match (&last_snapshot_key, snapshot_done) {
                (Some(last), false) => Bound::Included(last.as_slice()),
                _ => Bound::Unbounded,
            };
            for (key, value) in self.pending_range(prefix, lower_ref, upper) {
                merged.insert(key.clone(), value.clone());
            }
            out.extend(merged);

            match last_snapshot_key {
                Some(last) if !snapshot_done && out.len() < limit => {
                    lower = Bound::Excluded(last);
                }
                _ => break,
            }
        }

        out.truncate(limit);
        Ok(out)
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("deletes", &self.delete_set.len())
            .finish()
    }
}
