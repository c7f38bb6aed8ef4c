//! Transaction manager for coordinating commit operations
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. acquire commit lock
//! 2. validate_transaction() - read-set and write-set conflicts
//! 3. IF conflicts: abort and return error
//! 4. allocate commit_version (store version + 1)
//! 5. apply_batch() - writes and deletes become visible together
//! 6. release commit lock, return commit_version
//! ```
//!
//! Holding one lock across validate and apply is what makes validation
//! meaningful: no other commit can land between the check and the write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::traits::Storage;
use tessera_storage::UnifiedStore;
use tracing::debug;

use crate::transaction::{CommitError, TransactionContext};

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    /// Serializes validate + apply
    commit_lock: Mutex<()>,

    /// Next transaction ID
    next_txn_id: AtomicU64,

    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        TransactionManager {
            commit_lock: Mutex::new(()),
            next_txn_id: AtomicU64::new(1),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Open a transaction over a fresh snapshot of `store`
    pub fn begin(&self, store: &Arc<UnifiedStore>) -> TransactionContext {
        TransactionContext::with_snapshot(self.next_txn_id(), Box::new(store.snapshot()))
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - Ok(commit_version) on success; a read-only transaction returns its
    ///   start version without touching the store
    /// - Err(CommitError) if validation fails or the store refuses the batch
    pub fn commit<S: Storage>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> std::result::Result<u64, CommitError> {
        if txn.is_read_only() {
            txn.commit_read_only()?;
            self.committed.fetch_add(1, Ordering::Relaxed);
            return Ok(txn.start_version);
        }

        let _guard = self.commit_lock.lock();
        if let Err(e) = txn.commit(store) {
            self.aborted.fetch_add(1, Ordering::Relaxed);
            debug!(txn_id = txn.txn_id, error = %e, "transaction aborted");
            return Err(e);
        }
        let commit_version = store.current_version() + 1;
        let applied = txn.apply_writes(store, commit_version)?;
        self.committed.fetch_add(1, Ordering::Relaxed);
        debug!(
            txn_id = txn.txn_id,
            commit_version,
            puts = applied.puts,
            deletes = applied.deletes,
            "transaction committed"
        );
        Ok(commit_version)
    }

    /// Number of successful commits
    pub fn committed_count(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Number of commits rejected by validation
    pub fn aborted_count(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_applies_with_next_version() {
        let store = Arc::new(UnifiedStore::new());
        let manager = TransactionManager::new();
        let mut txn = manager.begin(&store);
        txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let version = manager.commit(&mut txn, store.as_ref()).unwrap();
        assert_eq!(version, 1);
        assert!(txn.is_committed());
        assert_eq!(store.get(b"a").unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_read_only_commit_keeps_version() {
        let store = Arc::new(UnifiedStore::new());
        let manager = TransactionManager::new();
        let mut txn = manager.begin(&store);
        txn.get(b"a").unwrap();
        assert_eq!(manager.commit(&mut txn, store.as_ref()).unwrap(), 0);
        assert_eq!(store.current_version(), 0);
    }

    #[test]
    fn test_first_committer_wins() {
        let store = Arc::new(UnifiedStore::new());
        let manager = TransactionManager::new();
        let mut t1 = manager.begin(&store);
        let mut t2 = manager.begin(&store);
        t1.get(b"k").unwrap();
        t2.get(b"k").unwrap();
        t1.put(b"k".to_vec(), b"1".to_vec()).unwrap();
        t2.put(b"k".to_vec(), b"2".to_vec()).unwrap();

        assert!(manager.commit(&mut t1, store.as_ref()).is_ok());
        let err = manager.commit(&mut t2, store.as_ref()).unwrap_err();
        assert!(matches!(err, CommitError::ValidationFailed(_)));
        assert!(t2.is_aborted());
        assert_eq!(store.get(b"k").unwrap().unwrap().value, b"1");
        assert_eq!(manager.committed_count(), 1);
        assert_eq!(manager.aborted_count(), 1);
    }

    #[test]
    fn test_disjoint_writers_both_commit() {
        let store = Arc::new(UnifiedStore::new());
        let manager = TransactionManager::new();
        let mut t1 = manager.begin(&store);
        let mut t2 = manager.begin(&store);
        t1.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        t2.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(manager.commit(&mut t1, store.as_ref()).unwrap(), 1);
        assert_eq!(manager.commit(&mut t2, store.as_ref()).unwrap(), 2);
    }
}
