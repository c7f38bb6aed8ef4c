//! Snapshot: version-bounded view of a UnifiedStore
//!
//! Unlike a cloned map, a snapshot reads live storage and filters by its
//! version. The store keeps the versions it needs alive by pinning the
//! snapshot version until the snapshot is dropped.

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use tessera_core::{Result, ScanEntry, SnapshotView, Storage, VersionedValue};

use crate::unified::UnifiedStore;

/// Point-in-time view of a [`UnifiedStore`]
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(UnifiedStore::new());
/// let snapshot = store.snapshot();
///
/// // Batches applied after this point are not visible through `snapshot`
/// store.apply_batch(vec![(key, value)], vec![], store.current_version() + 1)?;
/// assert!(snapshot.get(&key)?.is_none());
/// ```
pub struct Snapshot {
    store: Arc<UnifiedStore>,
    version: u64,
}

impl Snapshot {
    /// Called by [`UnifiedStore::snapshot`], which has already pinned `version`
    pub(crate) fn new(store: Arc<UnifiedStore>, version: u64) -> Self {
        Snapshot { store, version }
    }

    /// Store this snapshot reads from
    pub fn store(&self) -> &Arc<UnifiedStore> {
        &self.store
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        self.store.pin(self.version);
        Snapshot {
            store: Arc::clone(&self.store),
            version: self.version,
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.store.unpin(self.version);
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .finish()
    }
}

impl SnapshotView for Snapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn get(&self, key: &[u8]) -> Result<Option<VersionedValue>> {
        self.store.get_versioned(key, self.version)
    }

    fn scan_batch(
        &self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<ScanEntry>> {
        self.store.scan_batch(prefix, from, self.version, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_isolation() {
        let store = Arc::new(UnifiedStore::new());
        store
            .apply_batch(vec![(b"a".to_vec(), b"1".to_vec())], vec![], 1)
            .unwrap();
        let snap = store.snapshot();
        store
            .apply_batch(
                vec![(b"a".to_vec(), b"2".to_vec()), (b"b".to_vec(), b"x".to_vec())],
                vec![],
                2,
            )
            .unwrap();

        assert_eq!(snap.version(), 1);
        assert_eq!(snap.get(b"a").unwrap().unwrap().value, b"1");
        assert!(snap.get(b"b").unwrap().is_none());
        assert_eq!(snap.scan_batch(b"", Bound::Unbounded, 10).unwrap().len(), 1);

        let fresh = store.snapshot();
        assert_eq!(fresh.get(b"a").unwrap().unwrap().value, b"2");
    }

    #[test]
    fn test_clone_and_drop_balance_pins() {
        let store = Arc::new(UnifiedStore::new());
        store
            .apply_batch(vec![(b"a".to_vec(), b"1".to_vec())], vec![], 1)
            .unwrap();
        let snap = store.snapshot();
        let copy = snap.clone();
        store
            .apply_batch(vec![(b"a".to_vec(), b"2".to_vec())], vec![], 2)
            .unwrap();
        drop(snap);
        assert_eq!(store.min_pinned_version(), 1);
        drop(copy);
        assert_eq!(store.min_pinned_version(), 2);
    }
}
