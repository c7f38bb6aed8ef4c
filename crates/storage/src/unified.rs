//! UnifiedStore: ordered MVCC storage backend
//!
//! This module implements the Storage trait using:
//! - `BTreeMap<Vec<u8>, VersionChain>` for ordered byte-key storage
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` for monotonically increasing version numbers
//!
//! # Design Notes
//!
//! - **Version chains**: every key keeps the versions a live snapshot may still read
//! - **Tombstones**: deletes are recorded as versioned markers, pruned by `gc_versions`
//! - **Batch atomicity**: a batch is applied under one write lock acquisition
//! - **Pinned snapshots**: open snapshots pin their version so GC keeps what they read

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use tessera_core::{Error, Result, ScanEntry, Storage, VersionedValue};

use crate::chain::VersionChain;
use crate::snapshot::Snapshot;
use crate::stored_value::StoredValue;

/// Ordered multi-version byte store
///
/// Thread-safe through `parking_lot::RwLock` and `AtomicU64`.
#[derive(Debug)]
pub struct UnifiedStore {
    /// Ordered map from key to its version chain
    data: RwLock<BTreeMap<Vec<u8>, VersionChain>>,
    /// Version of the last applied batch
    version: AtomicU64,
    /// Snapshot versions currently held open, with reference counts
    pinned: Mutex<BTreeMap<u64, usize>>,
}

impl UnifiedStore {
    /// Create a new empty store
    ///
    /// Initial version is 0 (no writes have occurred).
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            pinned: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a point-in-time snapshot
    ///
    /// The read lock is taken before the version is read so that a batch
    /// being applied concurrently is either fully visible or not at all.
    pub fn snapshot(self: &Arc<Self>) -> Snapshot {
        let _guard = self.data.read();
        let version = self.current_version();
        self.pin(version);
        Snapshot::new(Arc::clone(self), version)
    }

    pub(crate) fn pin(&self, version: u64) {
        *self.pinned.lock().entry(version).or_insert(0) += 1;
    }

    pub(crate) fn unpin(&self, version: u64) {
        let mut pinned = self.pinned.lock();
        if let Some(count) = pinned.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(&version);
            }
        }
    }

    /// Oldest version an open snapshot can read, or the current version
    pub fn min_pinned_version(&self) -> u64 {
        self.pinned
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.current_version())
    }

    /// Prune version chains that no open snapshot can observe
    ///
    /// Returns the number of keys dropped entirely.
    pub fn gc_versions(&self) -> usize {
        let min_version = self.min_pinned_version();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, chain| {
            chain.gc(min_version);
            !chain.is_dead(min_version)
        });
        let dropped = before - data.len();
        if dropped > 0 {
            debug!(dropped, min_version, "pruned dead version chains");
        }
        dropped
    }

    /// Number of keys with at least one retained version
    pub fn key_count(&self) -> usize {
        self.data.read().len()
    }

    fn range_start<'a>(prefix: &'a [u8], from: Bound<&'a [u8]>) -> Bound<&'a [u8]> {
        match from {
            Bound::Included(key) if key >= prefix => Bound::Included(key),
            Bound::Excluded(key) if key >= prefix => Bound::Excluded(key),
            _ => Bound::Included(prefix),
        }
    }
}

impl Default for UnifiedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for UnifiedStore {
    fn get_versioned(&self, key: &[u8], max_version: u64) -> Result<Option<VersionedValue>> {
        let data = self.data.read();
        Ok(data
            .get(key)
            .and_then(|chain| chain.get_at_version(max_version))
            .and_then(StoredValue::to_versioned))
    }

    fn latest_version(&self, key: &[u8]) -> u64 {
        let data = self.data.read();
        data.get(key)
            .and_then(VersionChain::latest)
            .map_or(0, StoredValue::version)
    }

    fn scan_batch(
        &self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        max_version: u64,
        limit: usize,
    ) -> Result<Vec<ScanEntry>> {
        let data = self.data.read();
        let start = Self::range_start(prefix, from);
        let entries = data
            .range::<[u8], _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, chain)| {
                chain
                    .get_at_version(max_version)
                    .and_then(StoredValue::to_versioned)
                    .map(|vv| (key.clone(), vv))
            })
            .take(limit)
            .collect();
        Ok(entries)
    }

    fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn apply_batch(
        &self,
        writes: Vec<(Vec<u8>, Vec<u8>)>,
        deletes: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<()> {
        if let Some((key, _)) = writes.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::invalid_input(format!(
                "empty value for key {:?}",
                String::from_utf8_lossy(key)
            )));
        }

        let mut data = self.data.write();
        for (key, value) in writes {
            let sv = StoredValue::live(value, version);
            match data.get_mut(&key) {
                Some(chain) => chain.push(sv),
                None => {
                    data.insert(key, VersionChain::new(sv));
                }
            }
        }
        for key in deletes {
            // Deleting a key that was never written leaves nothing to mark
            if let Some(chain) = data.get_mut(&key) {
                chain.push(StoredValue::tombstone(version));
            }
        }

        // Published while the write lock is still held
        self.version.fetch_max(version, Ordering::SeqCst);
        Ok(())
    }
}
