//! Core trait definitions for the ordered store
//!
//! This module defines the seams between the storage layer and the
//! transaction layer:
//! - Storage: versioned, ordered byte-key store
//! - SnapshotView: immutable point-in-time view of a Storage
//!
//! Keys and values are raw bytes. Keys sort lexicographically as unsigned
//! bytes. Values are never empty; the store rejects zero-length values.

use crate::error::Result;
use std::ops::Bound;

/// A value together with the commit version that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Stored bytes (never empty)
    pub value: Vec<u8>,
    /// Commit version that produced this value
    pub version: u64,
}

impl VersionedValue {
    /// Pair a value with its version
    pub fn new(value: Vec<u8>, version: u64) -> Self {
        Self { value, version }
    }
}

/// One entry returned by a range read
pub type ScanEntry = (Vec<u8>, VersionedValue);

/// Versioned ordered key-value store
///
/// Implementations must be thread-safe (Send + Sync). Every committed batch
/// carries one version; all keys written by that batch share it.
pub trait Storage: Send + Sync {
    /// Latest live value of `key` visible at or below `max_version`
    ///
    /// Returns `None` if the key never existed or its newest visible entry is
    /// a deletion.
    fn get_versioned(&self, key: &[u8], max_version: u64) -> Result<Option<VersionedValue>>;

    /// Latest live value of `key` at the current version
    fn get(&self, key: &[u8]) -> Result<Option<VersionedValue>> {
        self.get_versioned(key, self.current_version())
    }

    /// Version of the newest entry for `key`, deletions included
    ///
    /// Returns 0 if the key has never been written. Used for write-write
    /// conflict detection.
    fn latest_version(&self, key: &[u8]) -> u64;

    /// Up to `limit` live entries whose keys start with `prefix`, in key order
    ///
    /// `from` positions the scan inside the prefix; `Unbounded` starts at the
    /// prefix itself. A bound that sorts before the prefix is ignored.
    fn scan_batch(
        &self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        max_version: u64,
        limit: usize,
    ) -> Result<Vec<ScanEntry>>;

    /// Current global version (last committed batch)
    fn current_version(&self) -> u64;

    /// Apply a committed batch with the given version
    ///
    /// Writes and deletes become visible together. `version` must be greater
    /// than every version applied before it.
    fn apply_batch(
        &self,
        writes: Vec<(Vec<u8>, Vec<u8>)>,
        deletes: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<()>;
}

/// Immutable point-in-time view of a store
///
/// Reads through a snapshot never observe batches committed after the
/// snapshot was taken.
pub trait SnapshotView: Send + Sync {
    /// Version this snapshot was taken at
    fn version(&self) -> u64;

    /// Live value of `key` as of the snapshot
    fn get(&self, key: &[u8]) -> Result<Option<VersionedValue>>;

    /// Up to `limit` live entries under `prefix`, starting at `from`
    fn scan_batch(&self, prefix: &[u8], from: Bound<&[u8]>, limit: usize)
        -> Result<Vec<ScanEntry>>;
}
