//! Version chain for MVCC
//!
//! Versions are stored in descending order (newest first) for efficient
//! snapshot reads: we typically want the most recent version <= snapshot_version.

use std::collections::VecDeque;

use crate::stored_value::StoredValue;

/// Every retained version of one key, newest first
///
/// Uses VecDeque for O(1) push_front; keys that are overwritten repeatedly
/// (list head/tail in metadata, counters) would otherwise pay O(n) per write.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: VecDeque<StoredValue>,
}

impl VersionChain {
    /// Create a new version chain with a single version
    pub fn new(value: StoredValue) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(value);
        Self { versions }
    }

    /// Add a new version (must be newer than existing versions)
    #[inline]
    pub fn push(&mut self, value: StoredValue) {
        debug_assert!(
            self.versions
                .front()
                .map_or(true, |latest| latest.version() < value.version()),
            "versions must be pushed in increasing order"
        );
        self.versions.push_front(value);
    }

    /// Entry visible at `max_version`, tombstones included
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredValue> {
        self.versions.iter().find(|sv| sv.version() <= max_version)
    }

    /// Newest entry
    #[inline]
    pub fn latest(&self) -> Option<&StoredValue> {
        self.versions.front()
    }

    /// Drop versions no reader at or above `min_version` can observe
    ///
    /// Keeps the newest entry at or below `min_version` because a snapshot
    /// at `min_version` still resolves to it.
    pub fn gc(&mut self, min_version: u64) {
        while self.versions.len() > 1 {
            let second_oldest = &self.versions[self.versions.len() - 2];
            if second_oldest.version() <= min_version {
                self.versions.pop_back();
            } else {
                break;
            }
        }
    }

    /// True when the only remaining entry is a tombstone old enough to drop
    pub fn is_dead(&self, min_version: u64) -> bool {
        self.versions.len() == 1
            && self
                .versions
                .front()
                .map_or(true, |sv| sv.is_tombstone() && sv.version() <= min_version)
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(entries: &[(Option<&[u8]>, u64)]) -> VersionChain {
        let mut iter = entries.iter().map(|(v, ver)| match v {
            Some(bytes) => StoredValue::live(bytes.to_vec(), *ver),
            None => StoredValue::tombstone(*ver),
        });
        let mut chain = VersionChain::new(iter.next().unwrap());
        for sv in iter {
            chain.push(sv);
        }
        chain
    }

    #[test]
    fn test_get_at_version_picks_newest_visible() {
        let chain = chain_of(&[(Some(b"a"), 1), (Some(b"b"), 5), (None, 9)]);
        assert!(chain.get_at_version(0).is_none());
        assert_eq!(chain.get_at_version(4).unwrap().value(), Some(&b"a"[..]));
        assert_eq!(chain.get_at_version(5).unwrap().value(), Some(&b"b"[..]));
        assert!(chain.get_at_version(10).unwrap().is_tombstone());
        assert_eq!(chain.latest().unwrap().version(), 9);
    }

    #[test]
    fn test_gc_keeps_version_visible_at_min() {
        let mut chain = chain_of(&[(Some(b"a"), 1), (Some(b"b"), 5), (Some(b"c"), 9)]);
        chain.gc(6);
        assert_eq!(chain.version_count(), 2);
        assert_eq!(chain.get_at_version(6).unwrap().value(), Some(&b"b"[..]));
        chain.gc(100);
        assert_eq!(chain.version_count(), 1);
        assert_eq!(chain.latest().unwrap().value(), Some(&b"c"[..]));
    }

    #[test]
    fn test_dead_chain() {
        let mut chain = chain_of(&[(Some(b"a"), 1), (None, 3)]);
        assert!(!chain.is_dead(2));
        chain.gc(3);
        assert!(chain.is_dead(3));
    }
}
