//! One entry in a key's version chain
//!
//! A deletion is kept as a tombstone entry so that snapshots taken before
//! the delete still see the old value, and so that write-write conflict
//! detection can tell that the key changed.

use tessera_core::VersionedValue;

/// A stored value or tombstone, stamped with its commit version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// `None` marks a deletion
    value: Option<Vec<u8>>,
    /// Commit version that wrote this entry
    version: u64,
}

impl StoredValue {
    /// A live value
    pub fn live(value: Vec<u8>, version: u64) -> Self {
        StoredValue {
            value: Some(value),
            version,
        }
    }

    /// A deletion marker
    pub fn tombstone(version: u64) -> Self {
        StoredValue {
            value: None,
            version,
        }
    }

    /// Commit version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stored bytes, `None` for a tombstone
    #[inline]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Whether this entry marks a deletion
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Convert to the contract type; tombstones yield `None`
    pub fn to_versioned(&self) -> Option<VersionedValue> {
        self.value
            .as_ref()
            .map(|v| VersionedValue::new(v.clone(), self.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_value() {
        let sv = StoredValue::live(b"abc".to_vec(), 3);
        assert_eq!(sv.version(), 3);
        assert_eq!(sv.value(), Some(&b"abc"[..]));
        assert!(!sv.is_tombstone());
        assert_eq!(sv.to_versioned().unwrap().version, 3);
    }

    #[test]
    fn test_tombstone() {
        let sv = StoredValue::tombstone(9);
        assert!(sv.is_tombstone());
        assert_eq!(sv.value(), None);
        assert!(sv.to_versioned().is_none());
    }
}
