//! Type engines for tessera
//!
//! Each engine binds one user key to its metadata record and implements the
//! commands of one data type:
//! - **StringRef**: scalar values stored inline in the record
//! - **HashRef**: field/value rows under the object id
//! - **ListRef**: rows addressed by a signed order, bounded by head/tail
//! - **SetRef**: one row per member
//! - **ZSetRef**: member rows plus score-ordered rows
//! - **KeyRef**: type-independent expiry and introspection
//!
//! ## Transaction discipline
//!
//! Every public write opens exactly one transaction and commits it before
//! returning. Reads run against the session snapshot. A missing key is an
//! empty result on the read path, never an error.

pub mod hash;
pub mod key;
pub mod list;
pub mod server;
pub mod set;
pub mod string;
pub mod zset;

pub use hash::HashRef;
pub use key::{KeyRef, ObjectInfo};
pub use list::ListRef;
pub use server::NamespaceInfo;
pub use set::SetRef;
pub use string::{SetCondition, SetOptions, StringRef};
pub use zset::{ScoreBound, ZSetRef};

use tessera_core::{Error, Result};

/// Turn the "miss" outcome into `None`
pub(crate) fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::KeyNotExist) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resolve an inclusive `[start, stop]` range against `len` elements
///
/// Negative positions count from the end. Returns `None` when the range
/// selects nothing; otherwise both bounds lie inside `0..len`.
pub fn normalize_range(start: i64, stop: i64, len: u64) -> Option<(u64, u64)> {
    let len = i64::try_from(len).ok()?;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || stop < 0 || start > stop {
        return None;
    }
    Some((start as u64, stop as u64))
}

/// Resolve a single position against `len` elements
pub fn normalize_index(index: i64, len: u64) -> Option<u64> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        Some(index as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 5), Some((0, 4)));
        assert_eq!(normalize_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(normalize_range(-100, 2, 5), Some((0, 2)));
        assert_eq!(normalize_range(1, 100, 5), Some((1, 4)));
        assert_eq!(normalize_range(5, 10, 5), None);
        assert_eq!(normalize_range(3, 1, 5), None);
        assert_eq!(normalize_range(0, -6, 5), None);
        assert_eq!(normalize_range(0, 0, 0), None);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }

    #[test]
    fn test_found_maps_miss() {
        assert_eq!(found::<u8>(Err(Error::KeyNotExist)).unwrap(), None);
        assert_eq!(found(Ok(1)).unwrap(), Some(1));
        assert!(found::<u8>(Err(Error::OutOfBounds)).is_err());
    }
}
