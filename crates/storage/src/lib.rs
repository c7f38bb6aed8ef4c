//! Storage layer for tessera
//!
//! This crate implements the ordered transactional substrate:
//! - UnifiedStore: BTreeMap of version chains behind a RwLock
//! - VersionChain / StoredValue: MVCC history with tombstones
//! - Snapshot: version-pinned point-in-time view
//! - ScanCursor: lazy, batched, prefix-bounded iteration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod cursor;
pub mod snapshot;
pub mod stored_value;
pub mod unified;

pub use chain::VersionChain;
pub use cursor::{BatchSource, ScanCursor, ScanOptions, DEFAULT_BATCH_SIZE};
pub use snapshot::Snapshot;
pub use stored_value::StoredValue;
pub use unified::UnifiedStore;
