//! Core types and traits for tessera
//!
//! This crate defines the foundational pieces used throughout the system:
//! - Error: error taxonomy shared by all layers
//! - ObjectId: 16-byte identity of a stored object
//! - DataType / Category: persisted tag bytes
//! - codec: big-endian integers and the order-preserving score transform
//! - Traits: Storage and SnapshotView over raw byte keys
//! - clock: epoch time in the units metadata records use

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod codec;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{ScanEntry, SnapshotView, Storage, VersionedValue};
pub use types::{Category, DataType, ObjectId, OBJECT_ID_LEN};

/// Fixed system tag that starts every namespace header
pub const SYSTEM_PREFIX: &[u8] = b"kv";

/// Stand-in for a zero-length value, which the store cannot hold
pub const EMPTY_SENTINEL: &[u8] = &[0x00];

/// Upper bound on keys returned by one enumeration call
pub const MAX_KEYS_PER_CALL: u64 = 5000;
