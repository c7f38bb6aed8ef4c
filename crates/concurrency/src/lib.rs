//! Optimistic concurrency control for tessera
//!
//! This crate implements snapshot-isolated transactions:
//! - TransactionContext: read/write/delete sets with read-your-writes scans
//! - Validation: read-write and write-write conflict detection
//! - TransactionManager: first-committer-wins commit protocol

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{CommitError, PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{
    validate_read_set, validate_transaction, validate_write_set, ConflictType, ValidationResult,
};
