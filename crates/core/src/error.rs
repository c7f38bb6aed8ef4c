//! Error types for tessera
//!
//! This module defines the error taxonomy shared by every layer, from the
//! ordered store up to the type engines.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Callers are expected to treat [`Error::KeyNotExist`] and [`Error::OutOfBounds`]
//! as ordinary "empty" outcomes. [`Error::TypeMismatch`] and
//! [`Error::NumericConversion`] are command errors. [`Error::BackendConflict`]
//! means a concurrent writer won the race; nothing in this workspace retries it.

use crate::types::DataType;
use std::io;
use thiserror::Error;

/// Result type alias for tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tessera
#[derive(Debug, Error)]
pub enum Error {
    /// The resolved key has no live metadata
    #[error("key not exist")]
    KeyNotExist,

    /// A conditional write found a live value where none was allowed
    #[error("key already exists")]
    KeyExists,

    /// The stored object is of a different type than the operation expects
    #[error("WRONGTYPE operation against a key holding the wrong kind of value (expected {expected}, found {actual})")]
    TypeMismatch {
        /// Type the operation works on
        expected: DataType,
        /// Type recorded in the metadata
        actual: DataType,
    },

    /// A list or sorted-set position lies outside the current extent
    #[error("index out of range")]
    OutOfBounds,

    /// Stored or supplied bytes do not parse as the required number
    #[error("value is not a valid number: {0}")]
    NumericConversion(String),

    /// The store rejected a commit because of a concurrent conflicting write
    #[error("backend conflict during {operation} in namespace {namespace}: {reason}")]
    BackendConflict {
        /// Engine operation that was committing
        operation: String,
        /// Namespace the operation ran in
        namespace: String,
        /// Conflict summary from validation
        reason: String,
    },

    /// Caller supplied an argument the engine cannot accept
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No namespace is registered under the given name or index
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Persisted bytes could not be decoded
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Ordered store error
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation attempted on a transaction that is no longer active
    #[error("transaction not active: {0}")]
    TransactionNotActive(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build an `InvalidInput` error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Build an `Internal` error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Build a `Corruption` error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// True for the "miss" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotExist)
    }

    /// True when a commit lost to a concurrent writer
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::BackendConflict { .. })
    }

    /// True for index/rank outside the current extent
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Error::OutOfBounds)
    }

    /// Attach operation and namespace to a bare conflict
    ///
    /// The transaction layer does not know which engine operation it is
    /// committing for; the engine fills that in before surfacing the error.
    pub fn with_operation(self, operation: &str, namespace: &str) -> Self {
        match self {
            Error::BackendConflict { reason, .. } => Error::BackendConflict {
                operation: operation.to_string(),
                namespace: namespace.to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_key_not_exist() {
        let err = Error::KeyNotExist;
        assert_eq!(err.to_string(), "key not exist");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_type_mismatch() {
        let err = Error::TypeMismatch {
            expected: DataType::Hash,
            actual: DataType::String,
        };
        let msg = err.to_string();
        assert!(msg.contains("WRONGTYPE"));
        assert!(msg.contains("hash"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_error_display_numeric() {
        let err = Error::NumericConversion("abc".to_string());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_with_operation_fills_conflict() {
        let err = Error::BackendConflict {
            operation: String::new(),
            namespace: String::new(),
            reason: "1 conflict(s)".to_string(),
        }
        .with_operation("hset", "default.default");
        assert!(err.is_conflict());
        let msg = err.to_string();
        assert!(msg.contains("hset"));
        assert!(msg.contains("default.default"));
        assert!(msg.contains("1 conflict(s)"));
    }

    #[test]
    fn test_with_operation_leaves_other_errors() {
        let err = Error::OutOfBounds.with_operation("lset", "default.default");
        assert!(err.is_out_of_bounds());
    }

    #[test]
    fn test_io_error_from() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(err.to_string().contains("I/O error"));
    }
}
