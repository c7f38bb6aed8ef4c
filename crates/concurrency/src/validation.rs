//! Transaction validation for OCC
//!
//! Conflict rules:
//! - Read-write: a key read from the snapshot changed before commit
//! - Write-write: a key this transaction writes or deletes was written by
//!   another transaction that committed after this one started
//!
//! Two transactions that both update the same key therefore cannot both
//! commit; the first committer wins.

use crate::transaction::TransactionContext;
use tessera_core::traits::Storage;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Key was read at one version but its current live version differs
    ReadWriteConflict {
        /// The key that has a conflict
        key: Vec<u8>,
        /// Version recorded in read_set when read (0 = absent)
        read_version: u64,
        /// Current live version in storage at validation time (0 = absent)
        current_version: u64,
    },

    /// Key written by this transaction was committed by someone else first
    WriteWriteConflict {
        /// The key that has a conflict
        key: Vec<u8>,
        /// Version this transaction started at
        start_version: u64,
        /// Newest committed version of the key, deletions included
        current_version: u64,
    },
}

impl ConflictType {
    /// Key involved in the conflict
    pub fn key(&self) -> &[u8] {
        match self {
            ConflictType::ReadWriteConflict { key, .. } => key,
            ConflictType::WriteWriteConflict { key, .. } => key,
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Short human-readable description
    pub fn summary(&self) -> String {
        match self.conflicts.first() {
            None => "no conflicts".to_string(),
            Some(first) => format!(
                "{} conflict(s), first on key {:?}",
                self.conflicts.len(),
                String::from_utf8_lossy(first.key())
            ),
        }
    }
}

/// Validate the read-set against current storage state
///
/// For each key read from the snapshot, compare the version observed then
/// with the live version now.
pub fn validate_read_set<S: Storage>(txn: &TransactionContext, store: &S) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (key, &read_version) in txn.read_set.iter() {
        let current_version = match store.get(key) {
            Ok(Some(vv)) => vv.version,
            Ok(None) => 0,
            // Unreadable counts as changed
            Err(_) => u64::MAX,
        };
        if current_version != read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version,
                current_version,
            });
        }
    }
    result
}

/// Validate buffered writes and deletes against concurrent commits
pub fn validate_write_set<S: Storage>(txn: &TransactionContext, store: &S) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let written = txn.write_set.keys().chain(txn.delete_set.iter());
    for key in written {
        let current_version = store.latest_version(key);
        if current_version > txn.start_version {
            result.conflicts.push(ConflictType::WriteWriteConflict {
                key: key.clone(),
                start_version: txn.start_version,
                current_version,
            });
        }
    }
    result
}

/// Run every validation phase
pub fn validate_transaction<S: Storage>(txn: &TransactionContext, store: &S) -> ValidationResult {
    let mut result = validate_read_set(txn, store);
    result.merge(validate_write_set(txn, store));
    result
}
