//! Core identity types
//!
//! - [`ObjectId`]: the 16-byte identity minted for every stored object
//! - [`DataType`]: which type engine owns an object, with its persisted tag byte
//! - [`Category`]: the key-space partition byte that follows a namespace header

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of an encoded [`ObjectId`]
pub const OBJECT_ID_LEN: usize = 16;

/// Unique identifier of a stored object
///
/// Data rows of composite values are addressed by this id, never by the
/// user key. Overwriting or deleting a key therefore never rewrites the old
/// rows; they are reclaimed later by the GC sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Mint a fresh random id
    pub fn new() -> Self {
        ObjectId(*Uuid::new_v4().as_bytes())
    }

    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        ObjectId(bytes)
    }

    /// Decode from the first 16 bytes of `slice`
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() < OBJECT_ID_LEN {
            return Err(Error::corruption(format!(
                "object id needs {} bytes, got {}",
                OBJECT_ID_LEN,
                slice.len()
            )));
        }
        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes.copy_from_slice(&slice[..OBJECT_ID_LEN]);
        Ok(ObjectId(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

/// Kind of value a user key holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Scalar string, stored inline in the metadata record
    String,
    /// Field/value map
    Hash,
    /// Double-ended sequence
    List,
    /// Unordered unique members
    Set,
    /// Members ordered by a floating-point score
    ZSet,
}

impl DataType {
    /// Persisted tag byte
    pub fn tag(self) -> u8 {
        match self {
            DataType::String => b'r',
            DataType::Hash => b'h',
            DataType::List => b'l',
            DataType::Set => b's',
            DataType::ZSet => b'z',
        }
    }

    /// Decode a persisted tag byte
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'r' => Ok(DataType::String),
            b'h' => Ok(DataType::Hash),
            b'l' => Ok(DataType::List),
            b's' => Ok(DataType::Set),
            b'z' => Ok(DataType::ZSet),
            other => Err(Error::corruption(format!("unknown type tag 0x{:02x}", other))),
        }
    }

    /// Name reported by TYPE-style commands
    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Hash => "hash",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::ZSet => "zset",
        }
    }

    /// Whether the object owns data rows that must be garbage collected
    pub fn is_composite(self) -> bool {
        !matches!(self, DataType::String)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key-space partition inside a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// `m`: user key -> metadata record
    Meta,
    /// `d`: object id + suffix -> element payload
    Data,
    /// `e`: expire time + user key -> object id + type
    Expire,
    /// `g`: object id -> type
    Gc,
}

impl Category {
    /// Persisted tag byte
    pub fn tag(self) -> u8 {
        match self {
            Category::Meta => b'm',
            Category::Data => b'd',
            Category::Expire => b'e',
            Category::Gc => b'g',
        }
    }
}
