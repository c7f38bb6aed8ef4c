//! Metadata record
//!
//! One row per user key:
//!
//! ```text
//! type(1) | id(16) | count(8) | created_at(8, secs) | expire_at(8, ms) | extra
//! ```
//!
//! For strings `extra` is the value itself. For lists it is the head and
//! tail orders as two big-endian `i64`s.

use tessera_core::clock::{now_millis, now_secs};
use tessera_core::codec::{decode_i64, decode_u64, encode_i64, encode_u64};
use tessera_core::{DataType, Error, ObjectId, Result, OBJECT_ID_LEN};

/// Bytes before `extra`
pub const META_HEADER_LEN: usize = 1 + OBJECT_ID_LEN + 8 + 8 + 8;

/// Head/tail of an empty list
pub const EMPTY_LIST_BOUNDS: (i64, i64) = (0, -1);

/// Decoded metadata row
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    /// Kind of object the key holds
    pub data_type: DataType,
    /// Identity of the object's data rows
    pub id: ObjectId,
    /// Element count for composite types
    pub count: u64,
    /// Creation time, seconds since the epoch
    pub created_at: u64,
    /// Expiry in milliseconds since the epoch; 0 means never
    pub expire_at: u64,
    /// Type-specific payload
    pub extra: Vec<u8>,
}

impl MetaRecord {
    /// Fresh record with a new object id
    pub fn new(data_type: DataType) -> Self {
        let mut meta = MetaRecord {
            data_type,
            id: ObjectId::new(),
            count: 0,
            created_at: now_secs(),
            expire_at: 0,
            extra: Vec::new(),
        };
        if data_type == DataType::List {
            meta.set_list_bounds(EMPTY_LIST_BOUNDS.0, EMPTY_LIST_BOUNDS.1);
        }
        meta
    }

    /// Recreate in place: new id, zero count and expiry, cleared payload
    pub fn reset(&mut self, data_type: DataType) {
        *self = MetaRecord::new(data_type);
    }

    /// Persisted form
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(META_HEADER_LEN + self.extra.len());
        buf.push(self.data_type.tag());
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(&encode_u64(self.count));
        buf.extend_from_slice(&encode_u64(self.created_at));
        buf.extend_from_slice(&encode_u64(self.expire_at));
        buf.extend_from_slice(&self.extra);
        buf
    }

    /// Parse a persisted record
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < META_HEADER_LEN {
            return Err(Error::corruption(format!(
                "metadata record has {} bytes, need at least {}",
                raw.len(),
                META_HEADER_LEN
            )));
        }
        Ok(MetaRecord {
            data_type: DataType::from_tag(raw[0])?,
            id: ObjectId::from_slice(&raw[1..17])?,
            count: decode_u64(&raw[17..25])?,
            created_at: decode_u64(&raw[25..33])?,
            expire_at: decode_u64(&raw[33..41])?,
            extra: raw[META_HEADER_LEN..].to_vec(),
        })
    }

    /// Whether the expiry lies before `now_ms`
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expire_at > 0 && self.expire_at < now_ms
    }

    /// Whether the expiry has passed
    pub fn check_if_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// List `(head, tail)` orders
    pub fn list_bounds(&self) -> Result<(i64, i64)> {
        if self.extra.len() < 16 {
            return Ok(EMPTY_LIST_BOUNDS);
        }
        Ok((decode_i64(&self.extra[..8])?, decode_i64(&self.extra[8..16])?))
    }

    /// Store list `(head, tail)` orders
    pub fn set_list_bounds(&mut self, head: i64, tail: i64) {
        let mut extra = Vec::with_capacity(16);
        extra.extend_from_slice(&encode_i64(head));
        extra.extend_from_slice(&encode_i64(tail));
        self.extra = extra;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let mut meta = MetaRecord::new(DataType::String);
        meta.count = 3;
        meta.expire_at = 42;
        meta.extra = b"value".to_vec();
        let raw = meta.encode();
        assert_eq!(raw[0], b'r');
        assert_eq!(&raw[1..17], meta.id.as_bytes());
        assert_eq!(&raw[17..25], &3u64.to_be_bytes());
        assert_eq!(&raw[33..41], &42u64.to_be_bytes());
        assert_eq!(&raw[41..], b"value");
        assert_eq!(MetaRecord::decode(&raw).unwrap(), meta);
    }

    #[test]
    fn test_decode_short_record_is_corruption() {
        let err = MetaRecord::decode(&[b'r'; 10]).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_new_list_is_empty() {
        let meta = MetaRecord::new(DataType::List);
        assert_eq!(meta.list_bounds().unwrap(), (0, -1));
    }

    #[test]
    fn test_reset_changes_identity() {
        let mut meta = MetaRecord::new(DataType::Hash);
        meta.count = 9;
        meta.expire_at = 1;
        let old = meta.id;
        meta.reset(DataType::Hash);
        assert_ne!(meta.id, old);
        assert_eq!(meta.count, 0);
        assert_eq!(meta.expire_at, 0);
    }

    #[test]
    fn test_expiry() {
        let mut meta = MetaRecord::new(DataType::String);
        assert!(!meta.is_expired_at(u64::MAX));
        meta.expire_at = 100;
        assert!(meta.is_expired_at(101));
        assert!(!meta.is_expired_at(100));
        assert!(meta.check_if_expired());
    }

    proptest! {
        #[test]
        fn prop_meta_round_trip(
            count in any::<u64>(),
            expire_at in any::<u64>(),
            head in any::<i64>(),
            tail in any::<i64>(),
        ) {
            let mut meta = MetaRecord::new(DataType::List);
            meta.count = count;
            meta.expire_at = expire_at;
            meta.set_list_bounds(head, tail);
            let decoded = MetaRecord::decode(&meta.encode()).unwrap();
            prop_assert_eq!(decoded.list_bounds().unwrap(), (head, tail));
            prop_assert_eq!(decoded, meta);
        }
    }
}
