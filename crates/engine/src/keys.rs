//! Key layout inside a namespace
//!
//! ```text
//! header = "kv" + namespace name
//!
//! header | m | user key                      -> metadata record
//! header | d | object id(16) | suffix        -> element payload
//! header | e | expire at(8, BE) | user key   -> object id(16) | type(1)
//! header | g | object id(16)                 -> type(1)
//! ```
//!
//! These layouts are persisted; changing any byte here breaks data written
//! by an earlier build.

use tessera_core::codec::{decode_u64, encode_i64, encode_score, encode_u64};
use tessera_core::{Category, DataType, Error, ObjectId, Result, OBJECT_ID_LEN, SYSTEM_PREFIX};

/// Sign byte for list orders below zero
pub const LIST_NEGATIVE: u8 = b'<';
/// Sign byte for list orders at or above zero
pub const LIST_POSITIVE: u8 = b'>';

/// Sorted-set member row marker
pub const ZSET_MEMBER_TAG: u8 = 0x00;
/// Sorted-set score row marker
pub const ZSET_SCORE_TAG: u8 = 0x01;

/// Header bytes for a namespace
pub fn header_for(namespace: &str) -> Vec<u8> {
    let mut header = Vec::with_capacity(SYSTEM_PREFIX.len() + namespace.len());
    header.extend_from_slice(SYSTEM_PREFIX);
    header.extend_from_slice(namespace.as_bytes());
    header
}

fn category_prefix(header: &[u8], category: Category, extra: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header.len() + 1 + extra);
    buf.extend_from_slice(header);
    buf.push(category.tag());
    buf
}

// ============================================================================
// Metadata
// ============================================================================

/// `header | m | key`
pub fn meta_key(header: &[u8], key: &[u8]) -> Vec<u8> {
    let mut buf = category_prefix(header, Category::Meta, key.len());
    buf.extend_from_slice(key);
    buf
}

/// `header | m`
pub fn meta_prefix(header: &[u8]) -> Vec<u8> {
    category_prefix(header, Category::Meta, 0)
}

/// User key of a metadata row, `None` if the row is not under `header`
pub fn decode_meta_key<'a>(header: &[u8], raw: &'a [u8]) -> Option<&'a [u8]> {
    raw.strip_prefix(header)?
        .strip_prefix(&[Category::Meta.tag()])
}

// ============================================================================
// Data rows
// ============================================================================

/// `header | d | id`
pub fn data_prefix(header: &[u8], id: &ObjectId) -> Vec<u8> {
    let mut buf = category_prefix(header, Category::Data, OBJECT_ID_LEN);
    buf.extend_from_slice(id.as_bytes());
    buf
}

/// `header | d | id | suffix`
pub fn data_key(header: &[u8], id: &ObjectId, suffix: &[u8]) -> Vec<u8> {
    let mut buf = data_prefix(header, id);
    buf.extend_from_slice(suffix);
    buf
}

/// List element suffix: sign byte then the order
pub fn list_order_suffix(order: i64) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[0] = if order < 0 { LIST_NEGATIVE } else { LIST_POSITIVE };
    buf[1..].copy_from_slice(&encode_i64(order));
    buf
}

/// Sorted-set member row suffix
pub fn zset_member_suffix(member: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + member.len());
    buf.push(ZSET_MEMBER_TAG);
    buf.extend_from_slice(member);
    buf
}

/// Sorted-set score row suffix, ordered by score then member
pub fn zset_score_suffix(score: f64, member: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + member.len());
    buf.push(ZSET_SCORE_TAG);
    buf.extend_from_slice(&encode_score(score));
    buf.extend_from_slice(member);
    buf
}

// ============================================================================
// Expiration index
// ============================================================================

/// `header | e | expire_at | key`
pub fn expire_key(header: &[u8], expire_at: u64, key: &[u8]) -> Vec<u8> {
    let mut buf = category_prefix(header, Category::Expire, 8 + key.len());
    buf.extend_from_slice(&encode_u64(expire_at));
    buf.extend_from_slice(key);
    buf
}

/// `header | e`
pub fn expire_prefix(header: &[u8]) -> Vec<u8> {
    category_prefix(header, Category::Expire, 0)
}

/// Split an expiration row key into `(expire_at, user key)`
pub fn decode_expire_key<'a>(header: &[u8], raw: &'a [u8]) -> Result<(u64, &'a [u8])> {
    let rest = raw
        .strip_prefix(header)
        .and_then(|r| r.strip_prefix(&[Category::Expire.tag()]))
        .filter(|r| r.len() >= 8)
        .ok_or_else(|| Error::corruption("malformed expiration index key"))?;
    Ok((decode_u64(&rest[..8])?, &rest[8..]))
}

/// Expiration row value: `id | type`
pub fn expire_value(id: &ObjectId, data_type: DataType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(OBJECT_ID_LEN + 1);
    buf.extend_from_slice(id.as_bytes());
    buf.push(data_type.tag());
    buf
}

/// Inverse of [`expire_value`]
pub fn decode_expire_value(raw: &[u8]) -> Result<(ObjectId, DataType)> {
    if raw.len() != OBJECT_ID_LEN + 1 {
        return Err(Error::corruption(format!(
            "expiration index value has {} bytes",
            raw.len()
        )));
    }
    Ok((
        ObjectId::from_slice(&raw[..OBJECT_ID_LEN])?,
        DataType::from_tag(raw[OBJECT_ID_LEN])?,
    ))
}

// ============================================================================
// GC queue
// ============================================================================

/// `header | g | id`
pub fn gc_key(header: &[u8], id: &ObjectId) -> Vec<u8> {
    let mut buf = category_prefix(header, Category::Gc, OBJECT_ID_LEN);
    buf.extend_from_slice(id.as_bytes());
    buf
}

/// `header | g`
pub fn gc_prefix(header: &[u8]) -> Vec<u8> {
    category_prefix(header, Category::Gc, 0)
}

/// Object id of a GC queue row
pub fn decode_gc_key(header: &[u8], raw: &[u8]) -> Result<ObjectId> {
    let rest = raw
        .strip_prefix(header)
        .and_then(|r| r.strip_prefix(&[Category::Gc.tag()]))
        .ok_or_else(|| Error::corruption("malformed gc queue key"))?;
    ObjectId::from_slice(rest)
}
