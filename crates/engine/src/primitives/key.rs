//! Type-independent key commands
//!
//! Expiry, introspection, deletion and enumeration. Enumeration walks the
//! metadata rows of the namespace: a glob pattern is narrowed to the literal
//! prefix before its first special character and the rest is matched as a
//! byte regex, so keys need not be UTF-8.

use std::fmt::Write;

use regex::bytes::Regex;
use tessera_core::clock::now_millis;
use tessera_core::{DataType, Error, ObjectId, Result};

use super::found;
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{decode_meta_key, meta_key};
use crate::meta::MetaRecord;
use crate::object::{load_meta, transact, write_command, ObjectHandle};

/// Debug view of a key's metadata record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Stored type
    pub data_type: DataType,
    /// Object id owning the data rows
    pub id: ObjectId,
    /// Element count
    pub count: u64,
    /// Creation time in seconds
    pub created_at: u64,
    /// Expiry in milliseconds, 0 for none
    pub expire_at: u64,
}

impl From<&MetaRecord> for ObjectInfo {
    fn from(meta: &MetaRecord) -> Self {
        ObjectInfo {
            data_type: meta.data_type,
            id: meta.id,
            count: meta.count,
            created_at: meta.created_at,
            expire_at: meta.expire_at,
        }
    }
}

/// A key bound without a type
pub struct KeyRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> KeyRef<'a> {
    /// Bind `key`
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, None)?;
        Ok(KeyRef { env, ctx, obj })
    }

    /// Stored type, `None` when missing
    pub fn type_of(&mut self) -> Result<Option<DataType>> {
        found(self.obj.exists_for_read(self.env, self.ctx).map(|m| m.data_type))
    }

    /// Expire at an absolute time in milliseconds; returns whether the key
    /// existed
    ///
    /// A time not in the future deletes the key immediately.
    pub fn expire_at(&mut self, at_ms: u64) -> Result<bool> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "expireat", |obj, ctx| {
            if !obj.is_live() {
                return Ok(false);
            }
            if at_ms <= now_millis() {
                obj.remove(env, ctx)?;
            } else {
                obj.set_expire_at(env, ctx, at_ms)?;
                obj.save_meta(ctx)?;
            }
            Ok(true)
        })
    }

    /// Expire `ttl_ms` from now; returns whether the key existed
    pub fn expire(&mut self, ttl_ms: i64) -> Result<bool> {
        self.expire_at(now_millis().saturating_add_signed(ttl_ms))
    }

    /// Clear the expiry; returns whether the key existed
    pub fn persist(&mut self) -> Result<bool> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "persist", |obj, ctx| {
            let Some(meta) = obj.meta() else {
                return Ok(false);
            };
            if meta.expire_at > 0 {
                obj.set_expire_at(env, ctx, 0)?;
                obj.save_meta(ctx)?;
            }
            Ok(true)
        })
    }

    /// Remaining time to live in milliseconds: -2 when missing, -1 without
    /// an expiry
    pub fn ttl(&mut self) -> Result<i64> {
        match found(self.obj.exists_for_read(self.env, self.ctx).map(|_| ()))? {
            Some(()) => Ok(self.obj.ttl_millis()),
            None => Ok(-2),
        }
    }

    /// Metadata of a live key
    pub fn object_info(&mut self) -> Result<Option<ObjectInfo>> {
        found(self.obj.exists_for_read(self.env, self.ctx).map(ObjectInfo::from))
    }
}

/// Delete keys of any type; returns how many were live
pub fn delete(env: &Environ, ctx: &mut StoreContext, keys: &[Vec<u8>]) -> Result<u64> {
    transact(env, ctx, "del", |ctx| {
        let mut removed = 0;
        for key in keys {
            let mut handle = ObjectHandle::bind_in_txn(env, ctx, key, None)?;
            if handle.is_live() {
                handle.remove(env, ctx)?;
                removed += 1;
            }
        }
        Ok(removed)
    })
}

/// How many of `keys` are live, counting repeats
pub fn exists(env: &Environ, ctx: &mut StoreContext, keys: &[Vec<u8>]) -> Result<u64> {
    let now = now_millis();
    let mut n = 0;
    for key in keys {
        if let Some(meta) = load_meta(env, ctx, key)? {
            if !meta.is_expired_at(now) {
                n += 1;
            }
        }
    }
    Ok(n)
}

/// Bytes of `pattern` before its first glob metacharacter
pub fn literal_prefix(pattern: &[u8]) -> &[u8] {
    let end = pattern
        .iter()
        .position(|b| matches!(b, b'*' | b'?' | b'[' | b'\\'))
        .unwrap_or(pattern.len());
    &pattern[..end]
}

/// Compile a key pattern; `None` means every key matches
///
/// Supports `*`, `?`, `[abc]`, `[a-z]`, `[^a]` / `[!a]` and `\` escapes.
/// Every literal byte is emitted as `\xHH`, so patterns and keys are
/// matched byte for byte. An unterminated `[` is a literal.
pub fn compile_pattern(pattern: &[u8]) -> Result<Option<Regex>> {
    if pattern.is_empty() || pattern == b"*" {
        return Ok(None);
    }
    let mut re = String::from(r"(?s-u)\A");
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'*' => re.push_str(".*"),
            b'?' => re.push('.'),
            b'\\' if i + 1 < pattern.len() => {
                i += 1;
                push_byte(&mut re, pattern[i]);
            }
            b'[' => match byte_class(&pattern[i + 1..]) {
                Some((class, used)) => {
                    re.push_str(&class);
                    i += used;
                }
                None => push_byte(&mut re, b'['),
            },
            b => push_byte(&mut re, b),
        }
        i += 1;
    }
    re.push_str(r"\z");
    Regex::new(&re)
        .map(Some)
        .map_err(|e| Error::invalid_input(format!("invalid key pattern: {}", e)))
}

fn push_byte(re: &mut String, b: u8) {
    let _ = write!(re, "\\x{:02X}", b);
}

/// Regex class for the glob class opening `rest`, and the bytes it used
/// including the closing `]`
fn byte_class(rest: &[u8]) -> Option<(String, usize)> {
    let mut out = String::from("[");
    let mut j = 0;
    if matches!(rest.first(), Some(b'^' | b'!')) {
        out.push('^');
        j = 1;
    }
    let first = j;
    while j < rest.len() {
        match rest[j] {
            b']' if j > first => {
                out.push(']');
                return Some((out, j + 1));
            }
            b'\\' if j + 1 < rest.len() => {
                j += 1;
                push_byte(&mut out, rest[j]);
            }
            b'-' if j > first && j + 1 < rest.len() && rest[j + 1] != b']' => out.push('-'),
            b => push_byte(&mut out, b),
        }
        j += 1;
    }
    None
}

fn matches(matcher: &Option<Regex>, key: &[u8]) -> bool {
    match matcher {
        Some(re) => re.is_match(key),
        None => true,
    }
}

/// User key of a raw metadata row whose record is live
fn live_key(env: &Environ, raw_key: &[u8], raw_value: &[u8], now: u64) -> Result<Option<Vec<u8>>> {
    let Some(key) = decode_meta_key(env.header(), raw_key) else {
        return Ok(None);
    };
    let meta = MetaRecord::decode(raw_value)?;
    Ok((!meta.is_expired_at(now)).then(|| key.to_vec()))
}

/// Live keys matching `pattern`
///
/// `offset` skips that many matches; at most `limit` are returned, and a
/// `limit` of 0 or above `max` is capped at `max`.
pub fn keys(
    env: &Environ,
    ctx: &mut StoreContext,
    pattern: &[u8],
    offset: u64,
    limit: u64,
    max: u64,
) -> Result<Vec<Vec<u8>>> {
    let limit = if limit == 0 || limit > max { max } else { limit };
    let matcher = compile_pattern(pattern)?;
    let prefix = meta_key(env.header(), literal_prefix(pattern));
    let now = now_millis();

    let mut skipped = 0;
    let mut out = Vec::new();
    let mut cursor = ctx.scan(prefix, None, 0, 0);
    for entry in cursor.by_ref() {
        let (raw_key, raw_value) = entry?;
        let Some(key) = live_key(env, &raw_key, &raw_value, now)? else {
            continue;
        };
        if !matches(&matcher, &key) {
            continue;
        }
        if skipped < offset {
            skipped += 1;
            continue;
        }
        out.push(key);
        if out.len() as u64 >= limit {
            break;
        }
    }
    cursor.close();
    Ok(out)
}

/// One page of an incremental key walk
///
/// `cursor` is the user key to resume from (inclusive), empty to start.
/// Looks at `count` metadata rows and returns the matching live keys
/// among them together with the next cursor, `None` when the walk is done.
pub fn scan(
    env: &Environ,
    ctx: &mut StoreContext,
    cursor: &[u8],
    pattern: &[u8],
    count: u64,
) -> Result<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
    let count = count.max(1);
    let matcher = compile_pattern(pattern)?;
    let prefix = meta_key(env.header(), literal_prefix(pattern));
    let start = meta_key(env.header(), cursor);
    let start = (start > prefix).then_some(start);
    let now = now_millis();

    let rows: Vec<(Vec<u8>, Vec<u8>)> = ctx
        .scan(prefix, start, 0, count + 1)
        .collect::<Result<_>>()?;
    let mut next = None;
    let mut out = Vec::new();
    for (i, (raw_key, raw_value)) in rows.into_iter().enumerate() {
        if i as u64 == count {
            next = decode_meta_key(env.header(), &raw_key).map(<[u8]>::to_vec);
            break;
        }
        if let Some(key) = live_key(env, &raw_key, &raw_value, now)? {
            if matches(&matcher, &key) {
                out.push(key);
            }
        }
    }
    Ok((next, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix(b"user:*"), b"user:");
        assert_eq!(literal_prefix(b"a?c"), b"a");
        assert_eq!(literal_prefix(b"plain"), b"plain");
        assert_eq!(literal_prefix(b"[ab]x"), b"");
        assert_eq!(literal_prefix(b"x\\*"), b"x");
    }

    #[test]
    fn test_compile_pattern() {
        assert!(compile_pattern(b"*").unwrap().is_none());
        let m = compile_pattern(b"user:?[0-9]").unwrap();
        assert!(matches(&m, b"user:a1"));
        assert!(!matches(&m, b"user:ab"));
        let star = compile_pattern(b"a*z").unwrap();
        assert!(matches(&star, b"a/b/z"));
        let escaped = compile_pattern(b"a\\*").unwrap();
        assert!(matches(&escaped, b"a*"));
        assert!(!matches(&escaped, b"ab"));
    }

    #[test]
    fn test_pattern_matches_binary_keys() {
        let any3 = compile_pattern(b"a??").unwrap();
        assert!(matches(&any3, b"abc"));
        assert!(matches(&any3, b"a\xff\xfe"));
        assert!(!matches(&any3, b"a\xff"));

        let literal = compile_pattern(b"\xfe*").unwrap();
        assert!(matches(&literal, b"\xfe\x00tail"));
        assert!(!matches(&literal, b"\xff"));

        let class = compile_pattern(b"k[\x00-\x10]").unwrap();
        assert!(matches(&class, b"k\x05"));
        assert!(!matches(&class, b"k\x11"));
    }

    #[test]
    fn test_pattern_classes() {
        let negated = compile_pattern(b"h[^e]llo").unwrap();
        assert!(matches(&negated, b"hallo"));
        assert!(!matches(&negated, b"hello"));
        let bang = compile_pattern(b"h[!e]llo").unwrap();
        assert!(!matches(&bang, b"hello"));
        let open = compile_pattern(b"a[b").unwrap();
        assert!(matches(&open, b"a[b"));
        assert!(compile_pattern(b"[z-a]").is_err());
    }
}
