//! String engine
//!
//! A string lives entirely in its metadata record: the value is the
//! record's `extra` payload, so strings own no data rows and are never
//! queued for GC.

use tessera_core::clock::now_millis;
use tessera_core::codec::{format_f64, parse_f64, parse_i64};
use tessera_core::{DataType, Error, Result};

use super::{found, normalize_range};
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::meta_key;
use crate::meta::MetaRecord;
use crate::object::{invalidate, load_meta, transact, write_command, ObjectHandle};

/// Largest offset + length `set_range` accepts
pub const MAX_STRING_LEN: u64 = 512 * 1024 * 1024;

/// Precondition on an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Write unconditionally
    #[default]
    Always,
    /// Only when the key holds no live value (NX)
    IfNotExists,
    /// Only when the key holds a live value (XX)
    IfExists,
}

/// Options for [`StringRef::set`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Absolute expiry in epoch milliseconds; 0 stores without expiry
    pub expire_at: u64,
    /// Precondition on the existing value
    pub condition: SetCondition,
}

impl SetOptions {
    /// Builder: absolute expiry
    pub fn expire_at(mut self, at_ms: u64) -> Self {
        self.expire_at = at_ms;
        self
    }

    /// Builder: expiry relative to now
    pub fn ttl_millis(self, ttl_ms: u64) -> Self {
        self.expire_at(now_millis().saturating_add(ttl_ms))
    }

    /// Builder: NX
    pub fn if_not_exists(mut self) -> Self {
        self.condition = SetCondition::IfNotExists;
        self
    }

    /// Builder: XX
    pub fn if_exists(mut self) -> Self {
        self.condition = SetCondition::IfExists;
        self
    }
}

/// A key bound as a string
pub struct StringRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> StringRef<'a> {
    /// Bind `key`; fails with `TypeMismatch` if it holds another type
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, Some(DataType::String))?;
        Ok(StringRef { env, ctx, obj })
    }

    fn value(&mut self) -> Result<Option<Vec<u8>>> {
        found(
            self.obj
                .exists_for_read(self.env, self.ctx)
                .map(|meta| meta.extra.clone()),
        )
    }

    /// Current value
    pub fn get(&mut self) -> Result<Option<Vec<u8>>> {
        self.value()
    }

    /// Store `value`
    ///
    /// `IfNotExists` fails with [`Error::KeyExists`] when a live value is
    /// present; `IfExists` fails with [`Error::KeyNotExist`] when none is.
    /// The expiry is replaced by `options.expire_at`, and 0 clears it.
    pub fn set(&mut self, value: Vec<u8>, options: SetOptions) -> Result<()> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "set", |obj, ctx| {
            match options.condition {
                SetCondition::IfNotExists if obj.is_live() => return Err(Error::KeyExists),
                SetCondition::IfExists if !obj.is_live() => return Err(Error::KeyNotExist),
                _ => {}
            }
            obj.exists_for_write()?.extra = value;
            obj.set_expire_at(env, ctx, options.expire_at)?;
            obj.save_meta(ctx)
        })
    }

    /// Store `value` expiring `ttl_ms` from now
    pub fn set_with_ttl(&mut self, value: Vec<u8>, ttl_ms: u64) -> Result<()> {
        self.set(value, SetOptions::default().ttl_millis(ttl_ms))
    }

    /// Store `value` and return the previous one; the expiry is kept
    pub fn get_and_set(&mut self, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        write_command(self.env, self.ctx, &mut self.obj, "getset", |obj, ctx| {
            let previous = obj.meta().map(|meta| meta.extra.clone());
            obj.exists_for_write()?.extra = value;
            obj.save_meta(ctx)?;
            Ok(previous)
        })
    }

    /// Add `step` to the integer value, treating a missing key as 0
    pub fn increment(&mut self, step: i64) -> Result<i64> {
        write_command(self.env, self.ctx, &mut self.obj, "incr", |obj, ctx| {
            let current = match obj.meta() {
                Some(meta) => parse_i64(&meta.extra)?,
                None => 0,
            };
            let next = current.checked_add(step).ok_or_else(|| {
                Error::NumericConversion("increment or decrement would overflow".into())
            })?;
            obj.exists_for_write()?.extra = next.to_string().into_bytes();
            obj.save_meta(ctx)?;
            Ok(next)
        })
    }

    /// Add `step` to the float value, treating a missing key as 0
    pub fn increment_by_float(&mut self, step: f64) -> Result<f64> {
        write_command(self.env, self.ctx, &mut self.obj, "incrbyfloat", |obj, ctx| {
            let current = match obj.meta() {
                Some(meta) => parse_f64(&meta.extra)?,
                None => 0.0,
            };
            let next = current + step;
            if !next.is_finite() {
                return Err(Error::NumericConversion(
                    "increment would produce NaN or Infinity".into(),
                ));
            }
            obj.exists_for_write()?.extra = format_f64(next);
            obj.save_meta(ctx)?;
            Ok(next)
        })
    }

    /// Byte length of the value, 0 when missing
    pub fn length(&mut self) -> Result<u64> {
        Ok(self.value()?.map(|v| v.len() as u64).unwrap_or(0))
    }

    /// Append to the value and return the new length
    pub fn append(&mut self, suffix: &[u8]) -> Result<u64> {
        write_command(self.env, self.ctx, &mut self.obj, "append", |obj, ctx| {
            let meta = obj.exists_for_write()?;
            meta.extra.extend_from_slice(suffix);
            let len = meta.extra.len() as u64;
            obj.save_meta(ctx)?;
            Ok(len)
        })
    }

    /// Overwrite part of the value starting at `offset`, zero-padding
    /// as needed; returns the new length
    pub fn set_range(&mut self, offset: u64, value: &[u8]) -> Result<u64> {
        let end = offset.saturating_add(value.len() as u64);
        if end > MAX_STRING_LEN {
            return Err(Error::invalid_input("string exceeds maximum allowed size"));
        }
        write_command(self.env, self.ctx, &mut self.obj, "setrange", |obj, ctx| {
            if value.is_empty() {
                return Ok(obj.meta().map(|m| m.extra.len() as u64).unwrap_or(0));
            }
            let meta = obj.exists_for_write()?;
            let (offset, end) = (offset as usize, end as usize);
            if meta.extra.len() < end {
                meta.extra.resize(end, 0);
            }
            meta.extra[offset..end].copy_from_slice(value);
            let len = meta.extra.len() as u64;
            obj.save_meta(ctx)?;
            Ok(len)
        })
    }

    /// Inclusive byte range of the value; negative positions count from
    /// the end
    pub fn get_range(&mut self, start: i64, end: i64) -> Result<Vec<u8>> {
        let value = self.value()?.unwrap_or_default();
        Ok(match normalize_range(start, end, value.len() as u64) {
            Some((s, e)) => value[s as usize..=e as usize].to_vec(),
            None => Vec::new(),
        })
    }
}

/// Values of several string keys, `None` for missing, expired or
/// non-string keys
pub fn multi_get(
    env: &Environ,
    ctx: &mut StoreContext,
    keys: &[Vec<u8>],
) -> Result<Vec<Option<Vec<u8>>>> {
    let meta_keys: Vec<Vec<u8>> = keys.iter().map(|k| meta_key(env.header(), k)).collect();
    let now = now_millis();
    ctx.batch_get(&meta_keys)?
        .into_iter()
        .map(|raw| {
            let Some(raw) = raw else { return Ok(None) };
            let meta = MetaRecord::decode(&raw)?;
            if meta.data_type != DataType::String || meta.is_expired_at(now) {
                Ok(None)
            } else {
                Ok(Some(meta.extra))
            }
        })
        .collect()
}

/// Replace whatever `key` holds with a string without expiry
fn overwrite(env: &Environ, ctx: &mut StoreContext, key: &[u8], value: Vec<u8>) -> Result<()> {
    let mut meta = match load_meta(env, ctx, key)? {
        Some(mut old) => {
            invalidate(env, ctx, key, &old)?;
            old.reset(DataType::String);
            old
        }
        None => MetaRecord::new(DataType::String),
    };
    meta.extra = value;
    ctx.set(meta_key(env.header(), key), meta.encode())
}

/// Set several keys in one transaction
pub fn multi_set(env: &Environ, ctx: &mut StoreContext, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
    transact(env, ctx, "mset", |ctx| {
        for (key, value) in pairs {
            overwrite(env, ctx, key, value.clone())?;
        }
        Ok(())
    })
}

/// Set several keys only if none of them holds a live value
pub fn multi_set_if_not_exists(
    env: &Environ,
    ctx: &mut StoreContext,
    pairs: &[(Vec<u8>, Vec<u8>)],
) -> Result<bool> {
    transact(env, ctx, "msetnx", |ctx| {
        let now = now_millis();
        for (key, _) in pairs {
            if let Some(meta) = load_meta(env, ctx, key)? {
                if !meta.is_expired_at(now) {
                    return Ok(false);
                }
            }
        }
        for (key, value) in pairs {
            overwrite(env, ctx, key, value.clone())?;
        }
        Ok(true)
    })
}
