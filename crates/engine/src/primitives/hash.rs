//! Hash engine
//!
//! Each field is one data row `data_key(id, field) -> value`. A field exists
//! exactly when its row does; the record's `count` is the cardinality and
//! is adjusted once per field actually inserted or removed.

use tessera_core::codec::{format_f64, parse_f64, parse_i64};
use tessera_core::{DataType, Error, ObjectId, Result};

use super::found;
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{data_key, data_prefix};
use crate::object::{write_command, ObjectHandle};

/// A key bound as a hash
pub struct HashRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> HashRef<'a> {
    /// Bind `key`; fails with `TypeMismatch` if it holds another type
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, Some(DataType::Hash))?;
        Ok(HashRef { env, ctx, obj })
    }

    fn live_id(&mut self) -> Result<Option<ObjectId>> {
        found(self.obj.exists_for_read(self.env, self.ctx).map(|meta| meta.id))
    }

    fn rows(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let Some(id) = self.live_id()? else {
            return Ok(Vec::new());
        };
        let prefix = data_prefix(self.env.header(), &id);
        let strip = prefix.len();
        self.ctx
            .scan(prefix, None, 0, 0)
            .map(|entry| entry.map(|(key, value)| (key[strip..].to_vec(), value)))
            .collect()
    }

    /// Value of `field`
    pub fn get(&mut self, field: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(id) = self.live_id()? else {
            return Ok(None);
        };
        self.ctx.get(&data_key(self.env.header(), &id, field))
    }

    /// Values of several fields, `None` where absent
    pub fn multi_get(&mut self, fields: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        let Some(id) = self.live_id()? else {
            return Ok(vec![None; fields.len()]);
        };
        let header = self.env.header();
        let rows: Vec<Vec<u8>> = fields.iter().map(|f| data_key(header, &id, f)).collect();
        self.ctx.batch_get(&rows)
    }

    /// Set `field`; returns 1 when the field is new, 0 when overwritten
    ///
    /// A value of exactly `[0x00]` is stored as the empty-value marker and
    /// reads back as an empty value.
    pub fn set(&mut self, field: &[u8], value: Vec<u8>) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hset", |obj, ctx| {
            let added = put_field(env, ctx, obj, field, value, true)?;
            obj.save_meta(ctx)?;
            Ok(added.unwrap_or(0))
        })
    }

    /// Set `field` only when absent; returns whether it was written
    ///
    /// `[0x00]` reads back as empty, as with [`HashRef::set`].
    pub fn set_if_not_exists(&mut self, field: &[u8], value: Vec<u8>) -> Result<bool> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hsetnx", |obj, ctx| {
            let added = put_field(env, ctx, obj, field, value, false)?;
            if added == Some(1) {
                obj.save_meta(ctx)?;
            }
            Ok(added == Some(1))
        })
    }

    /// Set several fields in one transaction
    ///
    /// No pairs is a no-op, even for an absent key. `[0x00]` values read
    /// back as empty, as with [`HashRef::set`].
    pub fn multi_set(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hmset", |obj, ctx| {
            for (field, value) in pairs {
                put_field(env, ctx, obj, field, value.clone(), true)?;
            }
            obj.save_meta(ctx)
        })
    }

    /// Field names in byte order
    pub fn keys(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(self.rows()?.into_iter().map(|(field, _)| field).collect())
    }

    /// Values in field order
    pub fn values(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(self.rows()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Field and value interleaved
    pub fn all(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .rows()?
            .into_iter()
            .flat_map(|(field, value)| [field, value])
            .collect())
    }

    /// Remove fields; returns how many were present
    ///
    /// Removing the last field deletes the hash.
    pub fn remove(&mut self, fields: &[Vec<u8>]) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hdel", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let id = meta.id;
            let mut removed = 0;
            for field in fields {
                let row = data_key(env.header(), &id, field);
                if ctx.get(&row)?.is_some() {
                    ctx.delete(row)?;
                    removed += 1;
                }
            }
            if removed > 0 {
                meta.count = meta.count.saturating_sub(removed);
                obj.save_or_remove(env, ctx)?;
            }
            Ok(removed)
        })
    }

    /// Add an integer to `field`, treating a missing field as 0
    pub fn increment_by(&mut self, field: &[u8], step: i64) -> Result<i64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hincrby", |obj, ctx| {
            let current = match read_field(env, ctx, obj, field)? {
                Some(raw) => parse_i64(&raw)?,
                None => 0,
            };
            let next = current.checked_add(step).ok_or_else(|| {
                Error::NumericConversion("increment or decrement would overflow".into())
            })?;
            put_field(env, ctx, obj, field, next.to_string().into_bytes(), true)?;
            obj.save_meta(ctx)?;
            Ok(next)
        })
    }

    /// Add a float to `field`, treating a missing field as 0
    pub fn increment_by_float(&mut self, field: &[u8], step: f64) -> Result<f64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "hincrbyfloat", |obj, ctx| {
            let current = match read_field(env, ctx, obj, field)? {
                Some(raw) => parse_f64(&raw)?,
                None => 0.0,
            };
            let next = current + step;
            if !next.is_finite() {
                return Err(Error::NumericConversion(
                    "increment would produce NaN or Infinity".into(),
                ));
            }
            put_field(env, ctx, obj, field, format_f64(next), true)?;
            obj.save_meta(ctx)?;
            Ok(next)
        })
    }

    /// Whether `field` is present
    pub fn exists(&mut self, field: &[u8]) -> Result<bool> {
        Ok(self.get(field)?.is_some())
    }

    /// Byte length of `field`'s value, 0 when absent
    pub fn field_length(&mut self, field: &[u8]) -> Result<u64> {
        Ok(self.get(field)?.map(|v| v.len() as u64).unwrap_or(0))
    }

    /// Number of field rows, counted by scanning
    pub fn count(&mut self) -> Result<u64> {
        let Some(id) = self.live_id()? else {
            return Ok(0);
        };
        self.ctx.count_prefix(data_prefix(self.env.header(), &id))
    }

    /// Cardinality from the record
    pub fn length(&mut self) -> Result<u64> {
        Ok(found(self.obj.exists_for_read(self.env, self.ctx).map(|m| m.count))?.unwrap_or(0))
    }
}

fn read_field(
    env: &Environ,
    ctx: &mut StoreContext,
    obj: &ObjectHandle,
    field: &[u8],
) -> Result<Option<Vec<u8>>> {
    match obj.meta() {
        Some(meta) => ctx.get(&data_key(env.header(), &meta.id, field)),
        None => Ok(None),
    }
}

/// Write one field row, creating the hash if needed
///
/// Returns `Some(1)` for a new field, `Some(0)` for an overwrite and `None`
/// when `overwrite` is false and the field exists. The record is updated in
/// memory only.
fn put_field(
    env: &Environ,
    ctx: &mut StoreContext,
    obj: &mut ObjectHandle,
    field: &[u8],
    value: Vec<u8>,
    overwrite: bool,
) -> Result<Option<u64>> {
    let meta = obj.exists_for_write()?;
    let row = data_key(env.header(), &meta.id, field);
    let existed = ctx.get(&row)?.is_some();
    if existed && !overwrite {
        return Ok(None);
    }
    ctx.set(row, value)?;
    if existed {
        Ok(Some(0))
    } else {
        meta.count += 1;
        Ok(Some(1))
    }
}
