//! List engine
//!
//! Elements are rows addressed by a signed order. The record's `extra`
//! holds `(head, tail)`, the orders of the leftmost and rightmost element,
//! and `count == tail - head + 1`. An empty list is `(0, -1)`, so the first
//! push in either direction lands on a consistent pair.
//!
//! Logical positions are zero-based from the left; negative positions count
//! from the right. A position outside the list reads as nothing.

use tessera_core::{DataType, Error, ObjectId, Result};

use super::{found, normalize_index, normalize_range};
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{data_key, data_prefix, list_order_suffix};
use crate::meta::MetaRecord;
use crate::object::{write_command, ObjectHandle};

fn row(header: &[u8], id: &ObjectId, order: i64) -> Vec<u8> {
    data_key(header, id, &list_order_suffix(order))
}

/// Every element of the list in order
fn load_all(env: &Environ, ctx: &mut StoreContext, meta: &MetaRecord) -> Result<Vec<Vec<u8>>> {
    ctx.scan(data_prefix(env.header(), &meta.id), None, 0, 0)
        .values()
}

/// Rewrite the list as `values`, touching rows from position `from` on
///
/// Rows before `from` are assumed unchanged; rows past the new tail are
/// deleted.
fn rewrite_from(
    env: &Environ,
    ctx: &mut StoreContext,
    meta: &mut MetaRecord,
    values: &[Vec<u8>],
    from: usize,
) -> Result<()> {
    let (head, tail) = meta.list_bounds()?;
    for (offset, value) in values.iter().enumerate().skip(from) {
        ctx.set(row(env.header(), &meta.id, head + offset as i64), value.clone())?;
    }
    let new_tail = head + values.len() as i64 - 1;
    for order in (new_tail + 1)..=tail {
        ctx.delete(row(env.header(), &meta.id, order))?;
    }
    meta.set_list_bounds(head, new_tail);
    meta.count = values.len() as u64;
    Ok(())
}

/// A key bound as a list
pub struct ListRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> ListRef<'a> {
    /// Bind `key`; fails with `TypeMismatch` if it holds another type
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, Some(DataType::List))?;
        Ok(ListRef { env, ctx, obj })
    }

    fn live(&mut self) -> Result<Option<MetaRecord>> {
        found(self.obj.exists_for_read(self.env, self.ctx).cloned())
    }

    fn push(&mut self, values: Vec<Vec<u8>>, left: bool) -> Result<u64> {
        let env = self.env;
        let operation = if left { "lpush" } else { "rpush" };
        write_command(env, self.ctx, &mut self.obj, operation, |obj, ctx| {
            if values.is_empty() {
                return Ok(obj.meta().map_or(0, |m| m.count));
            }
            let meta = obj.exists_for_write()?;
            let (mut head, mut tail) = meta.list_bounds()?;
            for value in values {
                let order = if left {
                    head -= 1;
                    head
                } else {
                    tail += 1;
                    tail
                };
                ctx.set(row(env.header(), &meta.id, order), value)?;
                meta.count += 1;
            }
            meta.set_list_bounds(head, tail);
            let len = meta.count;
            obj.save_meta(ctx)?;
            Ok(len)
        })
    }

    /// Push values onto the left end, one at a time; returns the new length
    ///
    /// The last value ends up leftmost. No values is a no-op that returns
    /// the current length. A value of exactly `[0x00]` is stored as the
    /// empty-value marker and reads back as an empty element.
    pub fn push_left(&mut self, values: Vec<Vec<u8>>) -> Result<u64> {
        self.push(values, true)
    }

    /// Push values onto the right end; returns the new length
    ///
    /// Empty input and `[0x00]` values behave as in [`ListRef::push_left`].
    pub fn push_right(&mut self, values: Vec<Vec<u8>>) -> Result<u64> {
        self.push(values, false)
    }

    fn pop(&mut self, left: bool) -> Result<Option<Vec<u8>>> {
        let env = self.env;
        let operation = if left { "lpop" } else { "rpop" };
        write_command(env, self.ctx, &mut self.obj, operation, |obj, ctx| {
            if !obj.is_live() {
                return Ok(None);
            }
            let meta = obj.meta_mut()?;
            let (head, tail) = meta.list_bounds()?;
            if meta.count == 0 {
                return Ok(None);
            }
            let order = if left { head } else { tail };
            let key = row(env.header(), &meta.id, order);
            let value = ctx
                .get(&key)?
                .ok_or_else(|| Error::corruption(format!("list element {} missing", order)))?;
            ctx.delete(key)?;
            if left {
                meta.set_list_bounds(head + 1, tail);
            } else {
                meta.set_list_bounds(head, tail - 1);
            }
            meta.count -= 1;
            obj.save_or_remove(env, ctx)?;
            Ok(Some(value))
        })
    }

    /// Remove and return the leftmost element
    pub fn pop_left(&mut self) -> Result<Option<Vec<u8>>> {
        self.pop(true)
    }

    /// Remove and return the rightmost element
    pub fn pop_right(&mut self) -> Result<Option<Vec<u8>>> {
        self.pop(false)
    }

    /// Element at a logical position
    pub fn index(&mut self, index: i64) -> Result<Option<Vec<u8>>> {
        let Some(meta) = self.live()? else {
            return Ok(None);
        };
        let Some(position) = normalize_index(index, meta.count) else {
            return Ok(None);
        };
        let (head, _) = meta.list_bounds()?;
        self.ctx
            .get(&row(self.env.header(), &meta.id, head + position as i64))
    }

    /// Up to `limit` elements starting at a logical position (0 = to the end)
    pub fn range(&mut self, start: i64, limit: u64) -> Result<Vec<Vec<u8>>> {
        let Some(meta) = self.live()? else {
            return Ok(Vec::new());
        };
        let len = meta.count as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        if start >= len {
            return Ok(Vec::new());
        }
        let remaining = (len - start) as u64;
        let limit = if limit == 0 { remaining } else { limit.min(remaining) };
        let (head, _) = meta.list_bounds()?;
        let from = row(self.env.header(), &meta.id, head + start);
        self.ctx
            .scan(data_prefix(self.env.header(), &meta.id), Some(from), 0, limit)
            .values()
    }

    /// Elements between two inclusive logical positions
    pub fn range_inclusive(&mut self, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let len = self.length()?;
        match normalize_range(start, stop, len) {
            Some((s, e)) => self.range(s as i64, e - s + 1),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the element at a logical position
    ///
    /// Fails with [`Error::KeyNotExist`] on a missing list and
    /// [`Error::OutOfBounds`] for a position outside it. `[0x00]` reads
    /// back as empty.
    pub fn set(&mut self, index: i64, value: Vec<u8>) -> Result<()> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "lset", |obj, ctx| {
            let meta = obj.meta_mut()?;
            let position = normalize_index(index, meta.count).ok_or(Error::OutOfBounds)?;
            let (head, _) = meta.list_bounds()?;
            ctx.set(row(env.header(), &meta.id, head + position as i64), value)
        })
    }

    /// Number of elements
    pub fn length(&mut self) -> Result<u64> {
        Ok(self.live()?.map(|meta| meta.count).unwrap_or(0))
    }

    /// Insert `value` next to the first element equal to `pivot`
    ///
    /// Returns the new length, -1 when the pivot is absent and 0 when the
    /// list does not exist. `[0x00]` reads back as empty.
    pub fn insert(&mut self, pivot: &[u8], before: bool, value: Vec<u8>) -> Result<i64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "linsert", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let mut values = load_all(env, ctx, meta)?;
            let Some(found_at) = values.iter().position(|v| v.as_slice() == pivot) else {
                return Ok(-1);
            };
            let at = if before { found_at } else { found_at + 1 };
            values.insert(at, value);
            rewrite_from(env, ctx, meta, &values, at)?;
            let len = meta.count as i64;
            obj.save_meta(ctx)?;
            Ok(len)
        })
    }

    /// Remove elements equal to `value`; returns how many went
    ///
    /// `count > 0` removes from the left, `count < 0` from the right and
    /// `count == 0` removes every match.
    pub fn remove(&mut self, count: i64, value: &[u8]) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "lrem", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let values = load_all(env, ctx, meta)?;
            let cap = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };

            let mut doomed = vec![false; values.len()];
            let mut removed = 0usize;
            let positions: Vec<usize> = if count < 0 {
                (0..values.len()).rev().collect()
            } else {
                (0..values.len()).collect()
            };
            for i in positions {
                if removed == cap {
                    break;
                }
                if values[i].as_slice() == value {
                    doomed[i] = true;
                    removed += 1;
                }
            }
            let Some(first) = doomed.iter().position(|d| *d) else {
                return Ok(0);
            };

            let kept: Vec<Vec<u8>> = values
                .into_iter()
                .zip(doomed)
                .filter_map(|(v, d)| (!d).then_some(v))
                .collect();
            rewrite_from(env, ctx, meta, &kept, first)?;
            obj.save_or_remove(env, ctx)?;
            Ok(removed as u64)
        })
    }

    /// Keep only the elements between two inclusive logical positions
    ///
    /// An empty selection deletes the list.
    pub fn trim(&mut self, start: i64, stop: i64) -> Result<()> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "ltrim", |obj, ctx| {
            if !obj.is_live() {
                return Ok(());
            }
            let len = obj.meta_mut()?.count;
            let Some((s, e)) = normalize_range(start, stop, len) else {
                return obj.remove(env, ctx);
            };
            let meta = obj.meta_mut()?;
            let (head, tail) = meta.list_bounds()?;
            let (new_head, new_tail) = (head + s as i64, head + e as i64);
            for order in (head..new_head).chain(new_tail + 1..=tail) {
                ctx.delete(row(env.header(), &meta.id, order))?;
            }
            meta.set_list_bounds(new_head, new_tail);
            meta.count = e - s + 1;
            obj.save_meta(ctx)
        })
    }
}
