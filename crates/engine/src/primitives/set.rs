//! Set engine
//!
//! One data row per member, `data_key(id, member)`, holding an empty value.
//! Set algebra materializes every operand and works in memory; a missing
//! or expired operand is the empty set.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use tessera_core::clock::now_millis;
use tessera_core::{DataType, Error, ObjectId, Result};

use super::found;
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{data_key, data_prefix, meta_key};
use crate::meta::MetaRecord;
use crate::object::{load_meta, transact, write_command, ObjectHandle};

fn scan_members(env: &Environ, ctx: &mut StoreContext, id: &ObjectId) -> Result<Vec<Vec<u8>>> {
    let prefix = data_prefix(env.header(), id);
    let strip = prefix.len();
    ctx.scan(prefix, None, 0, 0)
        .map(|entry| entry.map(|(key, _)| key[strip..].to_vec()))
        .collect()
}

/// A key bound as a set
pub struct SetRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> SetRef<'a> {
    /// Bind `key`; fails with `TypeMismatch` if it holds another type
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, Some(DataType::Set))?;
        Ok(SetRef { env, ctx, obj })
    }

    fn live(&mut self) -> Result<Option<MetaRecord>> {
        found(self.obj.exists_for_read(self.env, self.ctx).cloned())
    }

    /// Add members; returns how many were new
    pub fn add(&mut self, members: &[Vec<u8>]) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "sadd", |obj, ctx| {
            let meta = obj.exists_for_write()?;
            let mut added = 0;
            for member in members {
                let row = data_key(env.header(), &meta.id, member);
                if ctx.get(&row)?.is_none() {
                    ctx.set(row, Vec::new())?;
                    added += 1;
                }
            }
            meta.count += added;
            if meta.count > 0 {
                obj.save_meta(ctx)?;
            }
            Ok(added)
        })
    }

    /// Whether `member` is present
    pub fn is_member(&mut self, member: &[u8]) -> Result<bool> {
        let Some(meta) = self.live()? else {
            return Ok(false);
        };
        Ok(self
            .ctx
            .get(&data_key(self.env.header(), &meta.id, member))?
            .is_some())
    }

    /// Every member in byte order
    pub fn members(&mut self) -> Result<Vec<Vec<u8>>> {
        match self.live()? {
            Some(meta) => scan_members(self.env, self.ctx, &meta.id),
            None => Ok(Vec::new()),
        }
    }

    /// Remove members; returns how many were present
    pub fn remove(&mut self, members: &[Vec<u8>]) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "srem", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let mut removed = 0;
            for member in members {
                let row = data_key(env.header(), &meta.id, member);
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

    /// Number of members
    pub fn cardinality(&mut self) -> Result<u64> {
        Ok(self.live()?.map(|meta| meta.count).unwrap_or(0))
    }

    /// Remove and return up to `count` random members
    pub fn pop(&mut self, count: u64) -> Result<Vec<Vec<u8>>> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "spop", |obj, ctx| {
            if !obj.is_live() || count == 0 {
                return Ok(Vec::new());
            }
            let meta = obj.meta_mut()?;
            let members = scan_members(env, ctx, &meta.id)?;
            let picked: Vec<Vec<u8>> = members
                .choose_multiple(&mut rand::thread_rng(), count as usize)
                .cloned()
                .collect();
            for member in &picked {
                ctx.delete(data_key(env.header(), &meta.id, member))?;
            }
            meta.count = meta.count.saturating_sub(picked.len() as u64);
            obj.save_or_remove(env, ctx)?;
            Ok(picked)
        })
    }

    /// Random members without removing them
    ///
    /// A positive `count` returns distinct members, at most the cardinality.
    /// A negative `count` returns exactly `|count|` members, possibly
    /// repeated.
    pub fn random_members(&mut self, count: i64) -> Result<Vec<Vec<u8>>> {
        let members = self.members()?;
        let mut rng = rand::thread_rng();
        if count >= 0 {
            return Ok(members
                .choose_multiple(&mut rng, count as usize)
                .cloned()
                .collect());
        }
        Ok((0..count.unsigned_abs())
            .filter_map(|_| members.choose(&mut rng).cloned())
            .collect())
    }
}

/// Move `member` from `src` to `dst` in one transaction
///
/// Returns false when `src` does not hold the member.
pub fn move_to(
    env: &Environ,
    ctx: &mut StoreContext,
    src: &[u8],
    dst: &[u8],
    member: &[u8],
) -> Result<bool> {
    transact(env, ctx, "smove", |ctx| {
        let mut source = ObjectHandle::bind_in_txn(env, ctx, src, Some(DataType::Set))?;
        let mut target = ObjectHandle::bind_in_txn(env, ctx, dst, Some(DataType::Set))?;
        let Some(source_meta) = source.meta() else {
            return Ok(false);
        };
        let source_row = data_key(env.header(), &source_meta.id, member);
        if ctx.get(&source_row)?.is_none() {
            return Ok(false);
        }
        if src == dst {
            return Ok(true);
        }

        ctx.delete(source_row)?;
        let meta = source.meta_mut()?;
        meta.count = meta.count.saturating_sub(1);
        source.save_or_remove(env, ctx)?;

        let meta = target.exists_for_write()?;
        let target_row = data_key(env.header(), &meta.id, member);
        if ctx.get(&target_row)?.is_none() {
            ctx.set(target_row, Vec::new())?;
            meta.count += 1;
        }
        target.save_meta(ctx)?;
        Ok(true)
    })
}

/// Members of a set key, empty when missing or expired
fn operand(env: &Environ, ctx: &mut StoreContext, key: &[u8]) -> Result<BTreeSet<Vec<u8>>> {
    let Some(meta) = load_meta(env, ctx, key)? else {
        return Ok(BTreeSet::new());
    };
    if meta.is_expired_at(now_millis()) {
        return Ok(BTreeSet::new());
    }
    if meta.data_type != DataType::Set {
        return Err(Error::TypeMismatch {
            expected: DataType::Set,
            actual: meta.data_type,
        });
    }
    Ok(scan_members(env, ctx, &meta.id)?.into_iter().collect())
}

#[derive(Clone, Copy)]
enum Algebra {
    Difference,
    Union,
    Intersection,
}

fn combine(
    env: &Environ,
    ctx: &mut StoreContext,
    keys: &[Vec<u8>],
    algebra: Algebra,
) -> Result<BTreeSet<Vec<u8>>> {
    let Some((first, rest)) = keys.split_first() else {
        return Ok(BTreeSet::new());
    };
    let mut acc = operand(env, ctx, first)?;
    for key in rest {
        let next = operand(env, ctx, key)?;
        match algebra {
            Algebra::Difference => acc.retain(|m| !next.contains(m)),
            Algebra::Union => acc.extend(next),
            Algebra::Intersection => acc.retain(|m| next.contains(m)),
        }
    }
    Ok(acc)
}

/// Members of the first set absent from every other
pub fn difference(env: &Environ, ctx: &mut StoreContext, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    Ok(combine(env, ctx, keys, Algebra::Difference)?.into_iter().collect())
}

/// Members of any of the sets
pub fn union(env: &Environ, ctx: &mut StoreContext, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    Ok(combine(env, ctx, keys, Algebra::Union)?.into_iter().collect())
}

/// Members present in every set
pub fn intersection(
    env: &Environ,
    ctx: &mut StoreContext,
    keys: &[Vec<u8>],
) -> Result<Vec<Vec<u8>>> {
    Ok(combine(env, ctx, keys, Algebra::Intersection)?.into_iter().collect())
}

fn combine_store(
    env: &Environ,
    ctx: &mut StoreContext,
    dst: &[u8],
    keys: &[Vec<u8>],
    algebra: Algebra,
    operation: &str,
) -> Result<u64> {
    transact(env, ctx, operation, |ctx| {
        let result = combine(env, ctx, keys, algebra)?;
        let mut target = ObjectHandle::bind_in_txn(env, ctx, dst, None)?;
        target.remove(env, ctx)?;
        if result.is_empty() {
            return Ok(0);
        }
        let mut meta = MetaRecord::new(DataType::Set);
        for member in &result {
            ctx.set(data_key(env.header(), &meta.id, member), Vec::new())?;
        }
        meta.count = result.len() as u64;
        ctx.set(meta_key(env.header(), dst), meta.encode())?;
        Ok(meta.count)
    })
}

/// Store the difference into `dst`, replacing whatever it held
pub fn difference_store(
    env: &Environ,
    ctx: &mut StoreContext,
    dst: &[u8],
    keys: &[Vec<u8>],
) -> Result<u64> {
    combine_store(env, ctx, dst, keys, Algebra::Difference, "sdiffstore")
}

/// Store the union into `dst`, replacing whatever it held
pub fn union_store(env: &Environ, ctx: &mut StoreContext, dst: &[u8], keys: &[Vec<u8>]) -> Result<u64> {
    combine_store(env, ctx, dst, keys, Algebra::Union, "sunionstore")
}

/// Store the intersection into `dst`, replacing whatever it held
pub fn intersection_store(
    env: &Environ,
    ctx: &mut StoreContext,
    dst: &[u8],
    keys: &[Vec<u8>],
) -> Result<u64> {
    combine_store(env, ctx, dst, keys, Algebra::Intersection, "sinterstore")
}
