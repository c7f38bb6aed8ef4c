//! Sorted-set engine
//!
//! Each member owns two data rows: the member row
//! `data_key(id, 0x00 + member) -> score` for point lookups and the score
//! row `data_key(id, 0x01 + encode_score(score) + member) -> score` that
//! keeps members in score order. Changing a member's score deletes its old
//! score row first, so a member is never listed twice.
//!
//! Ranks count score rows from the start of the score prefix; a reverse
//! rank is `cardinality - rank - 1`. Reverse ranges scan forward and then
//! reverse the (member, score) pairs.

use tessera_core::codec::{decode_score, format_f64, parse_f64};
use tessera_core::{DataType, Error, ObjectId, Result};

use super::{found, normalize_range};
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{data_key, zset_member_suffix, zset_score_suffix, ZSET_SCORE_TAG};
use crate::meta::MetaRecord;
use crate::object::{write_command, ObjectHandle};

/// One end of a score interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    /// Boundary score
    pub value: f64,
    /// Whether the boundary itself is excluded
    pub exclusive: bool,
}

impl ScoreBound {
    /// Bound that admits `value`
    pub fn inclusive(value: f64) -> Self {
        ScoreBound {
            value,
            exclusive: false,
        }
    }

    /// Bound that excludes `value`
    pub fn exclusive(value: f64) -> Self {
        ScoreBound {
            value,
            exclusive: true,
        }
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

fn member_row(header: &[u8], id: &ObjectId, member: &[u8]) -> Vec<u8> {
    data_key(header, id, &zset_member_suffix(member))
}

fn score_row(header: &[u8], id: &ObjectId, score: f64, member: &[u8]) -> Vec<u8> {
    data_key(header, id, &zset_score_suffix(score, member))
}

fn score_prefix(header: &[u8], id: &ObjectId) -> Vec<u8> {
    data_key(header, id, &[ZSET_SCORE_TAG])
}

fn check_score(score: f64) -> Result<f64> {
    if score.is_nan() {
        Err(Error::NumericConversion("score is not a number".into()))
    } else {
        Ok(score)
    }
}

/// Entries of the score index in order, starting at `start`
fn scan_scores(
    env: &Environ,
    ctx: &mut StoreContext,
    id: &ObjectId,
    start: Option<Vec<u8>>,
    offset: u64,
    limit: u64,
) -> Result<Vec<(f64, Vec<u8>)>> {
    let prefix = score_prefix(env.header(), id);
    let strip = prefix.len();
    ctx.scan(prefix, start, offset, limit)
        .map(|entry| {
            let (key, _) = entry?;
            let suffix = &key[strip..];
            if suffix.len() < 8 {
                return Err(Error::corruption("sorted-set score row too short"));
            }
            Ok((decode_score(&suffix[..8])?, suffix[8..].to_vec()))
        })
        .collect()
}

/// Entries whose score lies within `[min, max]`
fn scan_score_range(
    env: &Environ,
    ctx: &mut StoreContext,
    id: &ObjectId,
    min: ScoreBound,
    max: ScoreBound,
) -> Result<Vec<(f64, Vec<u8>)>> {
    if min.value > max.value {
        return Ok(Vec::new());
    }
    let start = score_row(env.header(), id, min.value, &[]);
    let mut entries = scan_scores(env, ctx, id, Some(start), 0, 0)?;
    entries.retain(|(score, _)| min.admits_from_below(*score));
    if let Some(end) = entries.iter().position(|(score, _)| !max.admits_from_above(*score)) {
        entries.truncate(end);
    }
    Ok(entries)
}

fn flatten(entries: Vec<(f64, Vec<u8>)>, with_scores: bool) -> Vec<Vec<u8>> {
    if with_scores {
        entries
            .into_iter()
            .flat_map(|(score, member)| [member, format_f64(score)])
            .collect()
    } else {
        entries.into_iter().map(|(_, member)| member).collect()
    }
}

fn delete_entries(
    env: &Environ,
    ctx: &mut StoreContext,
    meta: &mut MetaRecord,
    entries: &[(f64, Vec<u8>)],
) -> Result<u64> {
    for (score, member) in entries {
        ctx.delete(member_row(env.header(), &meta.id, member))?;
        ctx.delete(score_row(env.header(), &meta.id, *score, member))?;
    }
    let n = entries.len() as u64;
    meta.count = meta.count.saturating_sub(n);
    Ok(n)
}

/// A key bound as a sorted set
pub struct ZSetRef<'a> {
    env: &'a Environ,
    ctx: &'a mut StoreContext,
    obj: ObjectHandle,
}

impl<'a> ZSetRef<'a> {
    /// Bind `key`; fails with `TypeMismatch` if it holds another type
    pub fn bind(env: &'a Environ, ctx: &'a mut StoreContext, key: &[u8]) -> Result<Self> {
        let obj = ObjectHandle::bind(env, ctx, key, Some(DataType::ZSet))?;
        Ok(ZSetRef { env, ctx, obj })
    }

    fn live(&mut self) -> Result<Option<MetaRecord>> {
        found(self.obj.exists_for_read(self.env, self.ctx).cloned())
    }

    /// Add members or update their scores; returns how many were new
    pub fn add(&mut self, entries: &[(f64, Vec<u8>)]) -> Result<u64> {
        for (score, _) in entries {
            check_score(*score)?;
        }
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "zadd", |obj, ctx| {
            let meta = obj.exists_for_write()?;
            let mut added = 0;
            for (score, member) in entries {
                let row = member_row(env.header(), &meta.id, member);
                match ctx.get(&row)? {
                    Some(raw) => {
                        let old = parse_f64(&raw)?;
                        if old == *score {
                            continue;
                        }
                        ctx.delete(score_row(env.header(), &meta.id, old, member))?;
                    }
                    None => added += 1,
                }
                ctx.set(row, format_f64(*score))?;
                ctx.set(score_row(env.header(), &meta.id, *score, member), format_f64(*score))?;
            }
            meta.count += added;
            if meta.count > 0 {
                obj.save_meta(ctx)?;
            }
            Ok(added)
        })
    }

    /// Add `step` to `member`'s score, inserting it at `step` when absent;
    /// returns the new score
    pub fn increment_by(&mut self, member: &[u8], step: f64) -> Result<f64> {
        check_score(step)?;
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "zincrby", |obj, ctx| {
            let meta = obj.exists_for_write()?;
            let row = member_row(env.header(), &meta.id, member);
            let next = match ctx.get(&row)? {
                Some(raw) => {
                    let old = parse_f64(&raw)?;
                    ctx.delete(score_row(env.header(), &meta.id, old, member))?;
                    old + step
                }
                None => {
                    meta.count += 1;
                    step
                }
            };
            check_score(next)?;
            ctx.set(row, format_f64(next))?;
            ctx.set(score_row(env.header(), &meta.id, next, member), format_f64(next))?;
            obj.save_meta(ctx)?;
            Ok(next)
        })
    }

    /// Score of `member`
    pub fn score(&mut self, member: &[u8]) -> Result<Option<f64>> {
        let Some(meta) = self.live()? else {
            return Ok(None);
        };
        self.ctx
            .get(&member_row(self.env.header(), &meta.id, member))?
            .map(|raw| parse_f64(&raw))
            .transpose()
    }

    /// Number of members
    pub fn cardinality(&mut self) -> Result<u64> {
        Ok(self.live()?.map(|meta| meta.count).unwrap_or(0))
    }

    /// Remove members; returns how many were present
    pub fn remove(&mut self, members: &[Vec<u8>]) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "zrem", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let mut present = Vec::new();
            for member in members {
                if let Some(raw) = ctx.get(&member_row(env.header(), &meta.id, member))? {
                    if !present.iter().any(|(_, m): &(f64, Vec<u8>)| m == member) {
                        present.push((parse_f64(&raw)?, member.clone()));
                    }
                }
            }
            let removed = delete_entries(env, ctx, meta, &present)?;
            if removed > 0 {
                obj.save_or_remove(env, ctx)?;
            }
            Ok(removed)
        })
    }

    /// Members between two inclusive ranks
    ///
    /// With `reverse`, ranks count from the highest score. With
    /// `with_scores`, each member is followed by its score.
    pub fn range(
        &mut self,
        start: i64,
        stop: i64,
        with_scores: bool,
        reverse: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let Some(meta) = self.live()? else {
            return Ok(Vec::new());
        };
        let Some((s, e)) = normalize_range(start, stop, meta.count) else {
            return Ok(Vec::new());
        };
        let (s, e) = if reverse {
            (meta.count - 1 - e, meta.count - 1 - s)
        } else {
            (s, e)
        };
        let mut entries = scan_scores(self.env, self.ctx, &meta.id, None, s, e - s + 1)?;
        if reverse {
            entries.reverse();
        }
        Ok(flatten(entries, with_scores))
    }

    /// Members whose score lies between `min` and `max`
    ///
    /// `offset` and `limit` page through the matches in result order;
    /// `limit == 0` returns every match. With `reverse` the matches run
    /// from the highest score down.
    pub fn range_by_score(
        &mut self,
        min: ScoreBound,
        max: ScoreBound,
        with_scores: bool,
        offset: u64,
        limit: u64,
        reverse: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let Some(meta) = self.live()? else {
            return Ok(Vec::new());
        };
        let mut entries = scan_score_range(self.env, self.ctx, &meta.id, min, max)?;
        if reverse {
            entries.reverse();
        }
        let take = if limit == 0 { usize::MAX } else { limit as usize };
        let page = entries.into_iter().skip(offset as usize).take(take).collect();
        Ok(flatten(page, with_scores))
    }

    /// Number of members whose score lies between `min` and `max`
    pub fn count(&mut self, min: ScoreBound, max: ScoreBound) -> Result<u64> {
        let Some(meta) = self.live()? else {
            return Ok(0);
        };
        Ok(scan_score_range(self.env, self.ctx, &meta.id, min, max)?.len() as u64)
    }

    /// Remove members between two inclusive ranks; returns how many went
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "zremrangebyrank", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let Some((s, e)) = normalize_range(start, stop, meta.count) else {
                return Ok(0);
            };
            let entries = scan_scores(env, ctx, &meta.id, None, s, e - s + 1)?;
            let removed = delete_entries(env, ctx, meta, &entries)?;
            obj.save_or_remove(env, ctx)?;
            Ok(removed)
        })
    }

    /// Remove members whose score lies between `min` and `max`
    pub fn remove_range_by_score(&mut self, min: ScoreBound, max: ScoreBound) -> Result<u64> {
        let env = self.env;
        write_command(env, self.ctx, &mut self.obj, "zremrangebyscore", |obj, ctx| {
            if !obj.is_live() {
                return Ok(0);
            }
            let meta = obj.meta_mut()?;
            let entries = scan_score_range(env, ctx, &meta.id, min, max)?;
            let removed = delete_entries(env, ctx, meta, &entries)?;
            if removed > 0 {
                obj.save_or_remove(env, ctx)?;
            }
            Ok(removed)
        })
    }

    /// Zero-based rank of `member`, from the highest score with `reverse`
    pub fn rank(&mut self, member: &[u8], reverse: bool) -> Result<Option<u64>> {
        let Some(meta) = self.live()? else {
            return Ok(None);
        };
        let header = self.env.header();
        let Some(raw) = self.ctx.get(&member_row(header, &meta.id, member))? else {
            return Ok(None);
        };
        let score = parse_f64(&raw)?;
        let position = self.ctx.index(
            score_prefix(header, &meta.id),
            &score_row(header, &meta.id, score, member),
        )?;
        Ok(position.map(|rank| if reverse { meta.count - rank - 1 } else { rank }))
    }
}
