//! Active expiration
//!
//! The expiration index is ordered by expiry time, so one pass reads due
//! entries from the front of `header + 'e'` until it reaches one newer than
//! the cutoff. Each entry is settled in its own transaction; a failed
//! commit is logged and the entry is picked up again by the next pass.

use tessera_core::clock::now_millis;
use tessera_core::{DataType, ObjectId, Result};
use tracing::{debug, warn};

use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{decode_expire_key, decode_expire_value, expire_prefix};
use crate::object::{enqueue_gc, invalidate, load_meta, transact};

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries settled
    pub processed: u64,
    /// Entries whose transaction failed
    pub failed: u64,
}

struct DueEntry {
    raw_key: Vec<u8>,
    expire_at: u64,
    key: Vec<u8>,
    id: ObjectId,
    data_type: DataType,
}

fn due_entries(
    env: &Environ,
    ctx: &mut StoreContext,
    cutoff_ms: u64,
    limit: u64,
) -> Result<Vec<DueEntry>> {
    let mut due = Vec::new();
    let mut cursor = ctx.scan(expire_prefix(env.header()), None, 0, limit);
    for entry in cursor.by_ref() {
        let (raw_key, raw_value) = entry?;
        let (expire_at, key) = decode_expire_key(env.header(), &raw_key)?;
        if expire_at > cutoff_ms {
            break;
        }
        let key = key.to_vec();
        let (id, data_type) = decode_expire_value(&raw_value)?;
        due.push(DueEntry {
            raw_key,
            expire_at,
            key,
            id,
            data_type,
        });
    }
    cursor.close();
    Ok(due)
}

/// Settle one index entry; returns whether a key was invalidated
fn settle(env: &Environ, ctx: &mut StoreContext, entry: &DueEntry) -> Result<bool> {
    match load_meta(env, ctx, &entry.key)? {
        Some(meta) if meta.id == entry.id && meta.expire_at == entry.expire_at => {
            if meta.is_expired_at(now_millis()) {
                invalidate(env, ctx, &entry.key, &meta)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Some(meta) if meta.id == entry.id => {
            ctx.delete(entry.raw_key.clone())?;
            Ok(false)
        }
        _ => {
            // The key was recreated or removed since the entry was written
            ctx.delete(entry.raw_key.clone())?;
            if entry.data_type.is_composite() {
                enqueue_gc(env, ctx, &entry.id, entry.data_type)?;
            }
            Ok(false)
        }
    }
}

/// One pass over entries due at or before `cutoff_ms`, at most `limit`
/// of them (0 = no cap)
pub fn run_expire_once(
    env: &Environ,
    ctx: &mut StoreContext,
    cutoff_ms: u64,
    limit: u64,
) -> Result<SweepReport> {
    ctx.rollback();
    ctx.read_snapshot();
    let due = due_entries(env, ctx, cutoff_ms, limit)?;

    let mut report = SweepReport::default();
    let mut expired = 0;
    for entry in &due {
        match transact(env, ctx, "expire_sweep", |ctx| settle(env, ctx, entry)) {
            Ok(invalidated) => {
                report.processed += 1;
                expired += u64::from(invalidated);
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    namespace = env.namespace_name(),
                    error = %e,
                    "expire sweep entry failed, retrying next pass"
                );
            }
        }
    }
    if expired > 0 {
        env.exec_expire(expired);
    }
    if !due.is_empty() {
        debug!(
            namespace = env.namespace_name(),
            processed = report.processed,
            expired,
            failed = report.failed,
            "expire sweep pass"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_concurrency::TransactionManager;
    use tessera_storage::UnifiedStore;

    use super::*;
    use crate::keys::{expire_key, expire_value, meta_key};
    use crate::meta::MetaRecord;
    use crate::namespace::NamespaceRegistry;
    use crate::stats::EngineStats;

    fn context() -> (StoreContext, Environ) {
        let store = Arc::new(UnifiedStore::new());
        let manager = Arc::new(TransactionManager::new());
        let registry = NamespaceRegistry::load(Arc::clone(&store), Arc::clone(&manager)).unwrap();
        let ns = registry.default_namespace().unwrap();
        let header = registry.header(&ns.name).unwrap();
        let env = Environ::new(ns, header, Arc::new(EngineStats::new()));
        (StoreContext::new(store, manager, 4), env)
    }

    fn write_expiring(ctx: &mut StoreContext, env: &Environ, key: &[u8], meta: &MetaRecord) {
        ctx.begin_write();
        ctx.set(meta_key(env.header(), key), meta.encode()).unwrap();
        ctx.set(
            expire_key(env.header(), meta.expire_at, key),
            expire_value(&meta.id, meta.data_type),
        )
        .unwrap();
        ctx.commit(env, "test").unwrap();
    }

    fn expired(data_type: DataType, expire_at: u64) -> MetaRecord {
        let mut meta = MetaRecord::new(data_type);
        meta.expire_at = expire_at;
        meta
    }

    #[test]
    fn test_undecodable_record_fails_only_its_entry() {
        let (mut ctx, env) = context();
        let broken = expired(DataType::Hash, 1_000);
        let good = expired(DataType::String, 2_000);
        write_expiring(&mut ctx, &env, b"broken", &broken);
        write_expiring(&mut ctx, &env, b"good", &good);

        ctx.begin_write();
        ctx.set(meta_key(env.header(), b"broken"), vec![0xff]).unwrap();
        ctx.commit(&env, "test").unwrap();

        let report = run_expire_once(&env, &mut ctx, now_millis(), 0).unwrap();
        assert_eq!(report, SweepReport { processed: 1, failed: 1 });

        ctx.read_snapshot();
        assert_eq!(ctx.get(&meta_key(env.header(), b"good")).unwrap(), None);
        assert_eq!(ctx.get(&expire_key(env.header(), 2_000, b"good")).unwrap(), None);
        assert!(ctx.get(&expire_key(env.header(), 1_000, b"broken")).unwrap().is_some());
        assert_eq!(env.stats().snapshot().expire_executed, 1);

        // Restore a decodable record for the same entry
        write_expiring(&mut ctx, &env, b"broken", &broken);

        let report = run_expire_once(&env, &mut ctx, now_millis(), 0).unwrap();
        assert_eq!(report, SweepReport { processed: 1, failed: 0 });

        ctx.read_snapshot();
        assert_eq!(ctx.get(&meta_key(env.header(), b"broken")).unwrap(), None);
        assert_eq!(ctx.count_prefix(expire_prefix(env.header())).unwrap(), 0);
        assert_eq!(env.stats().snapshot().expire_executed, 2);
        assert_eq!(env.stats().snapshot().gc_enqueued, 1);
    }

    #[test]
    fn test_entries_after_cutoff_are_left() {
        let (mut ctx, env) = context();
        let later = expired(DataType::String, now_millis() + 60_000);
        write_expiring(&mut ctx, &env, b"later", &later);

        let report = run_expire_once(&env, &mut ctx, now_millis(), 0).unwrap();
        assert_eq!(report, SweepReport::default());
        ctx.read_snapshot();
        assert!(ctx.get(&meta_key(env.header(), b"later")).unwrap().is_some());
    }
}
