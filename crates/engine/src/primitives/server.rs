//! Namespace-wide commands

use serde::Serialize;
use tessera_core::Result;
use tracing::info;

use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{decode_meta_key, expire_prefix, gc_prefix, meta_prefix};
use crate::meta::MetaRecord;
use crate::namespace::Namespace;
use crate::object::{enqueue_gc, transact};

/// Row counts of one namespace
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceInfo {
    /// Descriptor
    pub namespace: Namespace,
    /// Key header, lossily decoded
    pub header: String,
    /// Metadata rows, live or awaiting expiry
    pub keys: u64,
    /// Object ids waiting for GC
    pub pending_gc: u64,
    /// Rows in the expiration index
    pub pending_expire: u64,
}

/// Delete every key of the namespace; returns how many records went
///
/// Works in transactions of at most `batch` records. Composite objects are
/// handed to GC; the expiration index is cleared afterwards.
pub fn flushdb(env: &Environ, ctx: &mut StoreContext, batch: u64) -> Result<u64> {
    let batch = batch.max(1);
    let mut total = 0;
    loop {
        let n = transact(env, ctx, "flushdb", |ctx| {
            let rows: Vec<(Vec<u8>, Vec<u8>)> = ctx
                .scan(meta_prefix(env.header()), None, 0, batch)
                .collect::<Result<_>>()?;
            for (raw_key, raw_value) in &rows {
                let meta = MetaRecord::decode(raw_value)?;
                ctx.delete(raw_key.clone())?;
                if meta.data_type.is_composite() {
                    enqueue_gc(env, ctx, &meta.id, meta.data_type)?;
                }
            }
            Ok(rows.len() as u64)
        })?;
        total += n;
        if n < batch {
            break;
        }
    }
    loop {
        let n = transact(env, ctx, "flushdb", |ctx| {
            let keys = ctx.scan(expire_prefix(env.header()), None, 0, batch).keys()?;
            let n = keys.len() as u64;
            for key in keys {
                ctx.delete(key)?;
            }
            Ok(n)
        })?;
        if n < batch {
            break;
        }
    }
    info!(namespace = env.namespace_name(), keys = total, "flushed namespace");
    Ok(total)
}

/// Number of metadata rows in the namespace
pub fn dbsize(env: &Environ, ctx: &mut StoreContext) -> Result<u64> {
    ctx.count_prefix(meta_prefix(env.header()))
}

/// Raw rows under `prefix`, for debugging
///
/// A `limit` of 0 or above `max` is capped at `max`.
pub fn scan_prefix(
    ctx: &mut StoreContext,
    prefix: &[u8],
    offset: u64,
    limit: u64,
    max: u64,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let limit = if limit == 0 || limit > max { max } else { limit };
    ctx.scan(prefix.to_vec(), None, offset, limit).collect()
}

/// Row counts of the active namespace
pub fn namespace_info(env: &Environ, ctx: &mut StoreContext) -> Result<NamespaceInfo> {
    Ok(NamespaceInfo {
        namespace: env.namespace().clone(),
        header: String::from_utf8_lossy(env.header()).into_owned(),
        keys: dbsize(env, ctx)?,
        pending_gc: ctx.count_prefix(gc_prefix(env.header()))?,
        pending_expire: ctx.count_prefix(expire_prefix(env.header()))?,
    })
}

/// User keys of the first `limit` metadata rows, live or not
pub fn raw_keys(env: &Environ, ctx: &mut StoreContext, limit: u64) -> Result<Vec<Vec<u8>>> {
    Ok(ctx
        .scan(meta_prefix(env.header()), None, 0, limit)
        .keys()?
        .iter()
        .filter_map(|raw| decode_meta_key(env.header(), raw).map(<[u8]>::to_vec))
        .collect())
}
