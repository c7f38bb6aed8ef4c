//! Reclaiming data rows of dropped objects
//!
//! A queued object id is removed in one transaction: every row under its
//! data prefix, then the queue entry itself. A queue row that does not
//! decode is counted as failed and left in place.

use tessera_core::Result;
use tracing::{debug, warn};

use crate::context::StoreContext;
use crate::environ::Environ;
use crate::expire::SweepReport;
use crate::keys::{data_prefix, decode_gc_key, gc_prefix};
use crate::object::transact;

/// One pass over at most `limit` queued ids (0 = no cap)
pub fn run_gc_once(env: &Environ, ctx: &mut StoreContext, limit: u64) -> Result<SweepReport> {
    ctx.rollback();
    ctx.read_snapshot();
    let queued = ctx.scan(gc_prefix(env.header()), None, 0, limit).keys()?;

    let mut report = SweepReport::default();
    let mut rows = 0;
    for gc_key in queued {
        let id = match decode_gc_key(env.header(), &gc_key) {
            Ok(id) => id,
            Err(e) => {
                report.failed += 1;
                warn!(
                    namespace = env.namespace_name(),
                    error = %e,
                    "skipping undecodable gc entry"
                );
                continue;
            }
        };
        let result = transact(env, ctx, "gc_sweep", |ctx| {
            let n = ctx.delete_prefix(data_prefix(env.header(), &id))?;
            ctx.delete(gc_key)?;
            Ok(n)
        });
        match result {
            Ok(n) => {
                report.processed += 1;
                rows += n;
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    namespace = env.namespace_name(),
                    object = %id,
                    error = %e,
                    "gc entry failed, retrying next pass"
                );
            }
        }
    }
    if report.processed > 0 {
        env.exec_gc(report.processed);
        debug!(
            namespace = env.namespace_name(),
            objects = report.processed,
            rows,
            failed = report.failed,
            "gc pass"
        );
    }
    Ok(report)
}
