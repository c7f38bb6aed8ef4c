//! Binding a user key to its metadata record
//!
//! Every type engine works through an [`ObjectHandle`]: it loads the
//! record when the key is bound, checks lazy expiry on first contact and
//! keeps the expiration index and GC queue consistent with the record.
//!
//! Expiry is handled by one routine, [`invalidate`], shared by foreground
//! contact and the expiration sweeper.

use tessera_core::clock::now_millis;
use tessera_core::{DataType, Error, ObjectId, Result};
use tracing::debug;

use crate::context::StoreContext;
use crate::environ::Environ;
use crate::keys::{expire_key, expire_value, gc_key, meta_key};
use crate::meta::MetaRecord;

/// Remove a key's record and everything that points at it
///
/// Deletes the metadata row and the key's expiration index row, and queues
/// the object's data rows for GC when the type has any. Must run inside a
/// write transaction.
pub fn invalidate(
    env: &Environ,
    ctx: &mut StoreContext,
    key: &[u8],
    meta: &MetaRecord,
) -> Result<()> {
    ctx.delete(meta_key(env.header(), key))?;
    if meta.expire_at > 0 {
        ctx.delete(expire_key(env.header(), meta.expire_at, key))?;
    }
    if meta.data_type.is_composite() {
        enqueue_gc(env, ctx, &meta.id, meta.data_type)?;
    }
    Ok(())
}

/// Queue an object's data rows for the GC sweeper
pub fn enqueue_gc(
    env: &Environ,
    ctx: &mut StoreContext,
    id: &ObjectId,
    data_type: DataType,
) -> Result<()> {
    ctx.set(gc_key(env.header(), id), vec![data_type.tag()])?;
    env.add_gc(1);
    Ok(())
}

/// Read and decode the record stored for `key`
pub fn load_meta(env: &Environ, ctx: &mut StoreContext, key: &[u8]) -> Result<Option<MetaRecord>> {
    ctx.get(&meta_key(env.header(), key))?
        .map(|raw| MetaRecord::decode(&raw))
        .transpose()
}

/// A user key bound to its metadata record
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    key: Vec<u8>,
    meta_key: Vec<u8>,
    meta: Option<MetaRecord>,
    expected: Option<DataType>,
}

impl ObjectHandle {
    /// Load the record for `key` from the read snapshot
    ///
    /// Fails with [`Error::TypeMismatch`] when a live record of another type
    /// exists. Expiry is not acted on yet.
    pub fn bind(
        env: &Environ,
        ctx: &mut StoreContext,
        key: &[u8],
        expected: Option<DataType>,
    ) -> Result<Self> {
        let mut handle = ObjectHandle {
            key: key.to_vec(),
            meta_key: meta_key(env.header(), key),
            meta: None,
            expected,
        };
        handle.reload(env, ctx)?;
        Ok(handle)
    }

    /// Bind `key` inside a write transaction that is already open
    ///
    /// Used by commands touching several keys in one transaction. Lazy
    /// expiry is applied immediately.
    pub fn bind_in_txn(
        env: &Environ,
        ctx: &mut StoreContext,
        key: &[u8],
        expected: Option<DataType>,
    ) -> Result<Self> {
        if !ctx.in_write() {
            return Err(Error::TransactionNotActive(
                "multi-key command outside a transaction".into(),
            ));
        }
        let mut handle = ObjectHandle {
            key: key.to_vec(),
            meta_key: meta_key(env.header(), key),
            meta: None,
            expected,
        };
        handle.reload(env, ctx)?;
        handle.expire_if_due(env, ctx)?;
        Ok(handle)
    }

    fn reload(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<()> {
        self.meta = load_meta(env, ctx, &self.key)?;
        if let (Some(meta), Some(expected)) = (&self.meta, self.expected) {
            if meta.data_type != expected && !meta.check_if_expired() {
                return Err(Error::TypeMismatch {
                    expected,
                    actual: meta.data_type,
                });
            }
        }
        Ok(())
    }

    /// The user key
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Loaded record, if any
    pub fn meta(&self) -> Option<&MetaRecord> {
        self.meta.as_ref()
    }

    /// Live record for a read command
    ///
    /// An expired record is invalidated in its own transaction and the key
    /// reported as [`Error::KeyNotExist`].
    pub fn exists_for_read(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<&MetaRecord> {
        let expired = match &self.meta {
            None => return Err(Error::KeyNotExist),
            Some(meta) => meta.check_if_expired(),
        };
        if expired {
            self.begin_write(env, ctx)?;
            if self.meta.is_some() {
                ctx.rollback();
            } else {
                ctx.commit(env, "expire")?;
            }
        }
        self.meta.as_ref().ok_or(Error::KeyNotExist)
    }

    /// Open the write transaction for a command on this key
    ///
    /// The record is re-read through the transaction so the commit
    /// validates it. An expired record is invalidated inside the same
    /// transaction and the handle left empty.
    pub fn begin_write(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<()> {
        ctx.begin_write();
        let result = self
            .reload(env, ctx)
            .and_then(|_| self.expire_if_due(env, ctx));
        if result.is_err() {
            ctx.rollback();
        }
        result
    }

    fn expire_if_due(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<()> {
        if let Some(meta) = self.meta.take() {
            if meta.check_if_expired() {
                invalidate(env, ctx, &self.key, &meta)?;
                debug!(namespace = env.namespace_name(), "lazily expired key");
            } else {
                self.meta = Some(meta);
            }
        }
        Ok(())
    }

    /// Live record for a write command, created if missing
    ///
    /// Call after [`begin_write`](Self::begin_write).
    pub fn exists_for_write(&mut self) -> Result<&mut MetaRecord> {
        let data_type = self
            .expected
            .ok_or_else(|| Error::internal("untyped handle cannot create a record"))?;
        Ok(self.meta.get_or_insert_with(|| MetaRecord::new(data_type)))
    }

    /// Whether a live record is held
    pub fn is_live(&self) -> bool {
        self.meta.is_some()
    }

    /// Mutable access to a record already loaded or created
    pub fn meta_mut(&mut self) -> Result<&mut MetaRecord> {
        self.meta.as_mut().ok_or(Error::KeyNotExist)
    }

    /// Buffer the current record
    pub fn save_meta(&self, ctx: &mut StoreContext) -> Result<()> {
        match &self.meta {
            Some(meta) => ctx.set(self.meta_key.clone(), meta.encode()),
            None => Err(Error::KeyNotExist),
        }
    }

    /// Delete the record, its expiration row and queue its data for GC
    pub fn remove(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<()> {
        if let Some(meta) = self.meta.take() {
            invalidate(env, ctx, &self.key, &meta)?;
        }
        Ok(())
    }

    /// Save the record, or remove it when a composite object became empty
    pub fn save_or_remove(&mut self, env: &Environ, ctx: &mut StoreContext) -> Result<()> {
        match &self.meta {
            Some(meta) if meta.data_type.is_composite() && meta.count == 0 => {
                self.remove(env, ctx)
            }
            Some(_) => self.save_meta(ctx),
            None => Ok(()),
        }
    }

    /// Move the record's expiry to `expire_at` (0 clears it)
    ///
    /// Keeps exactly one expiration row per expiring key. The record itself
    /// is updated in memory; the caller saves it.
    pub fn set_expire_at(
        &mut self,
        env: &Environ,
        ctx: &mut StoreContext,
        expire_at: u64,
    ) -> Result<()> {
        let header = env.header().to_vec();
        let key = self.key.clone();
        let meta = self.meta_mut()?;
        if meta.expire_at == expire_at {
            return Ok(());
        }
        if meta.expire_at > 0 {
            ctx.delete(expire_key(&header, meta.expire_at, &key))?;
        }
        if expire_at > 0 {
            ctx.set(
                expire_key(&header, expire_at, &key),
                expire_value(&meta.id, meta.data_type),
            )?;
        }
        meta.expire_at = expire_at;
        Ok(())
    }

    /// Milliseconds until expiry: -2 without a live record, -1 without expiry
    pub fn ttl_millis(&self) -> i64 {
        match &self.meta {
            None => -2,
            Some(meta) if meta.expire_at == 0 => -1,
            Some(meta) => meta.expire_at.saturating_sub(now_millis()) as i64,
        }
    }
}

/// Run `body` inside one write transaction on `handle`'s key
///
/// Opens the transaction (applying lazy expiry), commits it as `operation`
/// when `body` succeeds and rolls it back when it fails.
pub fn write_command<T>(
    env: &Environ,
    ctx: &mut StoreContext,
    handle: &mut ObjectHandle,
    operation: &str,
    body: impl FnOnce(&mut ObjectHandle, &mut StoreContext) -> Result<T>,
) -> Result<T> {
    handle.begin_write(env, ctx)?;
    let result = body(handle, ctx);
    finish(env, ctx, operation, result)
}

/// Run `body` inside one write transaction not tied to a single key
pub fn transact<T>(
    env: &Environ,
    ctx: &mut StoreContext,
    operation: &str,
    body: impl FnOnce(&mut StoreContext) -> Result<T>,
) -> Result<T> {
    ctx.begin_write();
    let result = body(ctx);
    finish(env, ctx, operation, result)
}

fn finish<T>(
    env: &Environ,
    ctx: &mut StoreContext,
    operation: &str,
    result: Result<T>,
) -> Result<T> {
    match result {
        Ok(value) => {
            ctx.commit(env, operation)?;
            Ok(value)
        }
        Err(e) => {
            ctx.rollback();
            Err(e)
        }
    }
}
