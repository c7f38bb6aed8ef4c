//! Per-connection command surface
//!
//! A session serves one client connection: commands run strictly one at a
//! time against the session's namespace. Reads use the session snapshot,
//! which every write commit replaces, so a session always sees its own
//! writes.

use std::sync::Arc;

use tessera_core::{DataType, Error, Result};

use crate::context::StoreContext;
use crate::database::Database;
use crate::environ::Environ;
use crate::namespace::{Namespace, NamespaceKind};
use crate::primitives::{
    key, server, set, string, HashRef, KeyRef, ListRef, NamespaceInfo, SetRef, StringRef, ZSetRef,
};

/// Stats tag for commands on keys of any type
const KEY_COMMAND: &str = "key";
/// Stats tag for namespace-wide commands
const SERVER_COMMAND: &str = "server";

/// One client's view of the database
pub struct Session {
    db: Arc<Database>,
    env: Environ,
    ctx: StoreContext,
}

impl Session {
    pub(crate) fn new(db: Arc<Database>, env: Environ, ctx: StoreContext) -> Self {
        Session { db, env, ctx }
    }

    /// Switch to the namespace called `name`
    pub fn select(&mut self, name: &str) -> Result<()> {
        let namespace = self.db.registry().resolve(name)?;
        self.switch(namespace)
    }

    /// Switch to the namespace registered under `index`
    pub fn select_index(&mut self, index: u64) -> Result<()> {
        let namespace = self.db.registry().by_index(index)?;
        self.switch(namespace)
    }

    fn switch(&mut self, namespace: Namespace) -> Result<()> {
        if namespace.kind == NamespaceKind::System {
            return Err(Error::invalid_input(format!(
                "namespace '{}' is reserved",
                namespace.name
            )));
        }
        let header = self.db.registry().header(&namespace.name)?;
        self.env.select(namespace, header);
        Ok(())
    }

    /// Active namespace
    pub fn namespace(&self) -> &Namespace {
        self.env.namespace()
    }

    /// Commands run through this session
    pub fn op_count(&self) -> u64 {
        self.env.op_count()
    }

    /// Take a fresh read snapshot to observe other sessions' writes
    pub fn refresh(&mut self) {
        self.ctx.rollback();
        self.ctx.read_snapshot();
    }

    /// Owning database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ========================================================================
    // Bound keys
    // ========================================================================

    /// Bind `key` as a string
    pub fn bind_string(&mut self, key: &[u8]) -> Result<StringRef<'_>> {
        self.env.begin_command(DataType::String);
        StringRef::bind(&self.env, &mut self.ctx, key)
    }

    /// Bind `key` as a hash
    pub fn bind_hash(&mut self, key: &[u8]) -> Result<HashRef<'_>> {
        self.env.begin_command(DataType::Hash);
        HashRef::bind(&self.env, &mut self.ctx, key)
    }

    /// Bind `key` as a list
    pub fn bind_list(&mut self, key: &[u8]) -> Result<ListRef<'_>> {
        self.env.begin_command(DataType::List);
        ListRef::bind(&self.env, &mut self.ctx, key)
    }

    /// Bind `key` as a set
    pub fn bind_set(&mut self, key: &[u8]) -> Result<SetRef<'_>> {
        self.env.begin_command(DataType::Set);
        SetRef::bind(&self.env, &mut self.ctx, key)
    }

    /// Bind `key` as a sorted set
    pub fn bind_sorted_set(&mut self, key: &[u8]) -> Result<ZSetRef<'_>> {
        self.env.begin_command(DataType::ZSet);
        ZSetRef::bind(&self.env, &mut self.ctx, key)
    }

    /// Bind `key` without a type
    pub fn bind_key(&mut self, key: &[u8]) -> Result<KeyRef<'_>> {
        self.env.begin_untyped_command(KEY_COMMAND);
        KeyRef::bind(&self.env, &mut self.ctx, key)
    }

    // ========================================================================
    // Multi-key strings
    // ========================================================================

    /// Values of several string keys
    pub fn multi_get(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        self.env.begin_command(DataType::String);
        string::multi_get(&self.env, &mut self.ctx, keys)
    }

    /// Set several string keys in one transaction
    pub fn multi_set(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        self.env.begin_command(DataType::String);
        string::multi_set(&self.env, &mut self.ctx, pairs)
    }

    /// Set several string keys only if none exists
    pub fn multi_set_if_not_exists(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<bool> {
        self.env.begin_command(DataType::String);
        string::multi_set_if_not_exists(&self.env, &mut self.ctx, pairs)
    }

    // ========================================================================
    // Multi-key sets
    // ========================================================================

    /// Move `member` from the set `src` to the set `dst`
    pub fn move_member(&mut self, src: &[u8], dst: &[u8], member: &[u8]) -> Result<bool> {
        self.env.begin_command(DataType::Set);
        set::move_to(&self.env, &mut self.ctx, src, dst, member)
    }

    /// Members of the first set missing from the others
    pub fn difference(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.env.begin_command(DataType::Set);
        set::difference(&self.env, &mut self.ctx, keys)
    }

    /// Members of any of the sets
    pub fn union(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.env.begin_command(DataType::Set);
        set::union(&self.env, &mut self.ctx, keys)
    }

    /// Members of all of the sets
    pub fn intersection(&mut self, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.env.begin_command(DataType::Set);
        set::intersection(&self.env, &mut self.ctx, keys)
    }

    /// Store the difference of `keys` into `dst`
    pub fn difference_store(&mut self, dst: &[u8], keys: &[Vec<u8>]) -> Result<u64> {
        self.env.begin_command(DataType::Set);
        set::difference_store(&self.env, &mut self.ctx, dst, keys)
    }

    /// Store the union of `keys` into `dst`
    pub fn union_store(&mut self, dst: &[u8], keys: &[Vec<u8>]) -> Result<u64> {
        self.env.begin_command(DataType::Set);
        set::union_store(&self.env, &mut self.ctx, dst, keys)
    }

    /// Store the intersection of `keys` into `dst`
    pub fn intersection_store(&mut self, dst: &[u8], keys: &[Vec<u8>]) -> Result<u64> {
        self.env.begin_command(DataType::Set);
        set::intersection_store(&self.env, &mut self.ctx, dst, keys)
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// Delete keys; returns how many were live
    pub fn delete(&mut self, keys: &[Vec<u8>]) -> Result<u64> {
        self.env.begin_untyped_command(KEY_COMMAND);
        key::delete(&self.env, &mut self.ctx, keys)
    }

    /// Count live keys among `keys`
    pub fn exists(&mut self, keys: &[Vec<u8>]) -> Result<u64> {
        self.env.begin_untyped_command(KEY_COMMAND);
        key::exists(&self.env, &mut self.ctx, keys)
    }

    /// Live keys matching a glob pattern, paginated
    pub fn keys(&mut self, pattern: &[u8], offset: u64, limit: u64) -> Result<Vec<Vec<u8>>> {
        self.env.begin_untyped_command(KEY_COMMAND);
        let max = self.db.config().max_keys_per_call;
        key::keys(&self.env, &mut self.ctx, pattern, offset, limit, max)
    }

    /// One page of an incremental key walk
    pub fn scan(
        &mut self,
        cursor: &[u8],
        pattern: &[u8],
        count: u64,
    ) -> Result<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        self.env.begin_untyped_command(KEY_COMMAND);
        let count = count.min(self.db.config().max_keys_per_call);
        key::scan(&self.env, &mut self.ctx, cursor, pattern, count)
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// Delete every key in the namespace
    pub fn flushdb(&mut self) -> Result<u64> {
        self.env.begin_untyped_command(SERVER_COMMAND);
        let batch = self.db.config().flush_batch_size;
        server::flushdb(&self.env, &mut self.ctx, batch)
    }

    /// Number of keys in the namespace, expired ones not yet swept included
    pub fn dbsize(&mut self) -> Result<u64> {
        self.env.begin_untyped_command(SERVER_COMMAND);
        server::dbsize(&self.env, &mut self.ctx)
    }

    /// Raw rows under a byte prefix, for debugging
    pub fn scan_prefix(
        &mut self,
        prefix: &[u8],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.env.begin_untyped_command(SERVER_COMMAND);
        let max = self.db.config().max_keys_per_call;
        server::scan_prefix(&mut self.ctx, prefix, offset, limit, max)
    }

    /// Row counts of the active namespace
    pub fn namespace_info(&mut self) -> Result<NamespaceInfo> {
        self.env.begin_untyped_command(SERVER_COMMAND);
        server::namespace_info(&self.env, &mut self.ctx)
    }

    /// User keys with a metadata row, live or expired
    pub fn raw_keys(&mut self) -> Result<Vec<Vec<u8>>> {
        self.env.begin_untyped_command(SERVER_COMMAND);
        let max = self.db.config().max_keys_per_call;
        server::raw_keys(&self.env, &mut self.ctx, max)
    }
}
