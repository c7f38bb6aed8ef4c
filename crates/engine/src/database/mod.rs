//! Database struct and open/close logic
//!
//! This module provides the main Database struct that owns:
//! - The ordered store and its transaction manager
//! - The namespace registry
//! - Engine statistics
//! - The background sweepers
//!
//! Clients talk to the database through [`Session`]s, one per connection.

pub mod config;

pub use config::{EngineConfig, CONFIG_FILE_NAME};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tessera_concurrency::TransactionManager;
use tessera_core::clock::now_millis;
use tessera_core::{Error, Result};
use tessera_storage::UnifiedStore;
use tracing::info;

use crate::background::Sweepers;
use crate::context::StoreContext;
use crate::environ::Environ;
use crate::expire::{run_expire_once, SweepReport};
use crate::gc::run_gc_once;
use crate::namespace::{Namespace, NamespaceRegistry};
use crate::session::Session;
use crate::stats::EngineStats;

/// Shared engine state
pub struct Database {
    store: Arc<UnifiedStore>,
    manager: Arc<TransactionManager>,
    registry: NamespaceRegistry,
    stats: Arc<EngineStats>,
    config: EngineConfig,
    sweepers: Sweepers,
    open: AtomicBool,
}

impl Database {
    /// Open a database with an explicit configuration
    ///
    /// Loads the namespace registry and, when `run_sweepers` is set, starts
    /// both sweepers for every data namespace.
    pub fn open(config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let store = Arc::new(UnifiedStore::new());
        let manager = Arc::new(TransactionManager::new());
        let stats = Arc::new(EngineStats::new());
        let registry = NamespaceRegistry::load(Arc::clone(&store), Arc::clone(&manager))?;
        let sweepers = Sweepers::new(
            Arc::clone(&store),
            Arc::clone(&manager),
            Arc::clone(&stats),
            config.clone(),
        );

        let db = Arc::new(Database {
            store,
            manager,
            registry,
            stats,
            config,
            sweepers,
            open: AtomicBool::new(true),
        });

        if db.config.run_sweepers {
            for namespace in db.registry.data_namespaces() {
                db.start_sweepers(&namespace)?;
            }
        }
        info!(
            run_sweepers = db.config.run_sweepers,
            namespaces = db.registry.list().len(),
            "opened database"
        );
        Ok(db)
    }

    /// Open with the settings in `dir/tessera.toml`, writing the default
    /// file first if there is none
    pub fn open_with_config_dir<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        Self::open(EngineConfig::from_file(&config_path)?)
    }

    /// Database with default settings and no sweepers
    pub fn in_memory() -> Result<Arc<Self>> {
        Self::open(EngineConfig::default())
    }

    /// New session bound to the default namespace
    pub fn session(self: &Arc<Self>) -> Result<Session> {
        if !self.is_open() {
            return Err(Error::internal("database is shut down"));
        }
        let namespace = self.registry.default_namespace()?;
        let header = self.registry.header(&namespace.name)?;
        let env = Environ::new(namespace, header, Arc::clone(&self.stats));
        Ok(Session::new(Arc::clone(self), env, self.context()))
    }

    /// Fresh store context using the configured scan batch size
    pub fn context(&self) -> StoreContext {
        StoreContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.manager),
            self.config.scan_batch_size,
        )
    }

    fn environ(&self, name: &str) -> Result<Environ> {
        let namespace = self.registry.resolve(name)?;
        let header = self.registry.header(name)?;
        Ok(Environ::new(namespace, header, Arc::clone(&self.stats)))
    }

    /// Register a namespace, starting its sweepers when enabled
    pub fn register_namespace(&self, name: &str, index: u64, creator: &str) -> Result<Namespace> {
        let namespace = self.registry.register(name, index, creator)?;
        if self.config.run_sweepers {
            self.start_sweepers(&namespace)?;
        }
        Ok(namespace)
    }

    fn start_sweepers(&self, namespace: &Namespace) -> Result<()> {
        let header = self.registry.header(&namespace.name)?;
        self.sweepers.start_for(namespace, header)
    }

    /// Start the periodic expiration sweeper for `name`
    pub fn start_expiration_sweep(&self, name: &str) -> Result<()> {
        let namespace = self.registry.resolve(name)?;
        let header = self.registry.header(name)?;
        self.sweepers.start_expiration_sweep(&namespace, header)
    }

    /// Start the periodic GC sweeper for `name`
    pub fn start_gc_sweep(&self, name: &str) -> Result<()> {
        let namespace = self.registry.resolve(name)?;
        let header = self.registry.header(name)?;
        self.sweepers.start_gc_sweep(&namespace, header)
    }

    /// Run one expiration pass over `name` right away, treating entries
    /// stamped at or before `cutoff_ms` as due
    pub fn run_expire_sweep(&self, name: &str, cutoff_ms: u64) -> Result<SweepReport> {
        let env = self.environ(name)?;
        run_expire_once(&env, &mut self.context(), cutoff_ms, 0)
    }

    /// One expiration pass over `name` with the configured safety delay
    pub fn run_due_expire_sweep(&self, name: &str) -> Result<SweepReport> {
        let cutoff = now_millis().saturating_sub(self.config.expire_safety_delay_ms);
        self.run_expire_sweep(name, cutoff)
    }

    /// One GC pass over `name`, now
    pub fn run_gc_sweep(&self, name: &str) -> Result<SweepReport> {
        let env = self.environ(name)?;
        let report = run_gc_once(&env, &mut self.context(), 0)?;
        self.store.gc_versions();
        Ok(report)
    }

    /// Namespace registry
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Engine counters
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Settings the database was opened with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<UnifiedStore> {
        &self.store
    }

    /// `(namespace, kind)` of every running sweeper
    pub fn sweepers(&self) -> Vec<(String, crate::background::SweeperKind)> {
        self.sweepers.running()
    }

    /// Whether new sessions are accepted
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop accepting sessions and join the sweeper threads
    pub fn shutdown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.sweepers.shutdown();
            info!("database shut down");
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}
