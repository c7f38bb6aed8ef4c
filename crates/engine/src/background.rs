//! Background sweepers
//!
//! Every data namespace gets two long-lived threads when sweepers are
//! enabled: one drains the expiration index, the other the GC queue. Each
//! owns its own [`StoreContext`] and [`Environ`], so namespaces share
//! nothing but the store.
//!
//! Threads sleep in short steps so shutdown is observed within ~100ms, and
//! never exit on a failed pass; failures are logged and the next pass
//! retries.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tessera_concurrency::TransactionManager;
use tessera_core::clock::now_millis;
use tessera_core::{Error, Result};
use tessera_storage::UnifiedStore;
use tracing::{error, info};

use crate::context::StoreContext;
use crate::database::EngineConfig;
use crate::environ::Environ;
use crate::expire::run_expire_once;
use crate::gc::run_gc_once;
use crate::namespace::Namespace;
use crate::stats::EngineStats;

/// Which queue a sweeper drains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperKind {
    /// Expiration index
    Expire,
    /// GC queue
    Gc,
}

impl SweeperKind {
    fn name(self) -> &'static str {
        match self {
            SweeperKind::Expire => "expire",
            SweeperKind::Gc => "gc",
        }
    }
}

struct SweeperHandle {
    namespace: String,
    kind: SweeperKind,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Owner of every running sweeper thread
pub struct Sweepers {
    store: Arc<UnifiedStore>,
    manager: Arc<TransactionManager>,
    stats: Arc<EngineStats>,
    config: EngineConfig,
    running: Mutex<Vec<SweeperHandle>>,
}

impl Sweepers {
    /// No sweepers running yet
    pub fn new(
        store: Arc<UnifiedStore>,
        manager: Arc<TransactionManager>,
        stats: Arc<EngineStats>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            manager,
            stats,
            config,
            running: Mutex::new(Vec::new()),
        }
    }

    /// Start the expiration sweeper for `namespace`
    pub fn start_expiration_sweep(&self, namespace: &Namespace, header: Arc<[u8]>) -> Result<()> {
        self.start(namespace, header, SweeperKind::Expire)
    }

    /// Start the GC sweeper for `namespace`
    pub fn start_gc_sweep(&self, namespace: &Namespace, header: Arc<[u8]>) -> Result<()> {
        self.start(namespace, header, SweeperKind::Gc)
    }

    /// Start both sweepers for `namespace`
    pub fn start_for(&self, namespace: &Namespace, header: Arc<[u8]>) -> Result<()> {
        self.start_expiration_sweep(namespace, Arc::clone(&header))?;
        self.start_gc_sweep(namespace, header)
    }

    /// `(namespace, kind)` of every running sweeper
    pub fn running(&self) -> Vec<(String, SweeperKind)> {
        self.running
            .lock()
            .iter()
            .map(|s| (s.namespace.clone(), s.kind))
            .collect()
    }

    fn start(&self, namespace: &Namespace, header: Arc<[u8]>, kind: SweeperKind) -> Result<()> {
        let mut running = self.running.lock();
        if running
            .iter()
            .any(|s| s.namespace == namespace.name && s.kind == kind)
        {
            return Ok(());
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let env = Environ::new(namespace.clone(), header, Arc::clone(&self.stats));
        let ctx = StoreContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.manager),
            self.config.scan_batch_size,
        );
        let job = SweepJob {
            env,
            ctx,
            kind,
            interval: Duration::from_millis(self.config.sweep_interval_ms),
            safety_delay_ms: self.config.expire_safety_delay_ms,
            shutdown: Arc::clone(&shutdown),
        };
        let handle = thread::Builder::new()
            .name(format!("tessera-{}-{}", kind.name(), namespace.name))
            .spawn(move || job.run())
            .map_err(|e| Error::internal(format!("failed to spawn sweeper thread: {}", e)))?;

        info!(namespace = %namespace.name, kind = kind.name(), "started sweeper");
        running.push(SweeperHandle {
            namespace: namespace.name.clone(),
            kind,
            shutdown,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Signal every sweeper and wait for it to exit
    pub fn shutdown(&self) {
        let mut running = self.running.lock();
        for sweeper in running.iter() {
            sweeper.shutdown.store(true, Ordering::Relaxed);
        }
        for mut sweeper in running.drain(..) {
            if let Some(handle) = sweeper.handle.take() {
                if handle.join().is_err() {
                    error!(namespace = %sweeper.namespace, kind = sweeper.kind.name(), "sweeper thread panicked");
                }
            }
        }
    }
}

impl Drop for Sweepers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SweepJob {
    env: Environ,
    ctx: StoreContext,
    kind: SweeperKind,
    interval: Duration,
    safety_delay_ms: u64,
    shutdown: Arc<AtomicBool>,
}

impl SweepJob {
    fn run(mut self) {
        let step = Duration::from_millis(100).min(self.interval);
        while !self.shutdown.load(Ordering::Relaxed) {
            let mut elapsed = Duration::ZERO;
            while elapsed < self.interval {
                if self.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(step);
                elapsed += step;
            }

            if let Err(e) = self.pass() {
                error!(
                    namespace = self.env.namespace_name(),
                    kind = self.kind.name(),
                    error = %e,
                    "sweep pass failed"
                );
            }
        }
        info!(namespace = self.env.namespace_name(), kind = self.kind.name(), "sweeper stopped");
    }

    fn pass(&mut self) -> Result<()> {
        match self.kind {
            SweeperKind::Expire => {
                let cutoff = now_millis().saturating_sub(self.safety_delay_ms);
                run_expire_once(&self.env, &mut self.ctx, cutoff, 0)?;
            }
            SweeperKind::Gc => {
                run_gc_once(&self.env, &mut self.ctx, 0)?;
                self.ctx.store().gc_versions();
            }
        }
        Ok(())
    }
}
