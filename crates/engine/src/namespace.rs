//! Namespace registry
//!
//! A namespace is a logical database: a name such as `group.service` and a
//! numeric index clients select by. Every key of a namespace starts with
//! its header, `"kv" + name`.
//!
//! The registry is an explicit object owned by the [`Database`](crate::Database).
//! Its state is persisted as a single JSON map under a reserved raw key so
//! a reopened store sees the same namespaces.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tessera_concurrency::TransactionManager;
use tessera_core::clock::now_secs;
use tessera_core::{Error, Result, Storage};
use tessera_storage::UnifiedStore;
use tracing::info;

use crate::keys::header_for;

/// Built-in namespace selected by index 0
pub const DEFAULT_NAMESPACE: &str = "default.default";
/// Built-in namespace for engine bookkeeping
pub const SYSTEM_NAMESPACE: &str = "system.system";
/// Creator recorded on the built-ins
pub const SYSTEM_CREATOR: &str = "system";
/// Raw key holding the persisted registry
pub const NAMESPACE_KEY: &[u8] = b"kvsystem.systemmnamespace";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\.\w+$").expect("invalid regex"));

/// Origin of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Engine bookkeeping, never selectable
    System,
    /// The namespace sessions start in
    Default,
    /// Registered at runtime
    Custom,
}

/// Namespace descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Full name, `group.service`
    pub name: String,
    /// Part before the dot
    pub group: String,
    /// Part after the dot
    pub service: String,
    /// Who registered it
    pub creator: String,
    /// Index clients select by
    pub index: u64,
    /// Registration time, seconds since the epoch
    pub created_at: u64,
    /// Origin
    pub kind: NamespaceKind,
}

impl Namespace {
    fn new(name: &str, creator: &str, index: u64, kind: NamespaceKind) -> Self {
        let (group, service) = name.split_once('.').unwrap_or((name, ""));
        Namespace {
            name: name.to_string(),
            group: group.to_string(),
            service: service.to_string(),
            creator: creator.to_string(),
            index,
            created_at: now_secs(),
            kind,
        }
    }

    /// Key header bytes
    pub fn header(&self) -> Vec<u8> {
        header_for(&self.name)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    by_name: BTreeMap<String, Namespace>,
    by_index: BTreeMap<u64, String>,
}

impl RegistryState {
    fn insert(&mut self, namespace: Namespace) {
        if namespace.kind != NamespaceKind::System {
            self.by_index.insert(namespace.index, namespace.name.clone());
        }
        self.by_name.insert(namespace.name.clone(), namespace);
    }
}

/// Name/index lookup for every namespace in a store
pub struct NamespaceRegistry {
    store: Arc<UnifiedStore>,
    manager: Arc<TransactionManager>,
    state: RwLock<RegistryState>,
    headers: DashMap<String, Arc<[u8]>>,
}

impl NamespaceRegistry {
    /// Load the registry from `store`, creating the built-ins on first use
    pub fn load(store: Arc<UnifiedStore>, manager: Arc<TransactionManager>) -> Result<Self> {
        let registry = NamespaceRegistry {
            store,
            manager,
            state: RwLock::new(RegistryState::default()),
            headers: DashMap::new(),
        };

        match registry.store.get(NAMESPACE_KEY)? {
            Some(raw) => {
                let persisted: BTreeMap<String, Namespace> = serde_json::from_slice(&raw.value)
                    .map_err(|e| Error::corruption(format!("namespace registry: {}", e)))?;
                let mut state = registry.state.write();
                for namespace in persisted.into_values() {
                    state.insert(namespace);
                }
            }
            None => {
                let mut state = registry.state.write();
                state.insert(Namespace::new(
                    DEFAULT_NAMESPACE,
                    SYSTEM_CREATOR,
                    0,
                    NamespaceKind::Default,
                ));
                state.insert(Namespace::new(
                    SYSTEM_NAMESPACE,
                    SYSTEM_CREATOR,
                    0,
                    NamespaceKind::System,
                ));
                registry.persist(&state)?;
                info!("initialized namespace registry");
            }
        }
        Ok(registry)
    }

    /// Register a custom namespace
    ///
    /// The name must look like `group.service`, must not mention the
    /// built-ins, and neither it nor `index` may be taken. Index 0 is
    /// reserved for the default namespace.
    pub fn register(&self, name: &str, index: u64, creator: &str) -> Result<Namespace> {
        if !is_valid_name(name) || index == 0 {
            return Err(Error::invalid_input(format!(
                "invalid namespace name '{}' or index {}",
                name, index
            )));
        }

        let mut state = self.state.write();
        if state.by_name.contains_key(name) || state.by_index.contains_key(&index) {
            return Err(Error::invalid_input(format!(
                "namespace '{}' or index {} already registered",
                name, index
            )));
        }
        // Headers carry no separator before the category tag
        if let Some(existing) = state
            .by_name
            .keys()
            .find(|n| n.starts_with(name) || name.starts_with(n.as_str()))
        {
            return Err(Error::invalid_input(format!(
                "namespace '{}' overlaps the key space of '{}'",
                name, existing
            )));
        }

        let namespace = Namespace::new(name, creator, index, NamespaceKind::Custom);
        state.insert(namespace.clone());
        if let Err(e) = self.persist(&state) {
            state.by_name.remove(name);
            state.by_index.remove(&index);
            return Err(e);
        }
        info!(namespace = name, index, creator, "registered namespace");
        Ok(namespace)
    }

    /// Look a namespace up by name
    pub fn resolve(&self, name: &str) -> Result<Namespace> {
        self.state
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NamespaceNotFound(name.to_string()))
    }

    /// Look a selectable namespace up by index
    pub fn by_index(&self, index: u64) -> Result<Namespace> {
        let state = self.state.read();
        state
            .by_index
            .get(&index)
            .and_then(|name| state.by_name.get(name))
            .cloned()
            .ok_or_else(|| Error::NamespaceNotFound(format!("index {}", index)))
    }

    /// The namespace new sessions start in
    pub fn default_namespace(&self) -> Result<Namespace> {
        self.resolve(DEFAULT_NAMESPACE)
    }

    /// Every namespace, built-ins included, ordered by name
    pub fn list(&self) -> Vec<Namespace> {
        self.state.read().by_name.values().cloned().collect()
    }

    /// Namespaces that own user data (everything but the system one)
    pub fn data_namespaces(&self) -> Vec<Namespace> {
        self.list()
            .into_iter()
            .filter(|ns| ns.kind != NamespaceKind::System)
            .collect()
    }

    /// Cached key header of a namespace
    pub fn header(&self, name: &str) -> Result<Arc<[u8]>> {
        if let Some(header) = self.headers.get(name) {
            return Ok(Arc::clone(&header));
        }
        let namespace = self.resolve(name)?;
        let header: Arc<[u8]> = Arc::from(namespace.header());
        self.headers.insert(name.to_string(), Arc::clone(&header));
        Ok(header)
    }

    fn persist(&self, state: &RegistryState) -> Result<()> {
        let value = serde_json::to_vec(&state.by_name)
            .map_err(|e| Error::internal(format!("serialize namespace registry: {}", e)))?;
        let mut txn = self.manager.begin(&self.store);
        txn.put(NAMESPACE_KEY.to_vec(), value)?;
        self.manager
            .commit(&mut txn, self.store.as_ref())
            .map_err(|e| Error::from(e).with_operation("register_namespace", SYSTEM_NAMESPACE))?;
        Ok(())
    }
}

/// Whether `name` is acceptable for a custom namespace
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name) && !name.contains("default") && !name.contains("system")
}
