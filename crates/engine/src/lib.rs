//! Multi-model engine for tessera
//!
//! This crate maps five data types onto the ordered transactional store:
//! - Key layout: metadata, data, expiration index and GC queue rows
//! - Metadata records and object identity
//! - Type engines (string, hash, list, set, sorted set) plus key commands
//! - Lazy and active expiration sharing one invalidation routine
//! - Deferred reclamation of dropped objects
//! - Namespace registry, sessions and background sweepers
//!
//! The user key is only an index pointing at an object id; every data row
//! of a composite value lives under that id. Overwriting or deleting a key
//! therefore touches one metadata row, and the old rows are reclaimed later
//! by the GC sweeper in bounded transactions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod context;
pub mod database;
pub mod environ;
pub mod expire;
pub mod gc;
pub mod keys;
pub mod meta;
pub mod namespace;
pub mod object;
pub mod primitives;
pub mod session;
pub mod stats;

pub use background::SweeperKind;
pub use database::{Database, EngineConfig, CONFIG_FILE_NAME};
pub use expire::SweepReport;
pub use meta::MetaRecord;
pub use namespace::{Namespace, NamespaceKind, NamespaceRegistry, DEFAULT_NAMESPACE};
pub use primitives::{
    HashRef, KeyRef, ListRef, NamespaceInfo, ObjectInfo, ScoreBound, SetCondition, SetOptions,
    SetRef, StringRef, ZSetRef,
};
pub use session::Session;
pub use stats::{EngineStats, StatsSnapshot};
pub use tessera_core::{DataType, Error, ObjectId, Result};
