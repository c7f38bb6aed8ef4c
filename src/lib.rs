//! Tessera - multi-model key-value engine
//!
//! Strings, hashes, lists, sets and sorted sets stored over an ordered,
//! snapshot-isolated transactional store, with per-namespace key spaces,
//! lazy and swept expiration, and deferred reclamation of dropped values.
//!
//! # Quick Start
//!
//! ```
//! use tessera::{Database, SetOptions};
//!
//! let db = Database::in_memory()?;
//! let mut session = db.session()?;
//!
//! session.bind_string(b"greeting")?.set(b"hello".to_vec(), SetOptions::default())?;
//! assert_eq!(session.bind_string(b"greeting")?.get()?, Some(b"hello".to_vec()));
//!
//! session.bind_list(b"queue")?.push_right(vec![b"a".to_vec(), b"b".to_vec()])?;
//! assert_eq!(session.bind_list(b"queue")?.length()?, 2);
//! # Ok::<(), tessera::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `tessera-core`: error taxonomy, object ids, type tags, byte codecs
//! - `tessera-storage`: versioned ordered store, snapshots, batched cursors
//! - `tessera-concurrency`: optimistic transactions and commit validation
//! - `tessera-engine`: key layout, type engines, sweepers, sessions

pub use tessera_engine::*;
