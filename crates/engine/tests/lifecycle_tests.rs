//! Expiration, reclamation, namespaces and configuration
//!
//! These tests drive the sweepers by hand through `Database::run_*_sweep`
//! except where the background threads themselves are under test.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tessera_core::clock::now_millis;
use tessera_engine::keys::data_prefix;
use tessera_engine::{
    Database, EngineConfig, Error, Session, SetOptions, SweepReport, SweeperKind,
    CONFIG_FILE_NAME, DEFAULT_NAMESPACE,
};

fn bytes(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn data_rows(s: &mut Session, id: &tessera_engine::ObjectId) -> usize {
    let header = s.database().registry().header(DEFAULT_NAMESPACE).unwrap();
    s.scan_prefix(&data_prefix(&header, id), 0, 0).unwrap().len()
}

// ============================================================================
// Lazy expiration
// ============================================================================

/// Test: an expired string reads as missing without any sweeper
#[test]
fn test_lazy_expiry_on_read() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_string(b"k").unwrap().set_with_ttl(b"v".to_vec(), 30).unwrap();
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), Some(b"v".to_vec()));

    thread::sleep(Duration::from_millis(60));
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), None);
    assert_eq!(s.bind_key(b"k").unwrap().ttl().unwrap(), -2);
    assert_eq!(s.exists(&bytes(&["k"])).unwrap(), 0);
}

/// Test: a write to an expired key starts a fresh object
#[test]
fn test_write_after_expiry_starts_fresh_object() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_list(b"l").unwrap().push_right(bytes(&["old1", "old2"])).unwrap();
    let old_id = s.bind_key(b"l").unwrap().object_info().unwrap().unwrap().id;
    assert!(s.bind_key(b"l").unwrap().expire(30).unwrap());
    thread::sleep(Duration::from_millis(60));

    assert_eq!(s.bind_list(b"l").unwrap().push_right(bytes(&["new"])).unwrap(), 1);
    assert_eq!(s.bind_list(b"l").unwrap().range(0, 0).unwrap(), bytes(&["new"]));
    let info = s.bind_key(b"l").unwrap().object_info().unwrap().unwrap();
    assert_ne!(info.id, old_id);
    assert_eq!(info.expire_at, 0);

    let ns = s.namespace_info().unwrap();
    assert_eq!(ns.pending_gc, 1);
    assert_eq!(ns.pending_expire, 0);
}

/// Test: a key expired by time but not yet swept does not block another type
#[test]
fn test_expired_key_of_other_type_does_not_conflict() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_hash(b"k").unwrap().set(b"f", b"v".to_vec()).unwrap();
    s.bind_key(b"k").unwrap().expire(30).unwrap();
    thread::sleep(Duration::from_millis(60));

    s.bind_set(b"k").unwrap().add(&bytes(&["m"])).unwrap();
    assert_eq!(s.bind_set(b"k").unwrap().members().unwrap(), bytes(&["m"]));
}

// ============================================================================
// Active expiration and GC
// ============================================================================

/// Test: the expire sweeper invalidates, the GC sweeper reclaims data rows
#[test]
fn test_expire_then_gc_sweep() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_hash(b"h")
        .unwrap()
        .multi_set(&[(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())])
        .unwrap();
    let id = s.bind_key(b"h").unwrap().object_info().unwrap().unwrap().id;
    s.bind_key(b"h").unwrap().expire(30).unwrap();
    s.bind_string(b"s").unwrap().set_with_ttl(b"v".to_vec(), 30).unwrap();
    s.bind_string(b"keep").unwrap().set_with_ttl(b"v".to_vec(), 3_600_000).unwrap();
    assert_eq!(data_rows(&mut s, &id), 2);

    thread::sleep(Duration::from_millis(60));
    let report = db.run_expire_sweep(DEFAULT_NAMESPACE, now_millis()).unwrap();
    assert_eq!(report, SweepReport { processed: 2, failed: 0 });

    s.refresh();
    assert_eq!(s.raw_keys().unwrap(), bytes(&["keep"]));
    let info = s.namespace_info().unwrap();
    assert_eq!(info.pending_expire, 1);
    assert_eq!(info.pending_gc, 1);
    assert_eq!(data_rows(&mut s, &id), 2);

    let report = db.run_gc_sweep(DEFAULT_NAMESPACE).unwrap();
    assert_eq!(report.processed, 1);
    s.refresh();
    assert_eq!(data_rows(&mut s, &id), 0);
    assert_eq!(s.namespace_info().unwrap().pending_gc, 0);

    let stats = db.stats().snapshot();
    assert_eq!(stats.expire_executed, 2);
    assert_eq!(stats.gc_executed, 1);
}

/// Test: the safety delay keeps freshly expired entries for the next pass
#[test]
fn test_due_sweep_respects_safety_delay() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_string(b"k").unwrap().set_with_ttl(b"v".to_vec(), 10).unwrap();
    thread::sleep(Duration::from_millis(30));

    let report = db.run_due_expire_sweep(DEFAULT_NAMESPACE).unwrap();
    assert_eq!(report.processed, 0);
    s.refresh();
    assert_eq!(s.namespace_info().unwrap().pending_expire, 1);
}

/// Test: a stale index entry left by a re-keyed object is dropped
#[test]
fn test_expire_sweep_drops_stale_entries() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_set(b"k").unwrap().add(&bytes(&["a"])).unwrap();
    s.bind_key(b"k").unwrap().expire(3_600_000).unwrap();
    assert_eq!(s.delete(&bytes(&["k"])).unwrap(), 1);
    s.bind_string(b"k").unwrap().set(b"fresh".to_vec(), SetOptions::default()).unwrap();

    let far_future = now_millis() + 7_200_000;
    db.run_expire_sweep(DEFAULT_NAMESPACE, far_future).unwrap();
    s.refresh();
    assert_eq!(s.namespace_info().unwrap().pending_expire, 0);
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), Some(b"fresh".to_vec()));
}

/// Test: flushdb hands composite values to GC, which then reclaims them
#[test]
fn test_flushdb_then_gc() {
    let db = Database::in_memory().unwrap();
    let mut s = db.session().unwrap();

    s.bind_sorted_set(b"z")
        .unwrap()
        .add(&[(1.0, b"a".to_vec()), (2.0, b"b".to_vec())])
        .unwrap();
    let id = s.bind_key(b"z").unwrap().object_info().unwrap().unwrap().id;
    assert_eq!(data_rows(&mut s, &id), 4);

    assert_eq!(s.flushdb().unwrap(), 1);
    db.run_gc_sweep(DEFAULT_NAMESPACE).unwrap();
    s.refresh();
    assert_eq!(data_rows(&mut s, &id), 0);
    assert_eq!(s.namespace_info().unwrap().pending_gc, 0);
}

// ============================================================================
// Background sweepers
// ============================================================================

fn sweeping_config() -> EngineConfig {
    EngineConfig {
        run_sweepers: true,
        sweep_interval_ms: 20,
        expire_safety_delay_ms: 0,
        ..EngineConfig::default()
    }
}

/// Test: running sweepers clear expired keys and their rows on their own
#[test]
fn test_background_sweepers_reclaim() {
    let db = Database::open(sweeping_config()).unwrap();
    let mut running = db.sweepers();
    running.sort_by_key(|(_, kind)| *kind == SweeperKind::Gc);
    assert_eq!(
        running,
        vec![
            (DEFAULT_NAMESPACE.to_string(), SweeperKind::Expire),
            (DEFAULT_NAMESPACE.to_string(), SweeperKind::Gc),
        ]
    );

    let mut s = db.session().unwrap();
    s.bind_list(b"l").unwrap().push_right(bytes(&["a", "b", "c"])).unwrap();
    let id = s.bind_key(b"l").unwrap().object_info().unwrap().unwrap().id;
    s.bind_key(b"l").unwrap().expire(20).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        s.refresh();
        let info = s.namespace_info().unwrap();
        if info.keys == 0 && info.pending_gc == 0 && data_rows(&mut s, &id) == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "sweepers did not reclaim the list");
        thread::sleep(Duration::from_millis(20));
    }

    db.shutdown();
    assert!(db.sweepers().is_empty());
    assert!(!db.is_open());
    assert!(db.session().is_err());
}

/// Test: starting a sweeper twice keeps one thread
#[test]
fn test_sweeper_start_is_idempotent() {
    let db = Database::in_memory().unwrap();
    assert!(db.sweepers().is_empty());

    db.start_gc_sweep(DEFAULT_NAMESPACE).unwrap();
    db.start_gc_sweep(DEFAULT_NAMESPACE).unwrap();
    db.start_expiration_sweep(DEFAULT_NAMESPACE).unwrap();
    assert_eq!(db.sweepers().len(), 2);
    assert!(matches!(
        db.start_gc_sweep("no.such"),
        Err(Error::NamespaceNotFound(_))
    ));
    db.shutdown();
}

/// Test: registering a namespace on a sweeping database starts its sweepers
#[test]
fn test_registered_namespace_gets_sweepers() {
    let db = Database::open(sweeping_config()).unwrap();
    db.register_namespace("app.cache", 1, "tests").unwrap();

    let names: Vec<String> = db.sweepers().into_iter().map(|(ns, _)| ns).collect();
    assert_eq!(names.iter().filter(|n| n.as_str() == "app.cache").count(), 2);
    db.shutdown();
}

// ============================================================================
// Namespaces
// ============================================================================

/// Test: keys in one namespace are invisible from another
#[test]
fn test_namespace_isolation() {
    let db = Database::in_memory().unwrap();
    db.register_namespace("app.cache", 1, "tests").unwrap();
    let mut s = db.session().unwrap();
    assert_eq!(s.namespace().name, DEFAULT_NAMESPACE);

    s.bind_string(b"k").unwrap().set(b"default".to_vec(), SetOptions::default()).unwrap();
    s.select("app.cache").unwrap();
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), None);
    s.bind_string(b"k").unwrap().set(b"cache".to_vec(), SetOptions::default()).unwrap();
    assert_eq!(s.dbsize().unwrap(), 1);

    s.select_index(0).unwrap();
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), Some(b"default".to_vec()));
    assert_eq!(s.flushdb().unwrap(), 1);

    s.select_index(1).unwrap();
    assert_eq!(s.bind_string(b"k").unwrap().get().unwrap(), Some(b"cache".to_vec()));
}

/// Test: bad names, taken indexes and overlapping headers are refused
#[test]
fn test_namespace_registration_rules() {
    let db = Database::in_memory().unwrap();
    db.register_namespace("app.cache", 1, "tests").unwrap();

    assert!(db.register_namespace("nodot", 2, "tests").is_err());
    assert!(db.register_namespace("my.default", 2, "tests").is_err());
    assert!(db.register_namespace("other.cache", 0, "tests").is_err());
    assert!(db.register_namespace("other.cache", 1, "tests").is_err());
    assert!(db.register_namespace("app.cache", 2, "tests").is_err());
    assert!(db.register_namespace("app.cache2", 2, "tests").is_err());
    assert!(db.register_namespace("other.cache", 2, "tests").is_ok());

    let mut s = db.session().unwrap();
    assert!(matches!(s.select("missing.ns"), Err(Error::NamespaceNotFound(_))));
    assert!(matches!(s.select_index(42), Err(Error::NamespaceNotFound(_))));
    assert!(s.select("system.system").is_err());
    assert_eq!(s.namespace().name, DEFAULT_NAMESPACE);
}

/// Test: another session's commit becomes visible after a refresh
#[test]
fn test_sessions_see_commits_after_refresh() {
    let db = Database::in_memory().unwrap();
    let mut writer = db.session().unwrap();
    let mut reader = db.session().unwrap();

    writer.bind_string(b"k").unwrap().set(b"v".to_vec(), SetOptions::default()).unwrap();
    assert_eq!(reader.bind_string(b"k").unwrap().get().unwrap(), None);
    reader.refresh();
    assert_eq!(reader.bind_string(b"k").unwrap().get().unwrap(), Some(b"v".to_vec()));
}

// ============================================================================
// Configuration
// ============================================================================

/// Test: opening from a directory writes the default file once and reads it
#[test]
fn test_open_with_config_dir() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join(CONFIG_FILE_NAME);

    let db = Database::open_with_config_dir(dir.path()).unwrap();
    assert!(config_path.exists());
    assert_eq!(db.config(), &EngineConfig::default());
    drop(db);

    std::fs::write(&config_path, "flush_batch_size = 7\nmax_keys_per_call = 3\n").unwrap();
    let db = Database::open_with_config_dir(dir.path()).unwrap();
    assert_eq!(db.config().flush_batch_size, 7);
    assert_eq!(db.config().sweep_interval_ms, 5000);

    let mut s = db.session().unwrap();
    for key in ["a", "b", "c", "d"] {
        s.bind_string(key.as_bytes()).unwrap().set(b"v".to_vec(), SetOptions::default()).unwrap();
    }
    assert_eq!(s.keys(b"*", 0, 0).unwrap().len(), 3);
}

/// Test: an invalid configuration is refused at open
#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        sweep_interval_ms: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(Database::open(config), Err(Error::InvalidInput(_))));

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "sweep_interval_ms = \"soon\"").unwrap();
    assert!(Database::open_with_config_dir(dir.path()).is_err());
}

/// Test: database handles can be shared across threads
#[test]
fn test_database_is_shareable() {
    let db = Database::in_memory().unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut s = db.session().unwrap();
                let key = format!("t{}", i);
                s.bind_string(key.as_bytes())
                    .unwrap()
                    .set(b"v".to_vec(), SetOptions::default())
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let mut s = db.session().unwrap();
    assert_eq!(s.dbsize().unwrap(), 4);
}
