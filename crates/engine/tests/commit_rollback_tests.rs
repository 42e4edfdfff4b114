//! Commit and Rollback Integration Tests
//!
//! Tests verifying the write path of the database:
//! - Commit timestamps strictly advance per branch, independently across branches
//! - Rollback removes later versions and respects forks
//! - Concurrent readers see a stable past while a writer commits
//! - Configuration is honored (strict mode, config files)

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use tempora_engine::{
    CommitBatch, ConsistencyMode, EngineConfig, Period, TemporaError, TemporalDatabase,
    CONFIG_FILE_NAME,
};

fn setup() -> TemporalDatabase {
    TemporalDatabase::open(EngineConfig::default()).unwrap()
}

fn put(db: &TemporalDatabase, branch: &str, ts: u64, key: &str, value: &str) {
    db.commit_at(branch, ts, &CommitBatch::new().put("ks", key, value))
        .unwrap();
}

// ============================================================================
// Commits
// ============================================================================

#[test]
fn test_branches_have_independent_clocks() {
    let db = setup();
    put(&db, "master", 10, "k", "m");
    db.create_branch("sub", None).unwrap();
    put(&db, "master", 11, "k", "m2");
    put(&db, "sub", 11, "k", "s");
    assert_eq!(db.now("master").unwrap(), 11);
    assert_eq!(db.now("sub").unwrap(), 11);

    assert!(matches!(
        db.commit_at("sub", 11, &CommitBatch::new()),
        Err(TemporaError::NonMonotonicCommit { .. })
    ));
}

#[test]
fn test_multi_keyspace_commit() {
    let db = setup();
    let batch = CommitBatch::new()
        .put("cars", "golf", "blue")
        .put("people", "ann", "driver")
        .delete("cars", "polo");
    assert_eq!(db.commit_at("master", 3, &batch).unwrap(), 3);

    let expected: BTreeSet<String> = ["cars", "people"].iter().map(|s| s.to_string()).collect();
    assert_eq!(db.keyspaces("master").unwrap(), expected);
    assert!(db.get("master", 3, "cars", "polo").unwrap().value().is_none());
    assert_eq!(
        db.get("master", 3, "people", "ann").unwrap().period(),
        Period::create_open_ended_range(3).unwrap()
    );
}

#[test]
fn test_wall_clock_commit_after_explicit_future_timestamp() {
    let db = setup();
    let far_future = 1u64 << 62;
    put(&db, "master", far_future, "k", "v");
    let ts = db
        .commit("master", &CommitBatch::new().put("ks", "k", "w"))
        .unwrap();
    assert_eq!(ts, far_future + 1);
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn test_rollback_removes_later_versions() {
    let db = setup();
    put(&db, "master", 1, "a", "1");
    put(&db, "master", 3, "a", "2");
    put(&db, "master", 5, "b", "3");

    assert_eq!(db.rollback("master", 2).unwrap(), 2);
    assert_eq!(db.now("master").unwrap(), 2);
    let a = db.get("master", 10, "ks", "a").unwrap();
    assert_eq!(a.value(), Some(&b"1".to_vec()));
    assert_eq!(a.period(), Period::create_open_ended_range(1).unwrap());
    assert!(db.get("master", 10, "ks", "b").unwrap().value().is_none());

    // timestamps after the rollback point can be reused
    put(&db, "master", 3, "a", "again");
    assert_eq!(db.history("master", 10, "ks", "a").unwrap().to_vec().unwrap(), vec![3, 1]);
}

#[test]
fn test_rollback_at_or_after_now_is_noop() {
    let db = setup();
    put(&db, "master", 4, "a", "1");
    assert_eq!(db.rollback("master", 4).unwrap(), 0);
    assert_eq!(db.rollback("master", 100).unwrap(), 0);
    assert_eq!(db.now("master").unwrap(), 4);
}

#[test]
fn test_rollback_respects_forks() {
    let db = setup();
    put(&db, "master", 2, "a", "1");
    db.create_branch("sub", None).unwrap();
    put(&db, "master", 4, "a", "2");
    put(&db, "sub", 5, "a", "s");

    assert!(matches!(
        db.rollback("sub", 1),
        Err(TemporaError::InvalidRollback { .. })
    ));
    assert!(matches!(
        db.rollback("master", 1),
        Err(TemporaError::InvalidRollback { .. })
    ));

    assert_eq!(db.rollback("master", 2).unwrap(), 1);
    assert_eq!(db.rollback("sub", 2).unwrap(), 1);
    assert_eq!(
        db.get("sub", 10, "ks", "a").unwrap().value(),
        Some(&b"1".to_vec())
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_readers_see_stable_past_during_commits() {
    let db = Arc::new(setup());
    put(&db, "master", 1, "k", "0");
    db.create_branch("sub", None).unwrap();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            for ts in 2..200u64 {
                let branch = if ts % 2 == 0 { "master" } else { "sub" };
                let batch = CommitBatch::new().put("ks", "k", ts.to_string());
                db.commit_at(branch, ts, &batch).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let past = db.get("sub", 1, "ks", "k").unwrap();
                    assert_eq!(past.value(), Some(&b"0".to_vec()));
                    let now = db.now("master").unwrap();
                    let current = db.get("master", now, "ks", "k").unwrap();
                    assert!(current.period().contains(now));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(db.now("master").unwrap(), 198);
    assert_eq!(db.now("sub").unwrap(), 199);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_strict_mode_reads_normally() {
    let config = EngineConfig {
        consistency: ConsistencyMode::Strict,
        ..EngineConfig::default()
    };
    let db = TemporalDatabase::open(config).unwrap();
    put(&db, "master", 1, "a", "1");
    put(&db, "master", 2, "a", "2");
    assert_eq!(
        db.get("master", 1, "ks", "a").unwrap().period(),
        Period::create_range(1, 2).unwrap()
    );
}

#[test]
fn test_open_in_dir_reads_existing_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "consistency = \"strict\"\nauto_rollover_threshold = 2\n",
    )
    .unwrap();

    let db = TemporalDatabase::open_in_dir(dir.path()).unwrap();
    assert_eq!(db.config().consistency, ConsistencyMode::Strict);
    put(&db, "master", 1, "a", "1");
    put(&db, "master", 2, "b", "1");
    assert_eq!(db.chunk_periods("master").unwrap().len(), 2);
}
