//! Facade Tests
//!
//! Tests verifying the root crate exposes a usable engine:
//! - A database opened from a config directory commits and reads
//! - Branch forks and index queries work through the re-exports

use std::sync::Arc;
use tempfile::TempDir;
use temporadb::{
    CommitBatch, IndexQuery, Period, SearchSpec, TemporalDatabase, TokenIndexer, CONFIG_FILE_NAME,
};

#[test]
fn test_open_commit_query() {
    let dir = TempDir::new().unwrap();
    let db = TemporalDatabase::open_in_dir(dir.path()).unwrap();
    assert!(dir.path().join(CONFIG_FILE_NAME).exists());

    db.create_index("words", Arc::new(TokenIndexer)).unwrap();
    db.commit_at(
        "master",
        100,
        &CommitBatch::new().put("notes", "n1", "Buy milk and bread"),
    )
    .unwrap();
    db.create_branch("draft", None).unwrap();
    db.commit_at(
        "draft",
        110,
        &CommitBatch::new().put("notes", "n1", "Buy bread"),
    )
    .unwrap();

    let milk = IndexQuery::matching(SearchSpec::equals("words", "milk"));
    assert!(db.query_index("master", 120, "notes", &milk).unwrap().contains("n1"));
    assert!(db.query_index("draft", 120, "notes", &milk).unwrap().is_empty());
    assert!(db.query_index("draft", 105, "notes", &milk).unwrap().contains("n1"));

    let note = db.get("draft", 105, "notes", "n1").unwrap();
    assert_eq!(note.period(), Period::create_range(100, 110).unwrap());
}
