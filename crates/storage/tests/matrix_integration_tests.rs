//! Integration tests for the data matrix
//!
//! These tests verify that DataMatrix works correctly as a complete system:
//! - Reads agree with a naive reference model of the version history
//! - A failing backend never leaves a forward entry without its inverse companion
//! - Readers run concurrently with an appending writer

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tempora_core::{ConsistencyMode, Period, Result, TemporaError};
use tempora_storage::{
    CommitContents, DataMatrix, MapFactory, MemoryMapFactory, MemoryOrderedMap, OrderedMap,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn new_matrix() -> DataMatrix {
    DataMatrix::create(&MemoryMapFactory::new(), "it", "default", ConsistencyMode::Lenient)
        .unwrap()
}

fn single(key: &str, value: Option<&[u8]>) -> CommitContents {
    let mut contents = CommitContents::new();
    contents.insert(key.to_string(), value.map(|v| v.to_vec()));
    contents
}

/// Flag map whose writes can be switched to fail
struct FlakyFlagMap {
    inner: MemoryOrderedMap<bool>,
    fail_writes: AtomicBool,
}

impl fmt::Debug for FlakyFlagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakyFlagMap").finish()
    }
}

impl OrderedMap<bool> for FlakyFlagMap {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn get(&self, key: &str) -> Option<bool> {
        self.inner.get(key)
    }
    fn floor_entry(&self, key: &str) -> Option<(String, bool)> {
        self.inner.floor_entry(key)
    }
    fn lower_entry(&self, key: &str) -> Option<(String, bool)> {
        self.inner.lower_entry(key)
    }
    fn ceiling_entry(&self, key: &str) -> Option<(String, bool)> {
        self.inner.ceiling_entry(key)
    }
    fn higher_entry(&self, key: &str) -> Option<(String, bool)> {
        self.inner.higher_entry(key)
    }
    fn range(&self, lower: Bound<&str>, upper: Bound<&str>) -> Vec<(String, bool)> {
        self.inner.range(lower, upper)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
    fn insert_batch(&self, entries: Vec<(String, bool)>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TemporaError::Storage("injected write failure".to_string()));
        }
        self.inner.insert_batch(entries)
    }
    fn remove_batch(&self, keys: &[String]) -> Result<usize> {
        self.inner.remove_batch(keys)
    }
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn test_failed_inverse_write_rolls_back_forward_entries() {
    let forward = MemoryMapFactory::new().create_value_map("fwd").unwrap();
    let inverse = Arc::new(FlakyFlagMap {
        inner: MemoryOrderedMap::new("inv"),
        fail_writes: AtomicBool::new(false),
    });
    let matrix = DataMatrix::from_maps(
        "default",
        Arc::clone(&forward),
        inverse.clone(),
        ConsistencyMode::Lenient,
    );

    matrix.put(1, &single("k", Some(b"a"))).unwrap();
    inverse.fail_writes.store(true, Ordering::SeqCst);

    let result = matrix.put(2, &single("k", Some(b"b")));
    assert!(matches!(result, Err(TemporaError::Storage(_))));
    assert_eq!(forward.len(), 1);
    assert_eq!(matrix.get(5, "k").unwrap().value(), Some(&b"a".to_vec()));
    assert_eq!(matrix.history(5, "k").to_vec().unwrap(), vec![1]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_readers_observe_stable_past_while_writer_appends() {
    let matrix = new_matrix();
    matrix.put(1, &single("k", Some(b"base"))).unwrap();

    let writer = {
        let matrix = matrix.clone();
        thread::spawn(move || {
            for ts in 2..200u64 {
                let value = format!("v{}", ts);
                matrix.put(ts, &single("k", Some(value.as_bytes()))).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let matrix = matrix.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let result = matrix.get(1, "k").unwrap();
                    assert_eq!(result.value(), Some(&b"base".to_vec()));
                    assert_eq!(result.period().lower_bound(), 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(matrix.history(u64::MAX, "k").to_vec().unwrap().len(), 199);
}

// ============================================================================
// Reference model
// ============================================================================

/// One write: (timestamp step, key index, value or tombstone)
fn ops_strategy() -> impl Strategy<Value = Vec<(u64, usize, Option<u8>)>> {
    proptest::collection::vec((1u64..4, 0usize..3, proptest::option::of(1u8..5)), 1..30)
}

proptest! {
    #[test]
    fn get_matches_reference_model(ops in ops_strategy(), probe in 0u64..150) {
        let keys = ["a", "b", "c"];
        let matrix = new_matrix();
        // key -> (timestamp -> value bytes)
        let mut model: BTreeMap<&str, BTreeMap<u64, Vec<u8>>> = BTreeMap::new();
        let mut ts = 0u64;
        for (step, key_idx, value) in ops {
            ts += step;
            let key = keys[key_idx];
            let bytes = value.map(|v| vec![v]);
            matrix.put(ts, &single(key, bytes.as_deref())).unwrap();
            model.entry(key).or_default().insert(ts, bytes.unwrap_or_default());
        }

        for key in keys {
            let versions = model.get(key).cloned().unwrap_or_default();
            let floor = versions.range(..=probe).next_back();
            let ceiling = versions.range(probe + 1..).next().map(|(t, _)| *t);
            let result = matrix.get(probe, key).unwrap();

            let expected_value = floor.and_then(|(_, v)| if v.is_empty() { None } else { Some(v.clone()) });
            prop_assert_eq!(result.value().cloned(), expected_value);

            let expected_period = match (floor, ceiling) {
                (None, None) => Period::eternal(),
                (None, Some(c)) => Period::create_range(0, c).unwrap(),
                (Some((f, _)), None) => Period::create_open_ended_range(*f).unwrap(),
                (Some((f, _)), Some(c)) => Period::create_range(*f, c).unwrap(),
            };
            prop_assert_eq!(result.period(), expected_period);

            let expected_history: Vec<u64> = versions.range(..=probe).rev().map(|(t, _)| *t).collect();
            prop_assert_eq!(matrix.history(probe, key).to_vec().unwrap(), expected_history);
        }

        let modifications = matrix.key_set_modifications(probe).unwrap();
        for key in keys {
            let latest = model.get(key).and_then(|v| v.range(..=probe).next_back());
            match latest {
                None => {
                    prop_assert!(!modifications.additions().contains(key));
                    prop_assert!(!modifications.removals().contains(key));
                }
                Some((_, v)) => {
                    prop_assert_eq!(modifications.additions().contains(key), !v.is_empty());
                    prop_assert_eq!(modifications.removals().contains(key), v.is_empty());
                }
            }
        }
    }
}
