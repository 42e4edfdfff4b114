//! DataMatrix: the per-keyspace temporal store
//!
//! A data matrix stores every version of every key of one keyspace:
//!
//! - **forward map**: `TemporalKey(key, ts)` → value bytes. A zero-length value
//!   is a tombstone; the key's history survives its deletion.
//! - **inverse map**: `InverseTemporalKey(ts, key)` → has-value flag. Lets
//!   time-range scans run without touching the forward map.
//!
//! # Point-in-time reads
//!
//! `get(ts, key)` looks up the floor entry (latest version at or before `ts`)
//! and the ceiling (first version after `ts`) of the same key:
//!
//! | floor | ceiling | value           | period            |
//! |-------|---------|-----------------|-------------------|
//! | no    | no      | none            | eternal           |
//! | no    | c       | none            | `[0, c)`          |
//! | f     | no      | floor's value   | `[f, MAX)`        |
//! | f     | c       | floor's value   | `[f, c)`          |
//!
//! A floor at or after the ceiling means the map is corrupted; see
//! [`ConsistencyMode`].
//!
//! # Mutation
//!
//! Writes only ever add entries at new timestamps. `rollback` is the single
//! destructive operation and is reserved for recovery.

use crate::ordered_map::{MapFactory, OrderedMap};
use crate::scan::{History, ModificationScan};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tempora_core::{
    ConsistencyMode, GetResult, InverseTemporalKey, KeySetModifications, Period, QualifiedKey,
    Result, TemporaError, TemporalKey,
};
use tracing::{debug, error};

/// Contents of one commit for one keyspace: key → value, `None` deletes
pub type CommitContents = BTreeMap<String, Option<Vec<u8>>>;

/// The latest version of a key at or before some timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorEntry {
    /// Commit timestamp of the version
    pub timestamp: u64,
    /// Stored bytes; empty for a tombstone
    pub value: Vec<u8>,
}

impl FloorEntry {
    /// Whether this version deleted the key
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }
}

/// Build a [`GetResult`] from the floor and ceiling of a key
///
/// Shared by single matrices and chunk compositions so the four-case period
/// rule and the anomaly policy live in one place.
pub fn assemble_get_result(
    qualified_key: QualifiedKey,
    floor: Option<FloorEntry>,
    ceiling: Option<u64>,
    consistency: ConsistencyMode,
) -> Result<GetResult<Vec<u8>>> {
    match (floor, ceiling) {
        (None, None) => Ok(GetResult::without_value(qualified_key, Period::eternal())),
        (None, Some(ceiling)) => {
            let period = Period::create_range(0, ceiling)?;
            Ok(GetResult::without_value(qualified_key, period))
        }
        (Some(floor), None) => {
            let period = Period::create_open_ended_range(floor.timestamp)?;
            Ok(GetResult::new(qualified_key, non_empty(floor.value), period))
        }
        (Some(floor), Some(ceiling)) => {
            let period = if floor.timestamp < ceiling {
                Period::create_range(floor.timestamp, ceiling)?
            } else {
                match consistency {
                    ConsistencyMode::Strict => {
                        return Err(TemporaError::Corruption(format!(
                            "floor timestamp {} is not below ceiling timestamp {} for key '{}'",
                            floor.timestamp, ceiling, qualified_key
                        )));
                    }
                    ConsistencyMode::Lenient => {
                        error!(
                            target: "tempora::storage",
                            key = %qualified_key,
                            floor = floor.timestamp,
                            ceiling,
                            "Temporal index inconsistency: floor timestamp is not below ceiling timestamp"
                        );
                        Period::create_point(floor.timestamp)?
                    }
                }
            };
            Ok(GetResult::new(qualified_key, non_empty(floor.value), period))
        }
    }
}

fn non_empty(value: Vec<u8>) -> Option<Vec<u8>> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Temporal store of one keyspace
///
/// Cheap to clone: both maps are shared.
#[derive(Clone)]
pub struct DataMatrix {
    keyspace: String,
    forward: Arc<dyn OrderedMap<Vec<u8>>>,
    inverse: Arc<dyn OrderedMap<bool>>,
    consistency: ConsistencyMode,
}

impl DataMatrix {
    /// Create a matrix over fresh maps named `{prefix}/{keyspace}/forward|inverse`
    pub fn create(
        factory: &dyn MapFactory,
        prefix: &str,
        keyspace: impl Into<String>,
        consistency: ConsistencyMode,
    ) -> Result<Self> {
        let keyspace = keyspace.into();
        let forward = factory.create_value_map(&format!("{}/{}/forward", prefix, keyspace))?;
        let inverse = factory.create_flag_map(&format!("{}/{}/inverse", prefix, keyspace))?;
        Ok(Self::from_maps(keyspace, forward, inverse, consistency))
    }

    /// Create a matrix over existing maps
    pub fn from_maps(
        keyspace: impl Into<String>,
        forward: Arc<dyn OrderedMap<Vec<u8>>>,
        inverse: Arc<dyn OrderedMap<bool>>,
        consistency: ConsistencyMode,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            forward,
            inverse,
            consistency,
        }
    }

    /// Keyspace this matrix stores
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Anomaly policy of this matrix
    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    /// Number of stored versions
    pub fn entry_count(&self) -> usize {
        self.forward.len()
    }

    /// Latest version of `key` at or before `timestamp`
    pub fn floor(&self, timestamp: u64, key: &str) -> Result<Option<FloorEntry>> {
        let probe = TemporalKey::encode_parts(key, timestamp);
        match self.forward.floor_entry(&probe) {
            Some((encoded, value)) => {
                let tk = TemporalKey::decode(&encoded)?;
                if tk.key() == key {
                    Ok(Some(FloorEntry {
                        timestamp: tk.timestamp(),
                        value,
                    }))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Timestamp of the first version of `key` strictly after `timestamp`
    pub fn first_after(&self, timestamp: u64, key: &str) -> Result<Option<u64>> {
        let probe = TemporalKey::encode_parts(key, timestamp);
        match self.forward.higher_entry(&probe) {
            Some((encoded, _)) => {
                let tk = TemporalKey::decode(&encoded)?;
                Ok((tk.key() == key).then(|| tk.timestamp()))
            }
            None => Ok(None),
        }
    }

    /// Value of `key` at `timestamp` with its validity period
    pub fn get(&self, timestamp: u64, key: &str) -> Result<GetResult<Vec<u8>>> {
        let floor = self.floor(timestamp, key)?;
        let ceiling = self.first_after(timestamp, key)?;
        assemble_get_result(
            QualifiedKey::new(self.keyspace.clone(), key),
            floor,
            ceiling,
            self.consistency,
        )
    }

    /// Write one version per key at `timestamp`
    ///
    /// `None` and empty values are stored as tombstones. Writing the same
    /// contents at the same timestamp again leaves the matrix unchanged.
    pub fn put(&self, timestamp: u64, contents: &CommitContents) -> Result<()> {
        if contents.is_empty() {
            return Ok(());
        }
        let mut forward_entries = Vec::with_capacity(contents.len());
        let mut inverse_entries = Vec::with_capacity(contents.len());
        for (key, value) in contents {
            let bytes = value.clone().unwrap_or_default();
            inverse_entries.push((
                InverseTemporalKey::encode_parts(timestamp, key),
                !bytes.is_empty(),
            ));
            forward_entries.push((TemporalKey::encode_parts(key, timestamp), bytes));
        }
        let forward_keys: Vec<String> = forward_entries.iter().map(|(k, _)| k.clone()).collect();

        self.forward.insert_batch(forward_entries)?;
        if let Err(e) = self.inverse.insert_batch(inverse_entries) {
            // Keep the pair consistent: no forward entry without its inverse companion
            self.forward.remove_batch(&forward_keys)?;
            return Err(e);
        }
        Ok(())
    }

    /// Keys added and removed by the latest version of each key at or before `timestamp`
    pub fn key_set_modifications(&self, timestamp: u64) -> Result<KeySetModifications> {
        // Ascending scan: for each key the last version seen at or before the bound wins
        let mut latest: HashMap<String, bool> = HashMap::new();
        for (encoded, value) in self.forward.range(Bound::Unbounded, Bound::Unbounded) {
            let tk = TemporalKey::decode(&encoded)?;
            if tk.timestamp() <= timestamp {
                let (key, _) = tk.into_parts();
                latest.insert(key, !value.is_empty());
            }
        }
        let mut modifications = KeySetModifications::new();
        for (key, has_value) in latest {
            if has_value {
                modifications.record_addition(key);
            } else {
                modifications.record_removal(key);
            }
        }
        Ok(modifications)
    }

    /// Commit timestamps of `key` up to `max_timestamp`, descending
    pub fn history(&self, max_timestamp: u64, key: &str) -> History {
        History::new(Arc::clone(&self.forward), key, max_timestamp)
    }

    /// Change events in `[lower_inclusive, upper_exclusive)`, descending by timestamp
    pub fn modifications_between(&self, lower_inclusive: u64, upper_exclusive: u64) -> ModificationScan {
        ModificationScan::new(Arc::clone(&self.inverse), lower_inclusive, upper_exclusive)
    }

    /// Whether any version was written after `timestamp`
    pub fn has_entries_after(&self, timestamp: u64) -> bool {
        if timestamp == u64::MAX {
            return false;
        }
        let bound = InverseTemporalKey::create_max_exclusive(timestamp).encode();
        self.inverse.ceiling_entry(&bound).is_some()
    }

    /// Remove every version written after `timestamp`; returns how many were removed
    ///
    /// Recovery only: must not run concurrently with readers or writers.
    pub fn rollback(&self, timestamp: u64) -> Result<usize> {
        if timestamp == u64::MAX {
            return Ok(0);
        }
        let bound = InverseTemporalKey::create_max_exclusive(timestamp).encode();
        let inverse_keys: Vec<String> = self
            .inverse
            .range(Bound::Included(bound.as_str()), Bound::Unbounded)
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        let mut forward_keys = Vec::new();
        for (encoded, _) in self.forward.range(Bound::Unbounded, Bound::Unbounded) {
            if TemporalKey::decode(&encoded)?.timestamp() > timestamp {
                forward_keys.push(encoded);
            }
        }

        let removed = self.forward.remove_batch(&forward_keys)?;
        self.inverse.remove_batch(&inverse_keys)?;
        debug!(
            target: "tempora::storage",
            keyspace = %self.keyspace,
            timestamp,
            removed,
            "Rolled back data matrix"
        );
        Ok(removed)
    }
}

impl fmt::Debug for DataMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMatrix")
            .field("keyspace", &self.keyspace)
            .field("forward", &self.forward.name())
            .field("inverse", &self.inverse.name())
            .field("consistency", &self.consistency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordered_map::MemoryMapFactory;

    fn matrix() -> DataMatrix {
        DataMatrix::create(&MemoryMapFactory::new(), "test", "default", ConsistencyMode::Lenient)
            .unwrap()
    }

    fn contents(entries: &[(&str, Option<&str>)]) -> CommitContents {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(|v| v.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn test_get_four_cases() {
        let m = matrix();
        m.put(5, &contents(&[("k", Some("a"))])).unwrap();
        m.put(9, &contents(&[("k", Some("b"))])).unwrap();

        // no floor, ceiling
        let r = m.get(3, "k").unwrap();
        assert!(!r.is_hit());
        assert_eq!(r.period(), Period::create_range(0, 5).unwrap());

        // floor and ceiling
        let r = m.get(7, "k").unwrap();
        assert_eq!(r.value(), Some(&b"a".to_vec()));
        assert_eq!(r.period(), Period::create_range(5, 9).unwrap());

        // floor, no ceiling
        let r = m.get(9, "k").unwrap();
        assert_eq!(r.value(), Some(&b"b".to_vec()));
        assert_eq!(r.period(), Period::create_open_ended_range(9).unwrap());

        // neither
        let r = m.get(100, "other").unwrap();
        assert!(!r.is_hit());
        assert_eq!(r.period(), Period::eternal());
    }

    #[test]
    fn test_neighbouring_keys_do_not_leak() {
        let m = matrix();
        m.put(5, &contents(&[("a", Some("1")), ("c", Some("3"))])).unwrap();
        let r = m.get(10, "b").unwrap();
        assert!(!r.is_hit());
        assert_eq!(r.period(), Period::eternal());
    }

    #[test]
    fn test_tombstone_normalized_to_no_value() {
        let m = matrix();
        m.put(5, &contents(&[("k", Some("a"))])).unwrap();
        m.put(8, &contents(&[("k", None)])).unwrap();
        let r = m.get(10, "k").unwrap();
        assert!(!r.is_hit());
        assert_eq!(r.period(), Period::create_open_ended_range(8).unwrap());
        assert_eq!(m.history(10, "k").to_vec().unwrap(), vec![8, 5]);
    }

    #[test]
    fn test_put_is_idempotent() {
        let m = matrix();
        let c = contents(&[("k", Some("a")), ("j", None)]);
        m.put(5, &c).unwrap();
        m.put(5, &c).unwrap();
        assert_eq!(m.entry_count(), 2);
        assert_eq!(m.modifications_between(0, 10).to_vec().unwrap().len(), 2);
    }

    #[test]
    fn test_key_set_modifications_latest_wins() {
        let m = matrix();
        m.put(1, &contents(&[("a", Some("1")), ("b", Some("1"))])).unwrap();
        m.put(2, &contents(&[("a", None)])).unwrap();
        m.put(3, &contents(&[("a", Some("2")), ("b", None)])).unwrap();

        let at2 = m.key_set_modifications(2).unwrap();
        assert!(at2.removals().contains("a"));
        assert!(at2.additions().contains("b"));

        let at3 = m.key_set_modifications(3).unwrap();
        assert!(at3.additions().contains("a"));
        assert!(at3.removals().contains("b"));
        assert!(!at3.additions().contains("b"));
    }

    #[test]
    fn test_history_is_descending_and_bounded() {
        let m = matrix();
        for ts in [2, 4, 6, 8] {
            m.put(ts, &contents(&[("k", Some("v"))])).unwrap();
        }
        let history = m.history(6, "k");
        assert_eq!(history.to_vec().unwrap(), vec![6, 4, 2]);
        // restartable
        assert_eq!(history.iter().take(1).collect::<Result<Vec<_>>>().unwrap(), vec![6]);
        assert_eq!(history.to_vec().unwrap(), vec![6, 4, 2]);
        assert!(m.history(1, "k").to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_modifications_between_half_open_descending() {
        let m = matrix();
        m.put(1, &contents(&[("a", Some("1"))])).unwrap();
        m.put(2, &contents(&[("b", Some("1")), ("c", Some("1"))])).unwrap();
        m.put(3, &contents(&[("a", None)])).unwrap();

        let events = m.modifications_between(2, 3).to_vec().unwrap();
        assert_eq!(
            events,
            vec![TemporalKey::new("c", 2), TemporalKey::new("b", 2)]
        );
        let all = m.modifications_between(0, 100).to_vec().unwrap();
        let stamps: Vec<u64> = all.iter().map(|tk| tk.timestamp()).collect();
        assert_eq!(stamps, vec![3, 2, 2, 1]);
        assert!(m.modifications_between(3, 3).to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_removes_later_entries() {
        let m = matrix();
        m.put(1, &contents(&[("a", Some("1"))])).unwrap();
        m.put(5, &contents(&[("a", Some("2")), ("b", Some("2"))])).unwrap();
        assert!(m.has_entries_after(1));

        let removed = m.rollback(1).unwrap();
        assert_eq!(removed, 2);
        assert!(!m.has_entries_after(1));
        assert_eq!(m.get(10, "a").unwrap().value(), Some(&b"1".to_vec()));
        assert!(!m.get(10, "b").unwrap().is_hit());
        assert_eq!(m.modifications_between(0, 100).to_vec().unwrap().len(), 1);
    }

    #[test]
    fn test_assemble_anomaly_policies() {
        let qk = QualifiedKey::new("ks", "k");
        let floor = FloorEntry {
            timestamp: 9,
            value: b"v".to_vec(),
        };
        let lenient =
            assemble_get_result(qk.clone(), Some(floor.clone()), Some(9), ConsistencyMode::Lenient)
                .unwrap();
        assert_eq!(lenient.value(), Some(&b"v".to_vec()));
        assert_eq!(lenient.period(), Period::create_point(9).unwrap());

        let strict = assemble_get_result(qk, Some(floor), Some(9), ConsistencyMode::Strict);
        assert!(matches!(strict, Err(TemporaError::Corruption(_))));
    }
}
