//! Chunks and rollover
//!
//! A branch stores its data in a list of chunks. Each chunk covers a period
//! of commit timestamps and holds one [`DataMatrix`] per keyspace. Only the
//! newest chunk, whose period is open ended, accepts writes.
//!
//! ```text
//! [0;8)      sealed   matrices for "cars", "people"
//! [8;15)     sealed   matrices for "cars", "people"
//! [15;MAX)   active   matrices for "cars", "people", "places"
//! ```
//!
//! A rollover seals the active chunk at the branch's current timestamp and
//! appends a fresh one. Readers compose the chunks so the split is invisible:
//! the floor of a key comes from the newest chunk that has one, the ceiling
//! from the oldest chunk with a later version.
//!
//! The chunk list is swapped in one assignment under a `parking_lot::RwLock`.
//! Readers clone the list (a vector of `Arc`s) and never block a rollover
//! for longer than that clone.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tempora_core::{
    ConsistencyMode, GetResult, KeySetModifications, Period, QualifiedKey, Result, TemporaError,
};
use tempora_storage::{
    assemble_get_result, CommitContents, DataMatrix, FloorEntry, History, MapFactory,
    ModificationScan,
};
use tracing::info;

/// One period of a branch's data
pub struct Chunk {
    index: usize,
    period: Period,
    matrices: RwLock<BTreeMap<String, DataMatrix>>,
}

impl Chunk {
    fn new(index: usize, period: Period, matrices: BTreeMap<String, DataMatrix>) -> Self {
        Self {
            index,
            period,
            matrices: RwLock::new(matrices),
        }
    }

    /// Position in the branch's chunk list, oldest first
    pub fn index(&self) -> usize {
        self.index
    }

    /// Timestamps this chunk covers
    pub fn period(&self) -> Period {
        self.period
    }

    /// Matrix of `keyspace`, if this chunk has one
    pub fn matrix(&self, keyspace: &str) -> Option<DataMatrix> {
        self.matrices.read().get(keyspace).cloned()
    }

    /// Keyspaces with a matrix in this chunk
    pub fn keyspaces(&self) -> Vec<String> {
        self.matrices.read().keys().cloned().collect()
    }

    /// Versions stored across all keyspaces
    pub fn entry_count(&self) -> usize {
        self.matrices.read().values().map(|m| m.entry_count()).sum()
    }

    fn matrices(&self) -> Vec<DataMatrix> {
        self.matrices.read().values().cloned().collect()
    }

    /// Same matrices under a new period
    fn with_period(&self, period: Period) -> Self {
        Self::new(self.index, period, self.matrices.read().clone())
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("period", &self.period)
            .field("keyspaces", &self.keyspaces())
            .finish()
    }
}

/// The chunks of one branch, composed into a single timeline
pub struct ChunkSet {
    branch: String,
    factory: Arc<dyn MapFactory>,
    consistency: ConsistencyMode,
    chunks: RwLock<Vec<Arc<Chunk>>>,
}

impl ChunkSet {
    /// Create a set holding one empty active chunk starting at `lower`
    pub fn new(
        branch: impl Into<String>,
        lower: u64,
        factory: Arc<dyn MapFactory>,
        consistency: ConsistencyMode,
    ) -> Result<Self> {
        let first = Chunk::new(0, Period::create_open_ended_range(lower)?, BTreeMap::new());
        Ok(Self {
            branch: branch.into(),
            factory,
            consistency,
            chunks: RwLock::new(vec![Arc::new(first)]),
        })
    }

    /// Anomaly policy of every matrix in the set
    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    /// Current chunk list, oldest first
    pub fn snapshot(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    /// Periods of all chunks, oldest first
    pub fn periods(&self) -> Vec<Period> {
        self.chunks.read().iter().map(|c| c.period()).collect()
    }

    /// The chunk accepting writes
    pub fn active(&self) -> Result<Arc<Chunk>> {
        self.chunks.read().last().cloned().ok_or_else(|| {
            TemporaError::Corruption(format!("branch '{}' has no chunks", self.branch))
        })
    }

    /// Versions stored in the active chunk
    pub fn active_entry_count(&self) -> Result<usize> {
        Ok(self.active()?.entry_count())
    }

    /// Keyspaces with a matrix in any chunk
    pub fn keyspaces(&self) -> BTreeSet<String> {
        self.snapshot()
            .iter()
            .flat_map(|chunk| chunk.keyspaces())
            .collect()
    }

    fn map_prefix(&self, chunk_index: usize) -> String {
        format!("{}/chunk-{}", self.branch, chunk_index)
    }

    /// Matrix of `keyspace` in the active chunk, created on first use
    fn writable_matrix(&self, keyspace: &str) -> Result<DataMatrix> {
        let active = self.active()?;
        let mut matrices = active.matrices.write();
        if let Some(matrix) = matrices.get(keyspace) {
            return Ok(matrix.clone());
        }
        let matrix = DataMatrix::create(
            self.factory.as_ref(),
            &self.map_prefix(active.index()),
            keyspace,
            self.consistency,
        )?;
        matrices.insert(keyspace.to_string(), matrix.clone());
        Ok(matrix)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a commit's contents for one keyspace into the active chunk
    pub fn put(&self, timestamp: u64, keyspace: &str, contents: &CommitContents) -> Result<()> {
        if contents.is_empty() {
            return Ok(());
        }
        self.writable_matrix(keyspace)?.put(timestamp, contents)
    }

    /// Remove every version after `timestamp`
    ///
    /// # Errors
    ///
    /// Returns `InvalidRollback` if versions at or before `timestamp` live in
    /// a sealed chunk the rollback would have to reopen. Nothing is removed
    /// in that case.
    pub fn rollback(&self, timestamp: u64) -> Result<usize> {
        let active = self.active()?;
        let lower = active.period().lower_bound();
        if timestamp.saturating_add(1) < lower {
            return Err(TemporaError::InvalidRollback {
                branch: self.branch.clone(),
                timestamp,
                reason: format!("would cross the chunk boundary at {}", lower),
            });
        }
        let mut removed = 0;
        for matrix in active.matrices() {
            removed += matrix.rollback(timestamp)?;
        }
        Ok(removed)
    }

    /// Seal the active chunk at `now` and open a new one at `now + 1`
    ///
    /// Returns the sealed period. The caller must hold the branch's write
    /// lock so `now` cannot move.
    ///
    /// # Errors
    ///
    /// Returns `RolloverFailed` if the active chunk is empty or a map cannot
    /// be created. The chunk list is unchanged on error.
    pub fn rollover(&self, now: u64) -> Result<Period> {
        let current = self.snapshot();
        let active = current.last().cloned().ok_or_else(|| {
            TemporaError::Corruption(format!("branch '{}' has no chunks", self.branch))
        })?;
        let fail = |reason: String| TemporaError::RolloverFailed {
            branch: self.branch.clone(),
            now,
            reason,
        };

        if active.entry_count() == 0 {
            return Err(fail("nothing was committed since the last rollover".to_string()));
        }
        let boundary = now.saturating_add(1);
        let sealed_period = active
            .period()
            .set_upper_bound(boundary)
            .map_err(|e| fail(e.to_string()))?;
        let next_period =
            Period::create_open_ended_range(boundary).map_err(|e| fail(e.to_string()))?;

        let next_index = active.index() + 1;
        let prefix = self.map_prefix(next_index);
        let mut fresh = BTreeMap::new();
        for keyspace in self.keyspaces() {
            let matrix =
                DataMatrix::create(self.factory.as_ref(), &prefix, keyspace.as_str(), self.consistency)
                    .map_err(|e| fail(e.to_string()))?;
            fresh.insert(keyspace, matrix);
        }

        let mut next: Vec<Arc<Chunk>> = current[..current.len() - 1].to_vec();
        next.push(Arc::new(active.with_period(sealed_period)));
        next.push(Arc::new(Chunk::new(next_index, next_period, fresh)));
        *self.chunks.write() = next;

        info!(
            target: "tempora::rollover",
            branch = %self.branch,
            sealed = %sealed_period,
            chunks = next_index + 1,
            "Rolled over active chunk"
        );
        Ok(sealed_period)
    }

    // =========================================================================
    // Composed reads
    // =========================================================================

    /// Latest version of `key` at or before `timestamp`, across chunks
    pub fn floor(&self, timestamp: u64, keyspace: &str, key: &str) -> Result<Option<FloorEntry>> {
        for chunk in self.snapshot().iter().rev() {
            if chunk.period().lower_bound() > timestamp {
                continue;
            }
            if let Some(matrix) = chunk.matrix(keyspace) {
                if let Some(floor) = matrix.floor(timestamp, key)? {
                    return Ok(Some(floor));
                }
            }
        }
        Ok(None)
    }

    /// Timestamp of the first version of `key` after `timestamp`, across chunks
    pub fn first_after(&self, timestamp: u64, keyspace: &str, key: &str) -> Result<Option<u64>> {
        if timestamp == u64::MAX {
            return Ok(None);
        }
        for chunk in self.snapshot().iter() {
            if chunk.period().upper_bound() <= timestamp + 1 {
                continue;
            }
            if let Some(matrix) = chunk.matrix(keyspace) {
                if let Some(ceiling) = matrix.first_after(timestamp, key)? {
                    return Ok(Some(ceiling));
                }
            }
        }
        Ok(None)
    }

    /// Value of `key` at `timestamp` from this set alone
    pub fn get(&self, timestamp: u64, keyspace: &str, key: &str) -> Result<GetResult<Vec<u8>>> {
        assemble_get_result(
            QualifiedKey::new(keyspace, key),
            self.floor(timestamp, keyspace, key)?,
            self.first_after(timestamp, keyspace, key)?,
            self.consistency,
        )
    }

    /// Commit timestamps of `key` up to `max_timestamp`, descending
    pub fn history(&self, max_timestamp: u64, keyspace: &str, key: &str) -> History {
        let mut history = History::empty(key);
        for chunk in self.snapshot().iter().rev() {
            if chunk.period().lower_bound() > max_timestamp {
                continue;
            }
            if let Some(matrix) = chunk.matrix(keyspace) {
                history = history.then(matrix.history(max_timestamp, key));
            }
        }
        history
    }

    /// Change events in `[lower_inclusive, upper_exclusive)`, descending
    pub fn modifications_between(
        &self,
        keyspace: &str,
        lower_inclusive: u64,
        upper_exclusive: u64,
    ) -> ModificationScan {
        let mut scan = ModificationScan::empty();
        for chunk in self.snapshot().iter().rev() {
            let period = chunk.period();
            if period.lower_bound() >= upper_exclusive || period.upper_bound() <= lower_inclusive {
                continue;
            }
            if let Some(matrix) = chunk.matrix(keyspace) {
                scan = scan.then(matrix.modifications_between(lower_inclusive, upper_exclusive));
            }
        }
        scan
    }

    /// Key additions and removals up to `timestamp`, newest chunk winning
    pub fn key_set_modifications(&self, timestamp: u64, keyspace: &str) -> Result<KeySetModifications> {
        let mut modifications = KeySetModifications::new();
        for chunk in self.snapshot().iter() {
            if chunk.period().lower_bound() > timestamp {
                break;
            }
            if let Some(matrix) = chunk.matrix(keyspace) {
                modifications.merge(matrix.key_set_modifications(timestamp)?);
            }
        }
        Ok(modifications)
    }
}

impl fmt::Debug for ChunkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSet")
            .field("branch", &self.branch)
            .field("periods", &self.periods())
            .finish()
    }
}
