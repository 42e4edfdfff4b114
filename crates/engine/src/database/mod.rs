//! TemporalDatabase: the public face of the engine
//!
//! This module ties the branch tree, the per-branch chunks and the secondary
//! indices together:
//! - Commits write data into the active chunk of a branch and keep every
//!   registered index in step, all-or-nothing
//! - Reads resolve branch visibility and compose chunks transparently
//! - Rollbacks remove data and index documents after a timestamp
//! - Index creation backfills every branch from its stored history
//!
//! ## Locking
//!
//! Locks are always taken in this order:
//!
//! 1. `index_schema` (read for commits, rollbacks and branch deletion; write
//!    for index creation and drops)
//! 2. the branch manager's structure lock (branch creation, deletion, rollback)
//! 3. the branch's write lock (commit, rollback, rollover)
//!
//! Readers take none of them.

pub mod config;

pub use config::{EngineConfig, CONFIG_FILE_NAME};

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tempora_core::{BranchMetadata, GetResult, Period, Result, TemporaError, TIMESTAMP_MAX};
use tempora_index::{
    BranchLocalDocuments, IndexDocument, IndexManager, IndexModifications, IndexQuery, Indexer,
    SearchSpec,
};
use tempora_storage::{CommitContents, History, MapFactory, MemoryMapFactory, ModificationScan};
use tracing::{debug, error, info, warn};

use crate::branch::{Branch, BranchManager};

// ============================================================================
// CommitBatch
// ============================================================================

/// Writes of one commit, grouped by keyspace
///
/// ```
/// use tempora_engine::CommitBatch;
///
/// let batch = CommitBatch::new()
///     .put("cars", "vw-golf", "blue")
///     .delete("cars", "fiat-500");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitBatch {
    writes: BTreeMap<String, CommitContents>,
}

impl CommitBatch {
    /// An empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` in `keyspace` to `value`
    ///
    /// An empty value is stored as a deletion.
    pub fn put(
        mut self,
        keyspace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(keyspace, key, Some(value.into()));
        self
    }

    /// Delete `key` from `keyspace`
    pub fn delete(mut self, keyspace: impl Into<String>, key: impl Into<String>) -> Self {
        self.insert(keyspace, key, None);
        self
    }

    /// Record a write; a later write to the same key replaces an earlier one
    pub fn insert(
        &mut self,
        keyspace: impl Into<String>,
        key: impl Into<String>,
        value: Option<Vec<u8>>,
    ) {
        self.writes
            .entry(keyspace.into())
            .or_default()
            .insert(key.into(), value);
    }

    /// Number of written keys across all keyspaces
    pub fn len(&self) -> usize {
        self.writes.values().map(|c| c.len()).sum()
    }

    /// Whether the batch writes nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes per keyspace
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CommitContents)> {
        self.writes.iter()
    }
}

// ============================================================================
// TemporalDatabase
// ============================================================================

/// A branching, temporal key-value store with secondary indices
pub struct TemporalDatabase {
    config: EngineConfig,
    branches: BranchManager,
    index: IndexManager,
    index_schema: RwLock<()>,
}

impl TemporalDatabase {
    /// Open an in-memory database
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with_factory(config, Arc::new(MemoryMapFactory::new()))
    }

    /// Open a database storing its maps through `factory`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid, or the factory's
    /// error if the branch metadata map cannot be created.
    pub fn open_with_factory(config: EngineConfig, factory: Arc<dyn MapFactory>) -> Result<Self> {
        config.validate()?;
        let branches = BranchManager::new(factory, config.consistency)?;
        let index = IndexManager::new(config.case_insensitive_index_values);
        info!(
            target: "tempora::db",
            consistency = %config.consistency.as_str(),
            auto_rollover_threshold = ?config.auto_rollover_threshold,
            "Opened temporal database"
        );
        Ok(Self {
            config,
            branches,
            index,
            index_schema: RwLock::new(()),
        })
    }

    /// Open an in-memory database configured by `tempora.toml` in `dir`
    ///
    /// A default config file is written first if none exists.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&path)?;
        Self::open(EngineConfig::from_file(&path)?)
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Branches
    // ========================================================================

    /// Fork `name` from `origin` (master when `None`) at the origin's "now"
    pub fn create_branch(&self, name: &str, origin: Option<&str>) -> Result<BranchMetadata> {
        Ok(self.branches.create_branch(name, origin)?.metadata().clone())
    }

    /// Fork `name` from `origin` at an explicit timestamp no later than its "now"
    pub fn create_branch_at(
        &self,
        name: &str,
        origin: &str,
        branching_timestamp: u64,
    ) -> Result<BranchMetadata> {
        Ok(self
            .branches
            .create_branch_at(name, origin, branching_timestamp)?
            .metadata()
            .clone())
    }

    /// Delete a leaf branch with its data and index documents
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let _schema = self.index_schema.read();
        self.branches.delete_branch(name)?;
        let modifications = self.index.branch_deletion_modifications(name);
        self.index.apply(&modifications)
    }

    /// Whether a branch named `name` exists
    pub fn exists_branch(&self, name: &str) -> bool {
        self.branches.exists_branch(name)
    }

    /// All branch names, origins before their children
    pub fn branch_names(&self) -> Vec<String> {
        self.branches.branch_names()
    }

    /// Metadata from `name` up to master
    pub fn walk_to_master(&self, name: &str) -> Result<Vec<BranchMetadata>> {
        self.branches.walk_to_master(name)
    }

    /// Timestamp of the latest commit on `name`
    pub fn now(&self, name: &str) -> Result<u64> {
        Ok(self.branches.get_branch(name)?.now())
    }

    /// The branch registry
    pub fn branches(&self) -> &BranchManager {
        &self.branches
    }

    // ========================================================================
    // Commits
    // ========================================================================

    /// Commit `batch` on `branch` at the wall clock in milliseconds, or just
    /// after the branch's "now" if the clock is behind it
    pub fn commit(&self, branch: &str, batch: &CommitBatch) -> Result<u64> {
        self.commit_with(branch, batch, |now| {
            let wall_clock = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
            wall_clock.max(now.saturating_add(1))
        })
    }

    /// Commit `batch` on `branch` at `timestamp`
    ///
    /// # Errors
    ///
    /// - `UnknownBranch` if the branch does not exist
    /// - `NonMonotonicCommit` if `timestamp` does not exceed the branch's "now"
    /// - `InvalidPeriod` if `timestamp` is the open upper bound
    /// - any storage or index error; the branch is left as before the call
    pub fn commit_at(&self, branch: &str, timestamp: u64, batch: &CommitBatch) -> Result<u64> {
        self.commit_with(branch, batch, |_| timestamp)
    }

    fn commit_with<F>(&self, name: &str, batch: &CommitBatch, choose_timestamp: F) -> Result<u64>
    where
        F: FnOnce(u64) -> u64,
    {
        let _schema = self.index_schema.read();
        let branch = self.branches.get_branch(name)?;
        let _writer = branch.lock_writes();

        let now = branch.now();
        let timestamp = choose_timestamp(now);
        if timestamp <= now {
            return Err(TemporaError::NonMonotonicCommit {
                branch: name.to_string(),
                timestamp,
                now,
            });
        }
        if timestamp == TIMESTAMP_MAX {
            return Err(TemporaError::InvalidPeriod {
                lower: timestamp,
                upper: TIMESTAMP_MAX,
                requested: timestamp,
                reason: "commit timestamp must be below the open upper bound",
            });
        }

        let chain = branch.chain();
        let mut index_modifications = IndexModifications::new();
        for (keyspace, contents) in batch.iter() {
            index_modifications.extend(self.index.compute_commit_modifications(
                &chain, timestamp, keyspace, contents,
            )?);
        }

        for (keyspace, contents) in batch.iter() {
            if let Err(e) = branch.chunks().put(timestamp, keyspace, contents) {
                self.discard_partial_commit(&branch, now, &e);
                return Err(e);
            }
        }
        if let Err(e) = self.index.apply(&index_modifications) {
            self.discard_partial_commit(&branch, now, &e);
            return Err(e);
        }

        branch.set_now(timestamp);
        debug!(
            target: "tempora::db",
            branch = name,
            timestamp,
            keys = batch.len(),
            index_changes = index_modifications.len(),
            "Committed"
        );

        self.maybe_auto_rollover(&branch);
        Ok(timestamp)
    }

    fn discard_partial_commit(&self, branch: &Branch, now: u64, cause: &TemporaError) {
        match branch.chunks().rollback(now) {
            Ok(removed) => warn!(
                target: "tempora::db",
                branch = branch.name(),
                removed,
                error = %cause,
                "Commit failed, discarded its data"
            ),
            Err(e) => error!(
                target: "tempora::db",
                branch = branch.name(),
                error = %e,
                cause = %cause,
                "Commit failed and its data could not be discarded"
            ),
        }
    }

    fn maybe_auto_rollover(&self, branch: &Branch) {
        let threshold = match self.config.auto_rollover_threshold {
            Some(threshold) => threshold,
            None => return,
        };
        let entries = match branch.chunks().active_entry_count() {
            Ok(entries) => entries as u64,
            Err(e) => {
                warn!(target: "tempora::rollover", branch = branch.name(), error = %e, "Skipping auto rollover");
                return;
            }
        };
        if entries < threshold {
            return;
        }
        if let Err(e) = branch.chunks().rollover(branch.now()) {
            warn!(
                target: "tempora::rollover",
                branch = branch.name(),
                entries,
                error = %e,
                "Auto rollover failed"
            );
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Value of `key` at `timestamp` on `branch`, with its validity period
    pub fn get(
        &self,
        branch: &str,
        timestamp: u64,
        keyspace: &str,
        key: &str,
    ) -> Result<GetResult<Vec<u8>>> {
        self.branches.get_branch(branch)?.get(timestamp, keyspace, key)
    }

    /// Commit timestamps of `key` up to `max_timestamp`, newest first
    pub fn history(
        &self,
        branch: &str,
        max_timestamp: u64,
        keyspace: &str,
        key: &str,
    ) -> Result<History> {
        Ok(self
            .branches
            .get_branch(branch)?
            .history(max_timestamp, keyspace, key))
    }

    /// Keys holding a value at `timestamp`
    pub fn key_set(&self, branch: &str, timestamp: u64, keyspace: &str) -> Result<BTreeSet<String>> {
        self.branches.get_branch(branch)?.key_set(timestamp, keyspace)
    }

    /// Keyspaces visible on `branch`
    pub fn keyspaces(&self, branch: &str) -> Result<BTreeSet<String>> {
        Ok(self.branches.get_branch(branch)?.keyspaces())
    }

    /// Change events in `[lower_inclusive, upper_exclusive)`, newest first
    pub fn modifications_between(
        &self,
        branch: &str,
        keyspace: &str,
        lower_inclusive: u64,
        upper_exclusive: u64,
    ) -> Result<ModificationScan> {
        Ok(self.branches.get_branch(branch)?.modifications_between(
            keyspace,
            lower_inclusive,
            upper_exclusive,
        ))
    }

    // ========================================================================
    // Rollback and rollover
    // ========================================================================

    /// Remove everything committed on `branch` after `timestamp`
    ///
    /// Returns the number of removed versions. A `timestamp` at or after the
    /// branch's "now" is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidRollback` if `timestamp` lies before the branching timestamp,
    /// before the active chunk, or before the branching timestamp of a child.
    pub fn rollback(&self, name: &str, timestamp: u64) -> Result<usize> {
        let _schema = self.index_schema.read();
        let _structure = self.branches.lock_structure();
        let branch = self.branches.get_branch(name)?;
        let _writer = branch.lock_writes();

        let now = branch.now();
        if timestamp >= now {
            return Ok(0);
        }
        let reject = |reason: String| TemporaError::InvalidRollback {
            branch: name.to_string(),
            timestamp,
            reason,
        };
        if timestamp < branch.branching_timestamp() {
            return Err(reject(format!(
                "the branch forked at {}",
                branch.branching_timestamp()
            )));
        }
        let mut stranded = Vec::new();
        for child in self.branches.children_of(name) {
            if self.branches.get_branch(&child)?.branching_timestamp() > timestamp {
                stranded.push(child);
            }
        }
        if !stranded.is_empty() {
            return Err(reject(format!(
                "child branches fork after it: {}",
                stranded.join(", ")
            )));
        }

        let removed = branch.chunks().rollback(timestamp)?;
        let modifications = self.index.rollback_modifications(name, timestamp);
        self.index.apply(&modifications)?;
        branch.set_now(timestamp);

        info!(
            target: "tempora::db",
            branch = name,
            from = now,
            to = timestamp,
            removed,
            "Rolled back branch"
        );
        Ok(removed)
    }

    /// Seal the active chunk of `branch` at its "now" and start a new one
    ///
    /// Returns the sealed period.
    ///
    /// # Errors
    ///
    /// - `UnknownBranch` if `name` does not exist
    /// - `RolloverFailed` if nothing was committed to the active chunk yet,
    ///   which includes a branch that never committed, or if a map for the new
    ///   chunk cannot be created. The chunk list is unchanged in both cases.
    pub fn perform_rollover(&self, name: &str) -> Result<Period> {
        let branch = self.branches.get_branch(name)?;
        let _writer = branch.lock_writes();
        branch.chunks().rollover(branch.now())
    }

    /// Periods of the chunks of `branch`, oldest first
    pub fn chunk_periods(&self, name: &str) -> Result<Vec<Period>> {
        Ok(self.branches.get_branch(name)?.chunks().periods())
    }

    // ========================================================================
    // Indices
    // ========================================================================

    /// Register an index and backfill it from every branch's history
    ///
    /// # Errors
    ///
    /// `IndexAlreadyExists` if the name is taken. If the backfill fails the
    /// index is removed again and the error returned.
    pub fn create_index(&self, name: &str, indexer: Arc<dyn Indexer>) -> Result<()> {
        let _schema = self.index_schema.write();
        self.index.register_index(name, indexer)?;
        match self.backfill(name) {
            Ok(documents) => {
                info!(target: "tempora::index", index = name, documents, "Created index");
                Ok(())
            }
            Err(e) => {
                warn!(target: "tempora::index", index = name, error = %e, "Index backfill failed");
                if let Err(cleanup) = self.remove_index(name) {
                    error!(target: "tempora::index", index = name, error = %cleanup, "Could not remove partially built index");
                }
                Err(e)
            }
        }
    }

    /// Replay every branch's own commits through one index, oldest first
    fn backfill(&self, index_name: &str) -> Result<usize> {
        let mut documents = 0;
        for name in self.branches.branch_names() {
            let branch = self.branches.get_branch(&name)?;
            let chain = branch.chain();
            for keyspace in branch.chunks().keyspaces() {
                for (timestamp, contents) in Self::own_commits(&branch, &keyspace)? {
                    let modifications = self.index.compute_backfill_modifications(
                        index_name, &chain, timestamp, &keyspace, &contents,
                    )?;
                    documents += modifications.additions().len();
                    self.index.apply(&modifications)?;
                }
            }
        }
        Ok(documents)
    }

    /// Commits stored on `branch` itself for one keyspace, ascending
    fn own_commits(branch: &Branch, keyspace: &str) -> Result<BTreeMap<u64, CommitContents>> {
        let chunks = branch.chunks();
        let mut commits: BTreeMap<u64, CommitContents> = BTreeMap::new();
        for event in &chunks.modifications_between(keyspace, 0, TIMESTAMP_MAX) {
            let (key, timestamp) = event?.into_parts();
            let value = chunks
                .floor(timestamp, keyspace, &key)?
                .filter(|floor| floor.timestamp == timestamp && !floor.is_tombstone())
                .map(|floor| floor.value);
            commits.entry(timestamp).or_default().insert(key, value);
        }
        Ok(commits)
    }

    /// Remove an index and all its documents
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let _schema = self.index_schema.write();
        self.remove_index(name)?;
        info!(target: "tempora::index", index = name, "Dropped index");
        Ok(())
    }

    fn remove_index(&self, name: &str) -> Result<()> {
        let modifications = self.index.drop_index_modifications(name);
        self.index.apply(&modifications)?;
        self.index.unregister_index(name)
    }

    /// Names of the registered indices
    pub fn index_names(&self) -> Vec<String> {
        self.index.index_names()
    }

    /// Keys of `keyspace` matching `query` on `branch` at `timestamp`
    pub fn query_index(
        &self,
        branch: &str,
        timestamp: u64,
        keyspace: &str,
        query: &IndexQuery,
    ) -> Result<BTreeSet<String>> {
        let branch = self.branches.get_branch(branch)?;
        let chain = branch.chain();
        query.evaluate(
            &mut |spec: &SearchSpec| self.index.matching_keys(timestamp, &chain, keyspace, spec),
            &mut || branch.key_set(timestamp, keyspace),
        )
    }

    /// Index documents matching `spec` on `branch` at `timestamp`
    pub fn matching_documents(
        &self,
        branch: &str,
        timestamp: u64,
        keyspace: &str,
        spec: &SearchSpec,
    ) -> Result<Vec<IndexDocument>> {
        let chain = self.branches.walk_to_master(branch)?;
        self.index
            .get_matching_documents(timestamp, &chain, keyspace, spec)
    }

    /// Currently valid documents stored on `branch` itself, by index and keyspace
    pub fn branch_local_documents(&self, branch: &str) -> Result<BranchLocalDocuments> {
        self.branches.get_branch(branch)?;
        Ok(self.index.get_matching_branch_local_documents(branch))
    }
}

impl std::fmt::Debug for TemporalDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalDatabase")
            .field("config", &self.config)
            .field("branches", &self.branches)
            .field("indices", &self.index.index_names())
            .finish()
    }
}
