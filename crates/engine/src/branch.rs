//! Branches and the branch tree
//!
//! Every branch except master forks from an origin at a branching timestamp.
//! A branch stores only what was committed on it; reads fall through to the
//! origin, clamped to the branching timestamp, for keys the branch never
//! wrote.
//!
//! ## Visibility
//!
//! For a read of `key` at `T` on branch `B` with branching timestamp `bts`:
//!
//! - If `B` holds a version of `key` at or before `T`, that version wins.
//! - Otherwise the origin is asked at `min(T, bts)`. If the inherited version
//!   was still valid at `bts`, its period is extended until `B`'s own first
//!   version after `T` (or stays open ended).
//!
//! Writes on `B` are never visible to its origin, and writes on the origin
//! after `bts` are never visible to `B`.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempora_core::{
    validate_branch_name, BranchMetadata, ConsistencyMode, GetResult, Period, Result, TemporaError,
    MASTER_BRANCH_NAME, TIMESTAMP_MAX,
};
use tempora_storage::{History, MapFactory, ModificationScan, OrderedMap};
use tracing::info;

use crate::chunk::ChunkSet;

/// Name of the map holding persisted branch metadata records
pub const BRANCH_METADATA_MAP_NAME: &str = "_branches";

// =============================================================================
// Branch
// =============================================================================

/// One branch: its metadata, its own chunks and a link to its origin
pub struct Branch {
    metadata: BranchMetadata,
    origin: Option<Arc<Branch>>,
    now: AtomicU64,
    write_lock: Mutex<()>,
    chunks: ChunkSet,
}

impl Branch {
    fn new(
        metadata: BranchMetadata,
        origin: Option<Arc<Branch>>,
        factory: Arc<dyn MapFactory>,
        consistency: ConsistencyMode,
    ) -> Result<Self> {
        let start = metadata.branching_timestamp;
        let chunks = ChunkSet::new(metadata.name.clone(), start, factory, consistency)?;
        Ok(Self {
            metadata,
            origin,
            now: AtomicU64::new(start),
            write_lock: Mutex::new(()),
            chunks,
        })
    }

    /// Branch name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Persisted identity
    pub fn metadata(&self) -> &BranchMetadata {
        &self.metadata
    }

    /// The branch this one forked from
    pub fn origin(&self) -> Option<&Arc<Branch>> {
        self.origin.as_ref()
    }

    /// Timestamp on the origin at which this branch forked (0 for master)
    pub fn branching_timestamp(&self) -> u64 {
        self.metadata.branching_timestamp
    }

    /// Whether this is the master branch
    pub fn is_master(&self) -> bool {
        self.metadata.is_master()
    }

    /// Timestamp of the latest commit, or the branching timestamp before any
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    pub(crate) fn set_now(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::Release);
    }

    /// Serializes commits, rollbacks and rollovers of this branch
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// The branch's own chunks
    pub fn chunks(&self) -> &ChunkSet {
        &self.chunks
    }

    /// Metadata of this branch and its ancestors, ending with master
    pub fn chain(&self) -> Vec<BranchMetadata> {
        let mut chain = vec![self.metadata.clone()];
        let mut current = self.origin.as_ref();
        while let Some(branch) = current {
            chain.push(branch.metadata.clone());
            current = branch.origin.as_ref();
        }
        chain
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value of `key` at `timestamp` as seen from this branch
    pub fn get(&self, timestamp: u64, keyspace: &str, key: &str) -> Result<GetResult<Vec<u8>>> {
        let origin = match &self.origin {
            Some(origin) => origin,
            None => return self.chunks.get(timestamp, keyspace, key),
        };
        if self.chunks.floor(timestamp, keyspace, key)?.is_some() {
            return self.chunks.get(timestamp, keyspace, key);
        }

        let branching_timestamp = self.branching_timestamp();
        let inherited = origin.get(timestamp.min(branching_timestamp), keyspace, key)?;
        let period = inherited.period();
        if period.upper_bound() <= branching_timestamp {
            // superseded on the origin before the fork
            return Ok(inherited);
        }
        let upper = self
            .chunks
            .first_after(timestamp, keyspace, key)?
            .unwrap_or(TIMESTAMP_MAX);
        let period = Period::create_range(period.lower_bound(), upper)?;
        Ok(inherited.with_period(period))
    }

    /// Commit timestamps of `key` up to `max_timestamp`, descending,
    /// continuing into the origin below the branching timestamp
    pub fn history(&self, max_timestamp: u64, keyspace: &str, key: &str) -> History {
        let own = self.chunks.history(max_timestamp, keyspace, key);
        match &self.origin {
            Some(origin) => own.then(origin.history(
                max_timestamp.min(self.branching_timestamp()),
                keyspace,
                key,
            )),
            None => own,
        }
    }

    /// Keys holding a value at `timestamp`
    pub fn key_set(&self, timestamp: u64, keyspace: &str) -> Result<BTreeSet<String>> {
        let mut keys = match &self.origin {
            Some(origin) => origin.key_set(timestamp.min(self.branching_timestamp()), keyspace)?,
            None => BTreeSet::new(),
        };
        self.chunks
            .key_set_modifications(timestamp, keyspace)?
            .apply(&mut keys);
        Ok(keys)
    }

    /// Keyspaces written on this branch or any ancestor
    pub fn keyspaces(&self) -> BTreeSet<String> {
        let mut keyspaces = self.chunks.keyspaces();
        if let Some(origin) = &self.origin {
            keyspaces.extend(origin.keyspaces());
        }
        keyspaces
    }

    /// Change events in `[lower_inclusive, upper_exclusive)`, descending,
    /// including inherited events up to the branching timestamp
    pub fn modifications_between(
        &self,
        keyspace: &str,
        lower_inclusive: u64,
        upper_exclusive: u64,
    ) -> ModificationScan {
        let own = self
            .chunks
            .modifications_between(keyspace, lower_inclusive, upper_exclusive);
        match &self.origin {
            Some(origin) => {
                let inherited_upper =
                    upper_exclusive.min(self.branching_timestamp().saturating_add(1));
                own.then(origin.modifications_between(keyspace, lower_inclusive, inherited_upper))
            }
            None => own,
        }
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.metadata.name)
            .field("origin", &self.metadata.origin)
            .field("branching_timestamp", &self.metadata.branching_timestamp)
            .field("now", &self.now())
            .finish()
    }
}

// =============================================================================
// BranchManager
// =============================================================================

/// Registry of all branches
///
/// Branch metadata is persisted to an ordered map created by the factory, one
/// record per branch keyed by name.
pub struct BranchManager {
    branches: DashMap<String, Arc<Branch>>,
    creation_order: RwLock<Vec<String>>,
    structure_lock: Mutex<()>,
    metadata: Arc<dyn OrderedMap<Vec<u8>>>,
    factory: Arc<dyn MapFactory>,
    consistency: ConsistencyMode,
}

impl BranchManager {
    /// Create a manager holding only the master branch
    pub fn new(factory: Arc<dyn MapFactory>, consistency: ConsistencyMode) -> Result<Self> {
        let metadata = factory.create_value_map(BRANCH_METADATA_MAP_NAME)?;
        let manager = Self {
            branches: DashMap::new(),
            creation_order: RwLock::new(Vec::new()),
            structure_lock: Mutex::new(()),
            metadata,
            factory,
            consistency,
        };
        let master = BranchMetadata::master();
        manager.register(Branch::new(
            master,
            None,
            manager.factory.clone(),
            consistency,
        )?)?;
        Ok(manager)
    }

    /// Serializes branch creation, deletion and rollback
    pub(crate) fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure_lock.lock()
    }

    fn register(&self, branch: Branch) -> Result<Arc<Branch>> {
        let name = branch.name().to_string();
        self.metadata
            .insert_batch(vec![(name.clone(), branch.metadata().to_bytes()?)])?;
        let branch = Arc::new(branch);
        self.branches.insert(name.clone(), branch.clone());
        self.creation_order.write().push(name);
        Ok(branch)
    }

    /// Fork `name` from `origin` (master when `None`) at the origin's "now"
    ///
    /// # Errors
    ///
    /// - `InvalidBranchName` if `name` fails validation
    /// - `BranchAlreadyExists` if `name` is taken
    /// - `UnknownOrigin` if the origin does not exist
    pub fn create_branch(&self, name: &str, origin: Option<&str>) -> Result<Arc<Branch>> {
        let _structure = self.lock_structure();
        let origin = self.origin_for(origin.unwrap_or(MASTER_BRANCH_NAME))?;
        let branching_timestamp = origin.now();
        self.create_locked(name, origin, branching_timestamp)
    }

    /// Fork `name` from `origin` at an explicit past timestamp
    ///
    /// # Errors
    ///
    /// As [`create_branch`](Self::create_branch), plus
    /// `InvalidBranchingTimestamp` if `branching_timestamp` lies after the
    /// origin's "now".
    pub fn create_branch_at(
        &self,
        name: &str,
        origin: &str,
        branching_timestamp: u64,
    ) -> Result<Arc<Branch>> {
        let _structure = self.lock_structure();
        let origin = self.origin_for(origin)?;
        let origin_now = origin.now();
        if branching_timestamp > origin_now {
            return Err(TemporaError::InvalidBranchingTimestamp {
                origin: origin.name().to_string(),
                requested: branching_timestamp,
                origin_now,
            });
        }
        self.create_locked(name, origin, branching_timestamp)
    }

    fn origin_for(&self, origin: &str) -> Result<Arc<Branch>> {
        self.branches
            .get(origin)
            .map(|b| b.value().clone())
            .ok_or_else(|| TemporaError::UnknownOrigin(origin.to_string()))
    }

    fn create_locked(
        &self,
        name: &str,
        origin: Arc<Branch>,
        branching_timestamp: u64,
    ) -> Result<Arc<Branch>> {
        validate_branch_name(name)?;
        if self.branches.contains_key(name) {
            return Err(TemporaError::BranchAlreadyExists(name.to_string()));
        }
        let metadata = BranchMetadata::child(name, origin.name(), branching_timestamp);
        let branch = Branch::new(
            metadata,
            Some(origin.clone()),
            self.factory.clone(),
            self.consistency,
        )?;
        let branch = self.register(branch)?;
        info!(
            target: "tempora::branch",
            branch = name,
            origin = origin.name(),
            branching_timestamp,
            "Created branch"
        );
        Ok(branch)
    }

    /// Remove a leaf branch
    ///
    /// Returns the removed branch so the caller can release what it indexed.
    ///
    /// # Errors
    ///
    /// - `MasterBranchImmutable` for master
    /// - `UnknownBranch` if `name` does not exist
    /// - `BranchHasChildren` if any branch forks from `name`
    pub fn delete_branch(&self, name: &str) -> Result<Arc<Branch>> {
        if name == MASTER_BRANCH_NAME {
            return Err(TemporaError::MasterBranchImmutable("delete_branch"));
        }
        let _structure = self.lock_structure();
        let branch = self.get_branch(name)?;
        let children = self.children_of(name);
        if !children.is_empty() {
            return Err(TemporaError::BranchHasChildren {
                branch: name.to_string(),
                children,
            });
        }
        self.metadata.remove_batch(&[name.to_string()])?;
        self.branches.remove(name);
        self.creation_order.write().retain(|n| n != name);
        info!(target: "tempora::branch", branch = name, "Deleted branch");
        Ok(branch)
    }

    /// Whether a branch named `name` exists
    pub fn exists_branch(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// Look up a branch
    pub fn get_branch(&self, name: &str) -> Result<Arc<Branch>> {
        self.branches
            .get(name)
            .map(|b| b.value().clone())
            .ok_or_else(|| TemporaError::UnknownBranch(name.to_string()))
    }

    /// Metadata from `name` up to master
    pub fn walk_to_master(&self, name: &str) -> Result<Vec<BranchMetadata>> {
        Ok(self.get_branch(name)?.chain())
    }

    /// All branch names in creation order (origins before their children)
    pub fn branch_names(&self) -> Vec<String> {
        self.creation_order.read().clone()
    }

    /// Names of the branches forking directly from `name`, in creation order
    pub fn children_of(&self, name: &str) -> Vec<String> {
        self.creation_order
            .read()
            .iter()
            .filter(|child| {
                self.branches
                    .get(child.as_str())
                    .map_or(false, |b| b.metadata().origin.as_deref() == Some(name))
            })
            .cloned()
            .collect()
    }

    /// Branch records as persisted in the metadata map, ordered by name
    pub fn stored_metadata(&self) -> Result<Vec<BranchMetadata>> {
        self.metadata
            .range(std::ops::Bound::Unbounded, std::ops::Bound::Unbounded)
            .iter()
            .map(|(_, bytes)| BranchMetadata::from_bytes(bytes))
            .collect()
    }
}

impl fmt::Debug for BranchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchManager")
            .field("branches", &self.branch_names())
            .finish()
    }
}
