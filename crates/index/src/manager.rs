//! Branch-aware index maintenance and search
//!
//! The manager owns the document store and the indexer registry. It never
//! reads stored data itself: callers hand it the contents of a commit and
//! the branch chain (`branch → origin → … → master`) the commit belongs to.
//!
//! # Shadowing
//!
//! A branch sees its own documents plus its ancestors' documents at the
//! timestamp it forked from them. For a `(keyspace, key, index)` tuple, any
//! own document with `valid_from <= T` hides every ancestor document of the
//! same tuple when searching at `T`. The first commit of a key on a branch
//! therefore copies the inherited documents into the branch, so the branch
//! keeps seeing the values it inherited until it changes them. Copies start
//! at the branching timestamp: before it, the ancestors still answer.

use crate::backend::MemoryIndexBackend;
use crate::document::IndexDocument;
use crate::indexer::{Indexer, IndexerRegistry};
use crate::modifications::IndexModifications;
use crate::search::SearchSpec;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tempora_core::{BranchMetadata, Result, TemporaError, TIMESTAMP_MAX};
use tracing::{debug, info};

/// Index documents grouped by index name, then by indexed value
pub type BranchLocalDocuments = BTreeMap<String, BTreeMap<String, Vec<IndexDocument>>>;

/// Secondary index engine
#[derive(Debug, Default)]
pub struct IndexManager {
    backend: MemoryIndexBackend,
    indexers: IndexerRegistry,
    store_lowercase: bool,
}

impl IndexManager {
    /// Create a manager; `store_lowercase` keeps lowercase copies of indexed values
    pub fn new(store_lowercase: bool) -> Self {
        Self {
            backend: MemoryIndexBackend::new(),
            indexers: IndexerRegistry::new(),
            store_lowercase,
        }
    }

    /// The underlying document store
    pub fn backend(&self) -> &MemoryIndexBackend {
        &self.backend
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Register an index without backfilling it
    pub fn register_index(&self, name: &str, indexer: Arc<dyn Indexer>) -> Result<()> {
        self.indexers.register(name, indexer)?;
        info!(index = %name, "Registered index");
        Ok(())
    }

    /// Forget an index; its documents are left to the caller
    pub fn unregister_index(&self, name: &str) -> Result<()> {
        self.indexers.unregister(name)?;
        info!(index = %name, "Unregistered index");
        Ok(())
    }

    /// Whether an index is registered under `name`
    pub fn contains_index(&self, name: &str) -> bool {
        self.indexers.contains(name)
    }

    /// Registered index names, sorted
    pub fn index_names(&self) -> Vec<String> {
        self.indexers.names()
    }

    fn require_index(&self, name: &str) -> Result<Arc<dyn Indexer>> {
        self.indexers
            .get(name)
            .ok_or_else(|| TemporaError::UnknownIndex(name.to_string()))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Documents matching `spec` visible on `chain[0]` at `timestamp`
    ///
    /// `chain` runs from the queried branch to master.
    pub fn get_matching_documents(
        &self,
        timestamp: u64,
        chain: &[BranchMetadata],
        keyspace: &str,
        spec: &SearchSpec,
    ) -> Result<Vec<IndexDocument>> {
        self.require_index(&spec.index_name)?;
        Ok(self.visible_documents(timestamp, chain, keyspace, &spec.index_name, None, |d| {
            spec.matches(d)
        }))
    }

    /// Keys with a document matching `spec` visible on `chain[0]` at `timestamp`
    pub fn matching_keys(
        &self,
        timestamp: u64,
        chain: &[BranchMetadata],
        keyspace: &str,
        spec: &SearchSpec,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .get_matching_documents(timestamp, chain, keyspace, spec)?
            .into_iter()
            .map(|d| d.key)
            .collect())
    }

    /// Currently valid documents owned by `branch`, without inheritance
    pub fn get_matching_branch_local_documents(&self, branch: &str) -> BranchLocalDocuments {
        let mut grouped = BranchLocalDocuments::new();
        for document in self.backend.documents_of_branch(branch) {
            if !document.is_open_ended() {
                continue;
            }
            grouped
                .entry(document.index_name.clone())
                .or_default()
                .entry(document.indexed_value.clone())
                .or_default()
                .push(document);
        }
        grouped
    }

    fn visible_documents<P>(
        &self,
        timestamp: u64,
        chain: &[BranchMetadata],
        keyspace: &str,
        index_name: &str,
        key: Option<&str>,
        predicate: P,
    ) -> Vec<IndexDocument>
    where
        P: Fn(&IndexDocument) -> bool,
    {
        let mut out = Vec::new();
        let mut shadowed: HashSet<String> = HashSet::new();
        let mut at = timestamp;
        for branch in chain {
            let own: Vec<IndexDocument> = match key {
                Some(key) => self
                    .backend
                    .documents_for_key(&branch.name, keyspace, key)
                    .into_iter()
                    .filter(|d| d.index_name == index_name)
                    .collect(),
                None => self
                    .backend
                    .documents_of(&branch.name, index_name)
                    .into_iter()
                    .filter(|d| d.keyspace == keyspace)
                    .collect(),
            };
            let mut claimed = Vec::new();
            for document in own {
                if shadowed.contains(&document.key) {
                    continue;
                }
                if document.valid_from <= at {
                    claimed.push(document.key.clone());
                }
                if document.is_valid_at(at) && predicate(&document) {
                    out.push(document);
                }
            }
            shadowed.extend(claimed);
            at = at.min(branch.branching_timestamp);
        }
        out
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Apply a batch all-or-nothing
    pub fn apply(&self, modifications: &IndexModifications) -> Result<()> {
        if modifications.is_empty() {
            return Ok(());
        }
        self.backend.apply(modifications)?;
        debug!(
            additions = modifications.additions().len(),
            terminations = modifications.terminations().len(),
            deletions = modifications.deletions().len(),
            "Applied index modifications"
        );
        Ok(())
    }

    /// Changes every registered index needs for a commit on `chain[0]`
    ///
    /// `contents` maps each written key to its new value (`None` deletes).
    pub fn compute_commit_modifications(
        &self,
        chain: &[BranchMetadata],
        timestamp: u64,
        keyspace: &str,
        contents: &BTreeMap<String, Option<Vec<u8>>>,
    ) -> Result<IndexModifications> {
        let indexers = self.indexers.entries();
        self.compute_modifications(&indexers, chain, timestamp, keyspace, contents)
    }

    /// Changes one index needs to catch up with a past commit on `chain[0]`
    pub fn compute_backfill_modifications(
        &self,
        index_name: &str,
        chain: &[BranchMetadata],
        timestamp: u64,
        keyspace: &str,
        contents: &BTreeMap<String, Option<Vec<u8>>>,
    ) -> Result<IndexModifications> {
        let indexer = self.require_index(index_name)?;
        let indexers = vec![(index_name.to_string(), indexer)];
        self.compute_modifications(&indexers, chain, timestamp, keyspace, contents)
    }

    fn compute_modifications(
        &self,
        indexers: &[(String, Arc<dyn Indexer>)],
        chain: &[BranchMetadata],
        timestamp: u64,
        keyspace: &str,
        contents: &BTreeMap<String, Option<Vec<u8>>>,
    ) -> Result<IndexModifications> {
        let mut modifications = IndexModifications::new();
        if indexers.is_empty() {
            return Ok(modifications);
        }
        let (branch, ancestors) = chain
            .split_first()
            .ok_or_else(|| TemporaError::Corruption("empty branch chain".to_string()))?;
        let inherited_at = timestamp.min(branch.branching_timestamp);

        for (key, value) in contents {
            let own_documents = self.backend.documents_for_key(&branch.name, keyspace, key);
            let bytes = value.as_deref().filter(|v| !v.is_empty());

            for (index_name, indexer) in indexers {
                let new_values = bytes.map(|v| indexer.index_values(v)).unwrap_or_default();
                let own: Vec<&IndexDocument> = own_documents
                    .iter()
                    .filter(|d| &d.index_name == index_name)
                    .collect();

                let mut present = BTreeSet::new();
                if own.is_empty() {
                    let inherited = self.visible_documents(
                        inherited_at,
                        ancestors,
                        keyspace,
                        index_name,
                        Some(key.as_str()),
                        |_| true,
                    );
                    for document in inherited {
                        let valid_to = if new_values.contains(&document.indexed_value) {
                            TIMESTAMP_MAX
                        } else {
                            timestamp
                        };
                        present.insert(document.indexed_value.clone());
                        modifications.add(document.copy_to_branch(
                            &branch.name,
                            branch.branching_timestamp,
                            valid_to,
                        ));
                    }
                } else {
                    for document in own.into_iter().filter(|d| d.is_open_ended()) {
                        if new_values.contains(&document.indexed_value) {
                            present.insert(document.indexed_value.clone());
                        } else {
                            modifications.terminate(document.clone(), timestamp);
                        }
                    }
                }

                for value in new_values.difference(&present) {
                    modifications.add(IndexDocument::new(
                        index_name.as_str(),
                        branch.name.as_str(),
                        keyspace,
                        key.as_str(),
                        value.as_str(),
                        timestamp,
                        self.store_lowercase,
                    ));
                }
            }
        }
        Ok(modifications)
    }

    /// Changes that return `branch`'s documents to their state at `timestamp`
    ///
    /// Documents created after the bound are deleted. Documents terminated
    /// after the bound are replaced by open-ended copies.
    pub fn rollback_modifications(&self, branch: &str, timestamp: u64) -> IndexModifications {
        let mut modifications = IndexModifications::new();
        for document in self.backend.documents_of_branch(branch) {
            if document.valid_from > timestamp {
                modifications.delete(document);
            } else if !document.is_open_ended() && document.valid_to > timestamp {
                modifications.add(document.reopened());
                modifications.delete(document);
            }
        }
        modifications
    }

    /// Deletion of every document of `index_name`, all branches
    pub fn drop_index_modifications(&self, index_name: &str) -> IndexModifications {
        let mut modifications = IndexModifications::new();
        for document in self.backend.documents_of_index(index_name) {
            modifications.delete(document);
        }
        modifications
    }

    /// Deletion of every document owned by `branch`
    pub fn branch_deletion_modifications(&self, branch: &str) -> IndexModifications {
        let mut modifications = IndexModifications::new();
        for document in self.backend.documents_of_branch(branch) {
            modifications.delete(document);
        }
        modifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Utf8Indexer;

    fn manager() -> IndexManager {
        let manager = IndexManager::new(true);
        manager.register_index("color", Arc::new(Utf8Indexer)).unwrap();
        manager
    }

    fn contents(key: &str, value: Option<&str>) -> BTreeMap<String, Option<Vec<u8>>> {
        BTreeMap::from([(key.to_string(), value.map(|v| v.as_bytes().to_vec()))])
    }

    fn commit(manager: &IndexManager, chain: &[BranchMetadata], ts: u64, key: &str, value: Option<&str>) {
        let mods = manager
            .compute_commit_modifications(chain, ts, "cars", &contents(key, value))
            .unwrap();
        manager.apply(&mods).unwrap();
    }

    fn keys_at(manager: &IndexManager, chain: &[BranchMetadata], ts: u64, value: &str) -> Vec<String> {
        manager
            .matching_keys(ts, chain, "cars", &SearchSpec::equals("color", value))
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_value_change_terminates_document() {
        let manager = manager();
        let master = [BranchMetadata::master()];
        commit(&manager, &master, 5, "car1", Some("red"));
        commit(&manager, &master, 9, "car1", Some("blue"));

        assert_eq!(keys_at(&manager, &master, 7, "red"), vec!["car1"]);
        assert!(keys_at(&manager, &master, 9, "red").is_empty());
        assert_eq!(keys_at(&manager, &master, 9, "blue"), vec!["car1"]);
        assert!(keys_at(&manager, &master, 4, "red").is_empty());
    }

    #[test]
    fn test_unchanged_value_keeps_document() {
        let manager = manager();
        let master = [BranchMetadata::master()];
        commit(&manager, &master, 5, "car1", Some("red"));
        commit(&manager, &master, 9, "car1", Some("red"));
        let docs = manager.backend().documents_of("master", "color");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].valid_from, 5);
        assert!(docs[0].is_open_ended());
    }

    #[test]
    fn test_deletion_terminates_document() {
        let manager = manager();
        let master = [BranchMetadata::master()];
        commit(&manager, &master, 5, "car1", Some("red"));
        commit(&manager, &master, 8, "car1", None);
        assert!(keys_at(&manager, &master, 8, "red").is_empty());
        assert_eq!(keys_at(&manager, &master, 6, "red"), vec!["car1"]);
    }

    #[test]
    fn test_branch_shadows_origin() {
        let manager = manager();
        let master = BranchMetadata::master();
        let feature = BranchMetadata::child("feature", "master", 10);
        let master_chain = [master.clone()];
        let feature_chain = [feature, master];

        commit(&manager, &master_chain, 5, "car1", Some("red"));
        commit(&manager, &master_chain, 5, "car2", Some("red"));
        // Origin changes after the fork stay invisible to the branch
        commit(&manager, &master_chain, 12, "car2", Some("green"));

        assert_eq!(keys_at(&manager, &feature_chain, 15, "red"), vec!["car1", "car2"]);

        commit(&manager, &feature_chain, 14, "car1", Some("blue"));
        assert_eq!(keys_at(&manager, &feature_chain, 13, "red"), vec!["car1", "car2"]);
        assert_eq!(keys_at(&manager, &feature_chain, 14, "red"), vec!["car2"]);
        assert_eq!(keys_at(&manager, &feature_chain, 14, "blue"), vec!["car1"]);
        // Master is untouched
        assert_eq!(keys_at(&manager, &master_chain, 14, "red"), vec!["car1"]);
        assert!(keys_at(&manager, &master_chain, 14, "blue").is_empty());
    }

    #[test]
    fn test_branch_local_documents() {
        let manager = manager();
        let master = BranchMetadata::master();
        let feature = BranchMetadata::child("feature", "master", 10);
        commit(&manager, &[master.clone()], 5, "car1", Some("red"));
        commit(&manager, &[feature.clone(), master], 12, "car1", Some("blue"));

        let local = manager.get_matching_branch_local_documents("feature");
        let colors = &local["color"];
        assert_eq!(colors.keys().collect::<Vec<_>>(), vec!["blue"]);
        assert!(manager.get_matching_branch_local_documents("other").is_empty());
    }

    #[test]
    fn test_rollback_modifications() {
        let manager = manager();
        let master = [BranchMetadata::master()];
        commit(&manager, &master, 5, "car1", Some("red"));
        commit(&manager, &master, 9, "car1", Some("blue"));

        let mods = manager.rollback_modifications("master", 7);
        manager.apply(&mods).unwrap();

        assert_eq!(keys_at(&manager, &master, 20, "red"), vec!["car1"]);
        assert!(keys_at(&manager, &master, 20, "blue").is_empty());
        assert_eq!(manager.backend().len(), 1);
    }

    #[test]
    fn test_unknown_index() {
        let manager = manager();
        let result = manager.get_matching_documents(
            1,
            &[BranchMetadata::master()],
            "cars",
            &SearchSpec::equals("missing", "x"),
        );
        assert!(matches!(result, Err(TemporaError::UnknownIndex(_))));
    }

    #[test]
    fn test_drop_index_modifications() {
        let manager = manager();
        let master = [BranchMetadata::master()];
        commit(&manager, &master, 5, "car1", Some("red"));
        commit(&manager, &master, 6, "car2", Some("blue"));
        manager
            .apply(&manager.drop_index_modifications("color"))
            .unwrap();
        assert!(manager.backend().is_empty());
    }
}
