//! In-memory index document store
//!
//! Documents live in one map keyed by id, with two secondary indices over
//! document ids:
//! - by `(branch, index_name)`: for searches and branch-local listings
//! - by `(branch, keyspace, key)`: for commit maintenance of a single key
//!
//! All three maps sit behind a single `parking_lot::RwLock`, so a batch is
//! validated and applied under one write lock acquisition and readers see
//! either none or all of it.

use crate::document::IndexDocument;
use crate::modifications::IndexModifications;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tempora_core::{Result, TemporaError};
use uuid::Uuid;

type BranchIndexKey = (String, String);
type BranchKeyKey = (String, String, String);

#[derive(Debug, Default)]
struct IndexState {
    documents: FxHashMap<Uuid, IndexDocument>,
    by_branch_index: FxHashMap<BranchIndexKey, FxHashSet<Uuid>>,
    by_branch_key: FxHashMap<BranchKeyKey, FxHashSet<Uuid>>,
}

impl IndexState {
    fn insert(&mut self, document: IndexDocument) {
        let id = document.document_id;
        self.by_branch_index
            .entry((document.branch.clone(), document.index_name.clone()))
            .or_default()
            .insert(id);
        self.by_branch_key
            .entry((
                document.branch.clone(),
                document.keyspace.clone(),
                document.key.clone(),
            ))
            .or_default()
            .insert(id);
        self.documents.insert(id, document);
    }

    fn remove(&mut self, id: &Uuid) {
        let Some(document) = self.documents.remove(id) else {
            return;
        };
        let index_key = (document.branch.clone(), document.index_name.clone());
        if let Some(ids) = self.by_branch_index.get_mut(&index_key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_branch_index.remove(&index_key);
            }
        }
        let key_key = (document.branch, document.keyspace, document.key);
        if let Some(ids) = self.by_branch_key.get_mut(&key_key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_branch_key.remove(&key_key);
            }
        }
    }

    fn collect(&self, ids: Option<&FxHashSet<Uuid>>) -> Vec<IndexDocument> {
        let mut out: Vec<IndexDocument> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.documents.get(id).cloned())
            .collect();
        out.sort_by(|a, b| {
            (a.valid_from, &a.key, &a.indexed_value).cmp(&(b.valid_from, &b.key, &b.indexed_value))
        });
        out
    }
}

/// Validity tuple: at most one document per tuple may be valid at any timestamp
type ValueTuple = (String, String, String, String, String);

fn value_tuple(document: &IndexDocument) -> ValueTuple {
    (
        document.branch.clone(),
        document.index_name.clone(),
        document.keyspace.clone(),
        document.key.clone(),
        document.indexed_value.clone(),
    )
}

/// Thread-safe in-memory store of index documents
#[derive(Debug, Default)]
pub struct MemoryIndexBackend {
    state: RwLock<IndexState>,
}

impl MemoryIndexBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Whether no document is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored document with the given id
    pub fn get(&self, id: &Uuid) -> Option<IndexDocument> {
        self.state.read().documents.get(id).cloned()
    }

    /// All documents of one index on one branch, every keyspace
    pub fn documents_of(&self, branch: &str, index_name: &str) -> Vec<IndexDocument> {
        let state = self.state.read();
        state.collect(
            state
                .by_branch_index
                .get(&(branch.to_string(), index_name.to_string())),
        )
    }

    /// All documents of one key on one branch, every index
    pub fn documents_for_key(&self, branch: &str, keyspace: &str, key: &str) -> Vec<IndexDocument> {
        let state = self.state.read();
        state.collect(state.by_branch_key.get(&(
            branch.to_string(),
            keyspace.to_string(),
            key.to_string(),
        )))
    }

    /// All documents owned by `branch`
    pub fn documents_of_branch(&self, branch: &str) -> Vec<IndexDocument> {
        let state = self.state.read();
        let ids: FxHashSet<Uuid> = state
            .by_branch_index
            .iter()
            .filter(|((b, _), _)| b == branch)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        state.collect(Some(&ids))
    }

    /// All documents of one index, every branch
    pub fn documents_of_index(&self, index_name: &str) -> Vec<IndexDocument> {
        let state = self.state.read();
        let ids: FxHashSet<Uuid> = state
            .by_branch_index
            .iter()
            .filter(|((_, i), _)| i == index_name)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        state.collect(Some(&ids))
    }

    /// Apply a batch all-or-nothing
    ///
    /// # Errors
    ///
    /// Nothing is changed when any of these holds:
    /// - a document id appears more than once in the batch (`OverlappingModifications`)
    /// - an addition reuses a stored id (`DuplicateDocument`) or has an empty validity (`InvalidPeriod`)
    /// - a termination or deletion names an unknown document (`UnknownDocument`)
    /// - a termination is not inside `(valid_from, valid_to]` (`InvalidTermination`)
    /// - the result would hold two overlapping documents for the same value (`IndexConflict`)
    pub fn apply(&self, modifications: &IndexModifications) -> Result<()> {
        if modifications.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();

        let mut seen: FxHashSet<Uuid> = FxHashSet::default();
        let ids = modifications
            .additions()
            .iter()
            .map(|a| a.document.document_id)
            .chain(modifications.terminations().iter().map(|t| t.document.document_id))
            .chain(modifications.deletions().iter().map(|d| d.document.document_id));
        for id in ids {
            if !seen.insert(id) {
                return Err(TemporaError::OverlappingModifications(id));
            }
        }

        // Overlay of the post-batch state for every touched document
        let mut overlay: BTreeMap<Uuid, Option<IndexDocument>> = BTreeMap::new();
        for addition in modifications.additions() {
            let document = &addition.document;
            if state.documents.contains_key(&document.document_id) {
                return Err(TemporaError::DuplicateDocument(document.document_id));
            }
            if document.valid_from >= document.valid_to {
                return Err(TemporaError::InvalidPeriod {
                    lower: document.valid_from,
                    upper: document.valid_to,
                    requested: document.valid_to,
                    reason: "index document validity must not be empty",
                });
            }
            overlay.insert(document.document_id, Some(document.clone()));
        }
        for termination in modifications.terminations() {
            let id = termination.document.document_id;
            let stored = state
                .documents
                .get(&id)
                .ok_or(TemporaError::UnknownDocument(id))?;
            let ts = termination.termination_timestamp;
            if ts <= stored.valid_from || ts > stored.valid_to {
                return Err(TemporaError::InvalidTermination {
                    document_id: id,
                    valid_from: stored.valid_from,
                    termination: ts,
                });
            }
            overlay.insert(id, Some(stored.terminated_at(ts)));
        }
        for deletion in modifications.deletions() {
            let id = deletion.document.document_id;
            if !state.documents.contains_key(&id) {
                return Err(TemporaError::UnknownDocument(id));
            }
            overlay.insert(id, None);
        }

        Self::check_conflicts(&state, &overlay)?;

        for (id, document) in overlay {
            state.remove(&id);
            if let Some(document) = document {
                state.insert(document);
            }
        }
        Ok(())
    }

    /// Reject overlapping validity among documents of the same value tuple
    fn check_conflicts(
        state: &IndexState,
        overlay: &BTreeMap<Uuid, Option<IndexDocument>>,
    ) -> Result<()> {
        let touched: FxHashSet<ValueTuple> = overlay.values().flatten().map(value_tuple).collect();
        for tuple in touched {
            let (branch, index_name, keyspace, key, value) = &tuple;
            let stored_ids = state
                .by_branch_key
                .get(&(branch.clone(), keyspace.clone(), key.clone()));
            let mut candidates: Vec<&IndexDocument> = stored_ids
                .into_iter()
                .flatten()
                .filter(|id| !overlay.contains_key(*id))
                .filter_map(|id| state.documents.get(id))
                .chain(overlay.values().flatten())
                .filter(|d| value_tuple(d) == tuple)
                .collect();
            candidates.sort_by_key(|d| d.valid_from);
            for pair in candidates.windows(2) {
                if pair[0].valid_to > pair[1].valid_from {
                    return Err(TemporaError::IndexConflict {
                        branch: branch.clone(),
                        index: index_name.clone(),
                        keyspace: keyspace.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
