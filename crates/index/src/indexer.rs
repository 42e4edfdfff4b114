//! Indexers and the indexer registry
//!
//! An indexer turns stored value bytes into the set of strings an index
//! records for them. Indexers are registered by name in an
//! [`IndexerRegistry`]; nothing is discovered implicitly.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tempora_core::{Result, TemporaError};

/// Extracts indexed values from stored bytes
pub trait Indexer: Send + Sync + fmt::Debug {
    /// Values to index for `value`; an empty set indexes nothing
    fn index_values(&self, value: &[u8]) -> BTreeSet<String>;
}

/// Indexes the whole value as one UTF-8 string
///
/// Values that are not valid UTF-8 are not indexed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Indexer;

impl Indexer for Utf8Indexer {
    fn index_values(&self, value: &[u8]) -> BTreeSet<String> {
        match std::str::from_utf8(value) {
            Ok(s) if !s.is_empty() => BTreeSet::from([s.to_string()]),
            _ => BTreeSet::new(),
        }
    }
}

/// Indexes each distinct word of a UTF-8 value
///
/// - Lowercase
/// - Split on non-alphanumeric characters
/// - Filter tokens shorter than 2 characters
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenIndexer;

impl Indexer for TokenIndexer {
    fn index_values(&self, value: &[u8]) -> BTreeSet<String> {
        String::from_utf8_lossy(value)
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(String::from)
            .collect()
    }
}

/// Adapts a closure into an [`Indexer`]
pub struct FnIndexer<F> {
    name: String,
    f: F,
}

impl<F> FnIndexer<F>
where
    F: Fn(&[u8]) -> BTreeSet<String> + Send + Sync,
{
    /// Wrap `f`; `name` only shows up in debug output
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnIndexer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnIndexer").field("name", &self.name).finish()
    }
}

impl<F> Indexer for FnIndexer<F>
where
    F: Fn(&[u8]) -> BTreeSet<String> + Send + Sync,
{
    fn index_values(&self, value: &[u8]) -> BTreeSet<String> {
        (self.f)(value)
    }
}

/// Named indexers, one per index
#[derive(Debug, Default)]
pub struct IndexerRegistry {
    indexers: RwLock<BTreeMap<String, Arc<dyn Indexer>>>,
}

impl IndexerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `indexer` under `name`
    ///
    /// # Errors
    ///
    /// Returns `IndexAlreadyExists` if the name is taken.
    pub fn register(&self, name: &str, indexer: Arc<dyn Indexer>) -> Result<()> {
        let mut indexers = self.indexers.write();
        if indexers.contains_key(name) {
            return Err(TemporaError::IndexAlreadyExists(name.to_string()));
        }
        indexers.insert(name.to_string(), indexer);
        Ok(())
    }

    /// Remove the indexer registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` if nothing is registered under the name.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn Indexer>> {
        self.indexers
            .write()
            .remove(name)
            .ok_or_else(|| TemporaError::UnknownIndex(name.to_string()))
    }

    /// Indexer registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn Indexer>> {
        self.indexers.read().get(name).cloned()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.indexers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.indexers.read().keys().cloned().collect()
    }

    /// Snapshot of every registration, sorted by name
    pub fn entries(&self) -> Vec<(String, Arc<dyn Indexer>)> {
        self.indexers
            .read()
            .iter()
            .map(|(name, indexer)| (name.clone(), Arc::clone(indexer)))
            .collect()
    }
}
