//! Ordered map backend contract
//!
//! The temporal engine is backend-agnostic: all it needs is a map from
//! sortable strings to values that can answer floor/ceiling lookups and
//! ordered range scans. [`OrderedMap`] is that contract, [`MapFactory`]
//! creates named maps on demand.
//!
//! [`MemoryOrderedMap`] implements the contract with a
//! `parking_lot::RwLock<BTreeMap<String, V>>`. Batches are applied under a
//! single write lock acquisition, so no reader sees half a batch.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tempora_core::Result;

/// A sorted string-keyed map with navigation queries
///
/// All methods take `&self`; implementations provide their own interior
/// synchronization. Lookups return owned copies so no lock outlives a call.
pub trait OrderedMap<V>: Send + Sync + fmt::Debug
where
    V: Clone + Send + Sync,
{
    /// Name the map was created with
    fn name(&self) -> &str;

    /// Exact lookup
    fn get(&self, key: &str) -> Option<V>;

    /// Greatest entry with key `<= key`
    fn floor_entry(&self, key: &str) -> Option<(String, V)>;

    /// Greatest entry with key `< key`
    fn lower_entry(&self, key: &str) -> Option<(String, V)>;

    /// Smallest entry with key `>= key`
    fn ceiling_entry(&self, key: &str) -> Option<(String, V)>;

    /// Smallest entry with key `> key`
    fn higher_entry(&self, key: &str) -> Option<(String, V)>;

    /// Snapshot of the entries within the bounds, ascending
    fn range(&self, lower: Bound<&str>, upper: Bound<&str>) -> Vec<(String, V)>;

    /// Number of entries
    fn len(&self) -> usize;

    /// Whether the map holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert all entries atomically, overwriting existing keys
    fn insert_batch(&self, entries: Vec<(String, V)>) -> Result<()>;

    /// Remove all keys atomically; returns the number of keys that existed
    fn remove_batch(&self, keys: &[String]) -> Result<usize>;
}

/// Creates the maps backing data matrices
pub trait MapFactory: Send + Sync + fmt::Debug {
    /// Create a map holding value bytes (forward temporal maps, metadata)
    fn create_value_map(&self, name: &str) -> Result<Arc<dyn OrderedMap<Vec<u8>>>>;

    /// Create a map holding presence flags (inverse temporal maps)
    fn create_flag_map(&self, name: &str) -> Result<Arc<dyn OrderedMap<bool>>>;
}

/// Whether a (lower, upper) pair describes a range `BTreeMap::range` would reject
fn is_degenerate(lower: Bound<&str>, upper: Bound<&str>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// `BTreeMap`-backed ordered map behind a `parking_lot::RwLock`
pub struct MemoryOrderedMap<V> {
    name: String,
    data: RwLock<BTreeMap<String, V>>,
}

impl<V> MemoryOrderedMap<V> {
    /// Create a new empty map
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<V> fmt::Debug for MemoryOrderedMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryOrderedMap")
            .field("name", &self.name)
            .field("len", &self.data.read().len())
            .finish()
    }
}

impl<V> OrderedMap<V> for MemoryOrderedMap<V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    fn floor_entry(&self, key: &str) -> Option<(String, V)> {
        self.data
            .read()
            .range::<str, _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn lower_entry(&self, key: &str) -> Option<(String, V)> {
        self.data
            .read()
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn ceiling_entry(&self, key: &str) -> Option<(String, V)> {
        self.data
            .read()
            .range::<str, _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn higher_entry(&self, key: &str) -> Option<(String, V)> {
        self.data
            .read()
            .range::<str, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn range(&self, lower: Bound<&str>, upper: Bound<&str>) -> Vec<(String, V)> {
        if is_degenerate(lower, upper) {
            return Vec::new();
        }
        self.data
            .read()
            .range::<str, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn insert_batch(&self, entries: Vec<(String, V)>) -> Result<()> {
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, value);
        }
        Ok(())
    }

    fn remove_batch(&self, keys: &[String]) -> Result<usize> {
        let mut data = self.data.write();
        Ok(keys.iter().filter(|k| data.remove(k.as_str()).is_some()).count())
    }
}

/// Factory producing [`MemoryOrderedMap`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryMapFactory;

impl MemoryMapFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

impl MapFactory for MemoryMapFactory {
    fn create_value_map(&self, name: &str) -> Result<Arc<dyn OrderedMap<Vec<u8>>>> {
        Ok(Arc::new(MemoryOrderedMap::new(name)))
    }

    fn create_flag_map(&self, name: &str) -> Result<Arc<dyn OrderedMap<bool>>> {
        Ok(Arc::new(MemoryOrderedMap::new(name)))
    }
}
