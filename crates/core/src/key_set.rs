//! Key-set differences
//!
//! A [`KeySetModifications`] records which keys were added to and removed
//! from a keyspace relative to a base. A key is never in both sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Additions and removals against a base key set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetModifications {
    additions: BTreeSet<String>,
    removals: BTreeSet<String>,
}

impl KeySetModifications {
    /// Create an empty modification set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit sets; keys present in both count as additions
    pub fn from_sets(additions: BTreeSet<String>, mut removals: BTreeSet<String>) -> Self {
        removals.retain(|k| !additions.contains(k));
        Self {
            additions,
            removals,
        }
    }

    /// Record that `key` exists (overrides an earlier removal)
    pub fn record_addition(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.removals.remove(&key);
        self.additions.insert(key);
    }

    /// Record that `key` no longer exists (overrides an earlier addition)
    pub fn record_removal(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.additions.remove(&key);
        self.removals.insert(key);
    }

    /// Layer `newer` on top of `self`; the newer state of each key wins
    pub fn merge(&mut self, newer: KeySetModifications) {
        for key in newer.additions {
            self.record_addition(key);
        }
        for key in newer.removals {
            self.record_removal(key);
        }
    }

    /// Keys added
    pub fn additions(&self) -> &BTreeSet<String> {
        &self.additions
    }

    /// Keys removed
    pub fn removals(&self) -> &BTreeSet<String> {
        &self.removals
    }

    /// Whether there are no modifications
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Apply to `base`: add all additions, then remove all removals
    pub fn apply(&self, base: &mut BTreeSet<String>) {
        base.extend(self.additions.iter().cloned());
        for key in &self.removals {
            base.remove(key);
        }
    }

    /// Split into (additions, removals)
    pub fn into_parts(self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.additions, self.removals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_apply_adds_then_removes() {
        let mut base = set(&["a", "b"]);
        let mods = KeySetModifications::from_sets(set(&["c"]), set(&["a", "x"]));
        mods.apply(&mut base);
        assert_eq!(base, set(&["b", "c"]));
    }

    #[test]
    fn test_key_is_in_at_most_one_set() {
        let mut mods = KeySetModifications::new();
        mods.record_addition("k");
        mods.record_removal("k");
        assert!(mods.additions().is_empty());
        assert_eq!(mods.removals(), &set(&["k"]));

        mods.record_addition("k");
        assert_eq!(mods.additions(), &set(&["k"]));
        assert!(mods.removals().is_empty());
    }

    #[test]
    fn test_merge_newer_wins() {
        let mut older = KeySetModifications::from_sets(set(&["a", "b"]), set(&["c"]));
        let newer = KeySetModifications::from_sets(set(&["c"]), set(&["a"]));
        older.merge(newer);
        assert_eq!(older.additions(), &set(&["b", "c"]));
        assert_eq!(older.removals(), &set(&["a"]));
    }
}
