//! Index documents
//!
//! An [`IndexDocument`] records that, on one branch, one key of one keyspace
//! produced one indexed value for one index, during `[valid_from, valid_to)`.
//! Documents are never edited in place: the backend terminates them (lowers
//! `valid_to`) or deletes them, and a document that must become valid again
//! is replaced by a fresh copy with a new id.

use serde::{Deserialize, Serialize};
use std::fmt;
use tempora_core::{Period, TIMESTAMP_MAX};
use uuid::Uuid;

/// One indexed value of one key, valid over a time interval
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Unique document id
    pub document_id: Uuid,
    /// Index that produced the value
    pub index_name: String,
    /// Branch owning the document
    pub branch: String,
    /// Keyspace of the indexed key
    pub keyspace: String,
    /// Indexed key
    pub key: String,
    /// Value as produced by the indexer
    pub indexed_value: String,
    /// Lowercase copy for case-insensitive matching, when stored
    pub indexed_value_lowercase: Option<String>,
    /// First timestamp at which the document is valid
    pub valid_from: u64,
    /// First timestamp at which the document is no longer valid
    pub valid_to: u64,
}

impl IndexDocument {
    /// Create an open-ended document with a fresh id
    pub fn new(
        index_name: impl Into<String>,
        branch: impl Into<String>,
        keyspace: impl Into<String>,
        key: impl Into<String>,
        indexed_value: impl Into<String>,
        valid_from: u64,
        store_lowercase: bool,
    ) -> Self {
        let indexed_value = indexed_value.into();
        let indexed_value_lowercase = store_lowercase.then(|| indexed_value.to_lowercase());
        Self {
            document_id: Uuid::new_v4(),
            index_name: index_name.into(),
            branch: branch.into(),
            keyspace: keyspace.into(),
            key: key.into(),
            indexed_value,
            indexed_value_lowercase,
            valid_from,
            valid_to: TIMESTAMP_MAX,
        }
    }

    /// Validity interval of this document
    pub fn period(&self) -> Period {
        Period::create_range(self.valid_from, self.valid_to).unwrap_or_else(|_| Period::empty())
    }

    /// Whether the document is valid at `timestamp`
    pub fn is_valid_at(&self, timestamp: u64) -> bool {
        self.valid_from <= timestamp && timestamp < self.valid_to
    }

    /// Whether the document has not been terminated
    pub fn is_open_ended(&self) -> bool {
        self.valid_to == TIMESTAMP_MAX
    }

    /// Lowercase form of the value, computed when no copy was stored
    pub fn lowercase_value(&self) -> std::borrow::Cow<'_, str> {
        match &self.indexed_value_lowercase {
            Some(lower) => std::borrow::Cow::Borrowed(lower.as_str()),
            None => std::borrow::Cow::Owned(self.indexed_value.to_lowercase()),
        }
    }

    /// Copy of this document owned by `branch` over `[valid_from, valid_to)`, with a fresh id
    ///
    /// The copy never starts before `not_before`, so the original stays the
    /// only owner of the interval preceding it.
    pub fn copy_to_branch(&self, branch: impl Into<String>, not_before: u64, valid_to: u64) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            branch: branch.into(),
            valid_from: self.valid_from.max(not_before),
            valid_to,
            ..self.clone()
        }
    }

    /// Open-ended copy of this document with a fresh id
    pub fn reopened(&self) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            valid_to: TIMESTAMP_MAX,
            ..self.clone()
        }
    }

    /// Same document with its validity ending at `timestamp`
    pub(crate) fn terminated_at(&self, timestamp: u64) -> Self {
        Self {
            valid_to: timestamp,
            ..self.clone()
        }
    }
}

impl fmt::Display for IndexDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}={:?} {}",
            self.index_name,
            self.branch,
            self.keyspace,
            self.key,
            self.indexed_value,
            self.period()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> IndexDocument {
        IndexDocument::new("color", "master", "cars", "car1", "Red", 5, true)
    }

    #[test]
    fn test_new_document_is_open_ended() {
        let d = doc();
        assert!(d.is_open_ended());
        assert_eq!(d.indexed_value_lowercase.as_deref(), Some("red"));
        assert_eq!(d.period(), Period::create_open_ended_range(5).unwrap());
    }

    #[test]
    fn test_validity() {
        let d = doc().terminated_at(9);
        assert!(!d.is_valid_at(4));
        assert!(d.is_valid_at(5));
        assert!(d.is_valid_at(8));
        assert!(!d.is_valid_at(9));
        assert!(!d.is_open_ended());
    }

    #[test]
    fn test_lowercase_fallback() {
        let d = IndexDocument::new("color", "master", "cars", "car1", "Red", 5, false);
        assert!(d.indexed_value_lowercase.is_none());
        assert_eq!(d.lowercase_value(), "red");
    }

    #[test]
    fn test_copies_get_fresh_ids() {
        let d = doc();
        let copy = d.copy_to_branch("feature", 3, 12);
        assert_ne!(copy.document_id, d.document_id);
        assert_eq!(copy.branch, "feature");
        assert_eq!(copy.valid_from, 5);
        assert_eq!(copy.valid_to, 12);

        let reopened = copy.reopened();
        assert_ne!(reopened.document_id, copy.document_id);
        assert!(reopened.is_open_ended());
        assert_eq!(reopened.branch, "feature");
    }

    #[test]
    fn test_copy_starts_at_branching_timestamp() {
        let copy = doc().copy_to_branch("feature", 7, TIMESTAMP_MAX);
        assert_eq!(copy.valid_from, 7);
        assert!(!copy.is_valid_at(6));
        assert!(copy.is_open_ended());
    }
}
