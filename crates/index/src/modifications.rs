//! Index modification batches
//!
//! A batch moves documents through their lifecycle:
//!
//! ```text
//! absent --addition--> valid --termination--> terminated --deletion--> absent
//! ```
//!
//! Deletions also apply to valid documents. The backend applies a batch
//! all-or-nothing.

use crate::document::IndexDocument;

/// Make a new document known to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAddition {
    /// Document to add
    pub document: IndexDocument,
}

/// End the validity of a document at a timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentValidityTermination {
    /// Document to terminate, as currently stored
    pub document: IndexDocument,
    /// New exclusive end of validity
    pub termination_timestamp: u64,
}

/// Remove a document entirely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDeletion {
    /// Document to remove
    pub document: IndexDocument,
}

/// A batch of index changes applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexModifications {
    additions: Vec<DocumentAddition>,
    terminations: Vec<DocumentValidityTermination>,
    deletions: Vec<DocumentDeletion>,
}

impl IndexModifications {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document
    pub fn add(&mut self, document: IndexDocument) {
        self.additions.push(DocumentAddition { document });
    }

    /// Terminate a document at `termination_timestamp`
    pub fn terminate(&mut self, document: IndexDocument, termination_timestamp: u64) {
        self.terminations.push(DocumentValidityTermination {
            document,
            termination_timestamp,
        });
    }

    /// Delete a document
    pub fn delete(&mut self, document: IndexDocument) {
        self.deletions.push(DocumentDeletion { document });
    }

    /// Append every change of `other`
    pub fn extend(&mut self, other: IndexModifications) {
        self.additions.extend(other.additions);
        self.terminations.extend(other.terminations);
        self.deletions.extend(other.deletions);
    }

    /// Documents to add
    pub fn additions(&self) -> &[DocumentAddition] {
        &self.additions
    }

    /// Documents to terminate
    pub fn terminations(&self) -> &[DocumentValidityTermination] {
        &self.terminations
    }

    /// Documents to delete
    pub fn deletions(&self) -> &[DocumentDeletion] {
        &self.deletions
    }

    /// Whether the batch changes nothing
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.terminations.is_empty() && self.deletions.is_empty()
    }

    /// Total number of changes
    pub fn len(&self) -> usize {
        self.additions.len() + self.terminations.len() + self.deletions.len()
    }
}
