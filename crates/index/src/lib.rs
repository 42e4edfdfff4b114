//! Secondary index for TemporaDB
//!
//! This crate keeps queryable documents of indexed values, each valid over a
//! time interval, in step with the versioned data:
//! - IndexDocument: one indexed value of one key with its validity
//! - IndexModifications: additions, terminations and deletions applied atomically
//! - SearchSpec / IndexQuery: string conditions and their boolean combinations
//! - Indexer: value bytes → indexed strings, registered by name
//! - IndexManager: branch-aware search and commit-time maintenance

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod document;
pub mod indexer;
pub mod manager;
pub mod modifications;
pub mod search;

pub use backend::MemoryIndexBackend;
pub use document::IndexDocument;
pub use indexer::{FnIndexer, Indexer, IndexerRegistry, TokenIndexer, Utf8Indexer};
pub use manager::{BranchLocalDocuments, IndexManager};
pub use modifications::{
    DocumentAddition, DocumentDeletion, DocumentValidityTermination, IndexModifications,
};
pub use search::{IndexQuery, SearchSpec, StringCondition, TextMatchMode};
