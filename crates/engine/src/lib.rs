//! Temporal database engine
//!
//! This crate orchestrates the lower layers:
//! - TemporalDatabase: commits, point-in-time reads, rollback and indices
//! - Branches: forks of the timeline with read-through to their origin
//! - Chunks: per-branch data split into sealed periods by rollover
//! - EngineConfig: settings loaded from `tempora.toml`
//!
//! The engine is the only component that knows about:
//! - Branch visibility rules
//! - Keeping data and secondary indices in step on commit and rollback
//! - Composing chunks into a single timeline

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branch;
pub mod chunk;
pub mod database;

pub use branch::{Branch, BranchManager, BRANCH_METADATA_MAP_NAME};
pub use chunk::{Chunk, ChunkSet};
pub use database::{CommitBatch, EngineConfig, TemporalDatabase, CONFIG_FILE_NAME};

pub use tempora_core::{
    BranchMetadata, ConsistencyMode, GetResult, KeySetModifications, Period, QualifiedKey, Result,
    TemporaError, MASTER_BRANCH_NAME, TIMESTAMP_MAX,
};
pub use tempora_index::{
    FnIndexer, IndexDocument, IndexQuery, Indexer, SearchSpec, StringCondition, TextMatchMode,
    TokenIndexer, Utf8Indexer,
};
pub use tempora_storage::{
    CommitContents, History, MapFactory, MemoryMapFactory, ModificationScan, OrderedMap,
};
