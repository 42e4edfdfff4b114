//! Storage layer for TemporaDB
//!
//! This crate implements the temporal data matrix on top of an abstract
//! ordered map:
//! - OrderedMap / MapFactory: backend contract (floor/ceiling/range lookups)
//! - MemoryOrderedMap: BTreeMap-based backend with RwLock
//! - DataMatrix: per-keyspace forward + inverse temporal maps
//! - History / ModificationScan: lazy, restartable descending scans
//!
//! # Concurrency
//!
//! Writes only add entries at fresh timestamps, so readers never block on
//! writers beyond the duration of a single map operation. Rollback is the
//! one destructive operation and runs only during recovery.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod matrix;
pub mod ordered_map;
pub mod scan;

pub use matrix::{assemble_get_result, CommitContents, DataMatrix, FloorEntry};
pub use ordered_map::{MapFactory, MemoryMapFactory, MemoryOrderedMap, OrderedMap};
pub use scan::{History, HistoryIter, ModificationIter, ModificationScan};
