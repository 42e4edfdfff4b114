//! Core types for TemporaDB
//!
//! This crate defines the foundational types used throughout the system:
//! - Period: Half-open validity interval over commit timestamps
//! - TemporalKey / InverseTemporalKey: Order-preserving (key, timestamp) encodings
//! - GetResult: Point-in-time read result with its validity period
//! - KeySetModifications: Key additions/removals relative to a base set
//! - BranchMetadata: Persisted branch identity
//! - ConsistencyMode: Read-path anomaly handling
//! - TemporaError: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branch;
pub mod consistency;
pub mod error;
pub mod get_result;
pub mod key_set;
pub mod period;
pub mod temporal_key;

pub use branch::{validate_branch_name, BranchMetadata, MASTER_BRANCH_NAME, MAX_BRANCH_NAME_LENGTH};
pub use consistency::ConsistencyMode;
pub use error::{Result, TemporaError};
pub use get_result::{GetResult, QualifiedKey};
pub use key_set::KeySetModifications;
pub use period::{Period, TIMESTAMP_MAX};
pub use temporal_key::{InverseTemporalKey, TemporalKey};
