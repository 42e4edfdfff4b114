//! Error types for TemporaDB
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every precondition failure carries the operand values that triggered it,
//! so a failing call can be reproduced from the error message alone.

use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for TemporaDB operations
pub type Result<T> = std::result::Result<T, TemporaError>;

/// Error types for the temporal engine
#[derive(Debug, Error)]
pub enum TemporaError {
    /// An encoded temporal key could not be decoded
    #[error("Malformed temporal key {input:?}: {reason}")]
    MalformedKey {
        /// The offending encoded string
        input: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// A period operation would produce an empty, inverted or grown period
    #[error("Invalid period [{lower};{upper}): cannot set upper bound to {requested}: {reason}")]
    InvalidPeriod {
        /// Lower bound of the period the operation was applied to
        lower: u64,
        /// Upper bound of the period the operation was applied to
        upper: u64,
        /// Requested bound
        requested: u64,
        /// Which rule was violated
        reason: &'static str,
    },

    /// Terminating a document at or before its own validity start
    #[error("Cannot terminate index document {document_id} valid from {valid_from} at {termination}")]
    InvalidTermination {
        /// Document being terminated
        document_id: Uuid,
        /// Start of the document's validity
        valid_from: u64,
        /// Requested termination timestamp
        termination: u64,
    },

    /// A modification refers to a document the backend does not hold
    #[error("Unknown index document: {0}")]
    UnknownDocument(Uuid),

    /// An addition reuses an existing document id
    #[error("Index document {0} already exists")]
    DuplicateDocument(Uuid),

    /// An addition would create a second currently valid document for the same tuple
    #[error(
        "Index '{index}' already holds a valid document for value {value:?} of key \
         '{keyspace}/{key}' on branch '{branch}'"
    )]
    IndexConflict {
        /// Branch name
        branch: String,
        /// Index name
        index: String,
        /// Keyspace
        keyspace: String,
        /// Key
        key: String,
        /// Indexed value
        value: String,
    },

    /// The same document appears in more than one set of a modification batch
    #[error("Index document {0} appears in more than one modification set")]
    OverlappingModifications(Uuid),

    /// Referenced index is not registered
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// Index name already registered
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Branch name already taken
    #[error("Branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// Origin branch for a new branch does not exist
    #[error("Unknown origin branch: {0}")]
    UnknownOrigin(String),

    /// Referenced branch does not exist
    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    /// Branch name failed validation
    #[error("Invalid branch name {name:?}: {reason}")]
    InvalidBranchName {
        /// Rejected name
        name: String,
        /// Validation failure
        reason: String,
    },

    /// Requested branching timestamp lies after the origin's "now"
    #[error("Cannot branch from '{origin}' at {requested}: origin is only at {origin_now}")]
    InvalidBranchingTimestamp {
        /// Origin branch name
        origin: String,
        /// Requested branching timestamp
        requested: u64,
        /// Origin's current "now"
        origin_now: u64,
    },

    /// Operation is not permitted on the master branch
    #[error("Operation '{0}' is not permitted on the master branch")]
    MasterBranchImmutable(&'static str),

    /// Branch still has child branches
    #[error("Branch '{branch}' still has child branches: {children:?}")]
    BranchHasChildren {
        /// Branch name
        branch: String,
        /// Names of the children
        children: Vec<String>,
    },

    /// Commit timestamp does not advance the branch's "now"
    #[error("Commit on branch '{branch}' at {timestamp} does not advance now ({now})")]
    NonMonotonicCommit {
        /// Branch name
        branch: String,
        /// Requested commit timestamp
        timestamp: u64,
        /// Current "now" of the branch
        now: u64,
    },

    /// Rollback target is not reachable
    #[error("Cannot roll back branch '{branch}' to {timestamp}: {reason}")]
    InvalidRollback {
        /// Branch name
        branch: String,
        /// Requested rollback target
        timestamp: u64,
        /// Why the target is rejected
        reason: String,
    },

    /// Rollover could not complete; the branch keeps its previous chunks
    #[error("Rollover of branch '{branch}' at {now} failed: {reason}")]
    RolloverFailed {
        /// Branch name
        branch: String,
        /// The branch's "now" at rollover time
        now: u64,
        /// Cause of the failure
        reason: String,
    },

    /// Stored data violates an internal invariant
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<bincode::Error> for TemporaError {
    fn from(e: bincode::Error) -> Self {
        TemporaError::Serialization(e.to_string())
    }
}

impl TemporaError {
    /// Whether the error rejects a caller-supplied precondition
    /// (as opposed to a backend or data failure)
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            TemporaError::Corruption(_)
                | TemporaError::Storage(_)
                | TemporaError::Serialization(_)
                | TemporaError::Io(_)
                | TemporaError::RolloverFailed { .. }
        )
    }
}
