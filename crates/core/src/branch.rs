//! Branch identity records
//!
//! A branch is an independent timeline descending from an origin branch at a
//! fixed branching timestamp. Only `master` has no origin.
//!
//! [`BranchMetadata`] is the immutable, persisted part of a branch:
//! `{name, origin, branching_timestamp}`. The mutable "now" of a branch lives
//! in the engine.
//!
//! ## Name validation
//!
//! Branch names must:
//! - Be 1-256 characters
//! - Contain only alphanumeric, dash, underscore, dot
//! - Not start with a dash or dot

use crate::error::{Result, TemporaError};
use serde::{Deserialize, Serialize};

/// Name of the root branch
pub const MASTER_BRANCH_NAME: &str = "master";

/// Maximum length of a branch name
pub const MAX_BRANCH_NAME_LENGTH: usize = 256;

/// Validate a branch name
///
/// # Errors
///
/// Returns `InvalidBranchName` naming the first rule the name breaks.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let reject = |reason: String| TemporaError::InvalidBranchName {
        name: name.to_string(),
        reason,
    };

    let first = match name.chars().next() {
        Some(c) => c,
        None => return Err(reject("branch name cannot be empty".to_string())),
    };

    if name.len() > MAX_BRANCH_NAME_LENGTH {
        return Err(reject(format!(
            "branch name too long: {} chars (max {})",
            name.len(),
            MAX_BRANCH_NAME_LENGTH
        )));
    }

    if !first.is_ascii_alphanumeric() && first != '_' {
        return Err(reject(format!(
            "branch name cannot start with '{}' (must start with alphanumeric or underscore)",
            first
        )));
    }

    for (pos, ch) in name.chars().enumerate() {
        if !is_valid_char(ch) {
            return Err(reject(format!(
                "invalid character '{}' at position {} (only alphanumeric, dash, underscore, dot allowed)",
                ch, pos
            )));
        }
    }

    Ok(())
}

#[inline]
fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

/// Persisted identity of a branch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchMetadata {
    /// Unique branch name
    pub name: String,
    /// Name of the origin branch; `None` only for master
    pub origin: Option<String>,
    /// Timestamp on the origin at which this branch forked (0 for master)
    pub branching_timestamp: u64,
}

impl BranchMetadata {
    /// Metadata of the master branch
    pub fn master() -> Self {
        Self {
            name: MASTER_BRANCH_NAME.to_string(),
            origin: None,
            branching_timestamp: 0,
        }
    }

    /// Metadata of a child branch
    pub fn child(
        name: impl Into<String>,
        origin: impl Into<String>,
        branching_timestamp: u64,
    ) -> Self {
        Self {
            name: name.into(),
            origin: Some(origin.into()),
            branching_timestamp,
        }
    }

    /// Whether this is the master branch
    pub fn is_master(&self) -> bool {
        self.origin.is_none()
    }

    /// Serialize to the persisted record format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the persisted record format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
