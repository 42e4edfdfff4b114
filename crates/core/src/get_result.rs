//! Point-in-time read results
//!
//! A [`GetResult`] is the only structured value returned by temporal reads.
//! Its `period` is the caching envelope for the value: for every timestamp in
//! the period, the same read would return the same value.

use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A key qualified by the keyspace it lives in
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedKey {
    /// Keyspace name
    pub keyspace: String,
    /// Plain key inside the keyspace
    pub key: String,
}

impl QualifiedKey {
    /// Create a qualified key
    pub fn new(keyspace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.keyspace, self.key)
    }
}

/// Result of a point-in-time read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult<T> {
    qualified_key: QualifiedKey,
    value: Option<T>,
    period: Period,
}

impl<T> GetResult<T> {
    /// A result holding a value
    pub fn with_value(qualified_key: QualifiedKey, value: T, period: Period) -> Self {
        Self {
            qualified_key,
            value: Some(value),
            period,
        }
    }

    /// A result without a value (never written, or deleted)
    pub fn without_value(qualified_key: QualifiedKey, period: Period) -> Self {
        Self {
            qualified_key,
            value: None,
            period,
        }
    }

    /// A result with an optional value
    pub fn new(qualified_key: QualifiedKey, value: Option<T>, period: Period) -> Self {
        Self {
            qualified_key,
            value,
            period,
        }
    }

    /// The key that was read
    pub fn qualified_key(&self) -> &QualifiedKey {
        &self.qualified_key
    }

    /// The value, if any
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Whether a value is present
    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }

    /// Validity period of this result
    pub fn period(&self) -> Period {
        self.period
    }

    /// Take the value out
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Replace the period, keeping key and value
    pub fn with_period(self, period: Period) -> Self {
        Self { period, ..self }
    }

    /// Map the value, keeping key and period
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GetResult<U> {
        GetResult {
            qualified_key: self.qualified_key,
            value: self.value.map(f),
            period: self.period,
        }
    }
}
