//! Order-preserving string encodings of (key, timestamp) pairs
//!
//! The storage backend only knows sorted string keys, so every temporal
//! coordinate is flattened into a single string whose lexicographic order
//! matches the logical order of the pair:
//!
//! - [`TemporalKey`]: plain key first, then timestamp. All versions of one
//!   key are contiguous and ascend in time.
//! - [`InverseTemporalKey`]: timestamp first, then plain key. All changes of
//!   one commit are contiguous and commits ascend in time.
//!
//! ## Format
//!
//! ```text
//! TemporalKey         = escaped(key) TERMINATOR hex16(timestamp)
//! InverseTemporalKey  = hex16(timestamp) escaped(key) TERMINATOR
//! escaped(key)        = key with every '\0' replaced by "\0\u{2}"
//! TERMINATOR          = "\0\u{1}"
//! hex16(t)            = 16 lowercase hex digits, zero padded
//! ```
//!
//! The terminator sorts below every escaped character, which makes the key
//! portion prefix-free and keeps `"a" < "a\0" < "ab"`. The empty key encodes to
//! the bare terminator, the smallest possible key at a given timestamp.

use crate::error::{Result, TemporaError};
use serde::{Deserialize, Serialize};
use std::fmt;

const ESCAPE: char = '\0';
const TERMINATOR_MARK: char = '\u{1}';
const LITERAL_NUL_MARK: char = '\u{2}';
const TIMESTAMP_WIDTH: usize = 16;

fn push_escaped_key(out: &mut String, key: &str) {
    for ch in key.chars() {
        out.push(ch);
        if ch == ESCAPE {
            out.push(LITERAL_NUL_MARK);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR_MARK);
}

fn push_timestamp(out: &mut String, timestamp: u64) {
    use std::fmt::Write;
    // Writing into a String cannot fail
    let _ = write!(out, "{:016x}", timestamp);
}

/// Parse an escaped key at the start of `input`; returns the key and the rest
fn split_escaped_key<'a>(original: &str, input: &'a str) -> Result<(String, &'a str)> {
    let mut key = String::with_capacity(input.len());
    let mut chars = input.char_indices();
    while let Some((_, ch)) = chars.next() {
        if ch != ESCAPE {
            key.push(ch);
            continue;
        }
        match chars.next() {
            Some((idx, TERMINATOR_MARK)) => {
                let rest = &input[idx + TERMINATOR_MARK.len_utf8()..];
                return Ok((key, rest));
            }
            Some((_, LITERAL_NUL_MARK)) => key.push(ESCAPE),
            _ => {
                return Err(TemporaError::MalformedKey {
                    input: original.to_string(),
                    reason: "invalid escape sequence in key",
                })
            }
        }
    }
    Err(TemporaError::MalformedKey {
        input: original.to_string(),
        reason: "missing key terminator",
    })
}

fn parse_timestamp(original: &str, digits: &str) -> Result<u64> {
    let malformed = |reason| TemporaError::MalformedKey {
        input: original.to_string(),
        reason,
    };
    if digits.len() != TIMESTAMP_WIDTH {
        return Err(malformed("timestamp must be 16 hex digits"));
    }
    if !digits
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(malformed("timestamp must be lowercase hex"));
    }
    u64::from_str_radix(digits, 16).map_err(|_| malformed("timestamp out of range"))
}

// =============================================================================
// TemporalKey
// =============================================================================

/// A plain key at a commit timestamp, ordered key first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemporalKey {
    key: String,
    timestamp: u64,
}

impl TemporalKey {
    /// Create a temporal key
    pub fn new(key: impl Into<String>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    /// Smallest temporal key of `key`'s history
    pub fn create_min_inclusive(key: impl Into<String>) -> Self {
        Self::new(key, 0)
    }

    /// Largest temporal key of `key`'s history
    pub fn create_max_inclusive(key: impl Into<String>) -> Self {
        Self::new(key, u64::MAX)
    }

    /// The plain key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The commit timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Split into (key, timestamp)
    pub fn into_parts(self) -> (String, u64) {
        (self.key, self.timestamp)
    }

    /// Encode to the sortable string form
    pub fn encode(&self) -> String {
        Self::encode_parts(&self.key, self.timestamp)
    }

    /// Encode a (key, timestamp) pair without building a `TemporalKey`
    pub fn encode_parts(key: &str, timestamp: u64) -> String {
        let mut out = String::with_capacity(key.len() + 2 + TIMESTAMP_WIDTH);
        push_escaped_key(&mut out, key);
        push_timestamp(&mut out, timestamp);
        out
    }

    /// Decode the sortable string form
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if `encoded` was not produced by [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<Self> {
        let (key, rest) = split_escaped_key(encoded, encoded)?;
        let timestamp = parse_timestamp(encoded, rest)?;
        Ok(Self { key, timestamp })
    }
}

impl fmt::Display for TemporalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.timestamp)
    }
}

// =============================================================================
// InverseTemporalKey
// =============================================================================

/// A commit timestamp and plain key, ordered timestamp first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InverseTemporalKey {
    timestamp: u64,
    key: String,
}

impl InverseTemporalKey {
    /// Create an inverse temporal key
    pub fn new(timestamp: u64, key: impl Into<String>) -> Self {
        Self {
            timestamp,
            key: key.into(),
        }
    }

    /// Smallest key at `timestamp`; an inclusive scan bound
    pub fn create_min_inclusive(timestamp: u64) -> Self {
        Self::new(timestamp, String::new())
    }

    /// Smallest key after `timestamp`; an exclusive scan bound that keeps
    /// every entry at `timestamp`
    ///
    /// Saturates at `u64::MAX`.
    pub fn create_max_exclusive(timestamp: u64) -> Self {
        Self::new(timestamp.saturating_add(1), String::new())
    }

    /// The commit timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The plain key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Convert to a key-first temporal key
    pub fn to_temporal_key(&self) -> TemporalKey {
        TemporalKey::new(self.key.clone(), self.timestamp)
    }

    /// Encode to the sortable string form
    pub fn encode(&self) -> String {
        Self::encode_parts(self.timestamp, &self.key)
    }

    /// Encode a (timestamp, key) pair without building an `InverseTemporalKey`
    pub fn encode_parts(timestamp: u64, key: &str) -> String {
        let mut out = String::with_capacity(key.len() + 2 + TIMESTAMP_WIDTH);
        push_timestamp(&mut out, timestamp);
        push_escaped_key(&mut out, key);
        out
    }

    /// Decode the sortable string form
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` if `encoded` was not produced by [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<Self> {
        let digits = encoded
            .get(..TIMESTAMP_WIDTH)
            .ok_or(TemporaError::MalformedKey {
                input: encoded.to_string(),
                reason: "timestamp must be 16 hex digits",
            })?;
        let timestamp = parse_timestamp(encoded, digits)?;
        let (key, rest) = split_escaped_key(encoded, &encoded[TIMESTAMP_WIDTH..])?;
        if !rest.is_empty() {
            return Err(TemporaError::MalformedKey {
                input: encoded.to_string(),
                reason: "trailing data after key terminator",
            });
        }
        Ok(Self { timestamp, key })
    }
}

impl fmt::Display for InverseTemporalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.timestamp)
    }
}
