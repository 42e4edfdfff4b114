//! Lazy, restartable scans over temporal maps
//!
//! [`History`] and [`ModificationScan`] are descriptions of a scan, not
//! cursors: every call to `iter()` starts a fresh descending walk. The
//! iterators re-seek the backing map on each step (`floor`/`lower` lookups)
//! and hold no lock between steps, so dropping one early releases nothing
//! but its own state.
//!
//! Both scans are made of segments, newest first. A single data matrix
//! yields one segment; the engine concatenates the segments of every chunk
//! and ancestor branch to describe a branch's full timeline.

use crate::ordered_map::OrderedMap;
use std::fmt;
use std::sync::Arc;
use tempora_core::{InverseTemporalKey, Result, TemporalKey};

// =============================================================================
// History
// =============================================================================

#[derive(Clone)]
struct HistorySegment {
    forward: Arc<dyn OrderedMap<Vec<u8>>>,
    max_timestamp: u64,
}

/// Commit timestamps of one key, descending
#[derive(Clone)]
pub struct History {
    key: String,
    segments: Vec<HistorySegment>,
}

impl History {
    /// History of `key` in a single forward map, up to `max_timestamp` inclusive
    pub fn new(forward: Arc<dyn OrderedMap<Vec<u8>>>, key: impl Into<String>, max_timestamp: u64) -> Self {
        Self {
            key: key.into(),
            segments: vec![HistorySegment {
                forward,
                max_timestamp,
            }],
        }
    }

    /// A history with no entries
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            segments: Vec::new(),
        }
    }

    /// The key this history describes
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append an older history of the same key
    ///
    /// Every timestamp of `older` must be smaller than every timestamp of `self`.
    pub fn then(mut self, older: History) -> Self {
        debug_assert_eq!(self.key, older.key, "histories of different keys");
        self.segments.extend(older.segments);
        self
    }

    /// Start a fresh descending walk
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            history: self,
            segment: 0,
            cursor: None,
        }
    }

    /// Collect all timestamps, descending
    pub fn to_vec(&self) -> Result<Vec<u64>> {
        self.iter().collect()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("key", &self.key)
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = Result<u64>;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Descending walk over a [`History`]
pub struct HistoryIter<'a> {
    history: &'a History,
    segment: usize,
    /// Last encoded key returned from the current segment
    cursor: Option<String>,
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(segment) = self.history.segments.get(self.segment) {
            let entry = match &self.cursor {
                None => segment.forward.floor_entry(&TemporalKey::encode_parts(
                    &self.history.key,
                    segment.max_timestamp,
                )),
                Some(last) => segment.forward.lower_entry(last),
            };
            if let Some((encoded, _)) = entry {
                match TemporalKey::decode(&encoded) {
                    Ok(tk) if tk.key() == self.history.key => {
                        self.cursor = Some(encoded);
                        return Some(Ok(tk.timestamp()));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Stop this walk for good; a later call would hit the same entry
                        self.segment = self.history.segments.len();
                        return Some(Err(e));
                    }
                }
            }
            self.segment += 1;
            self.cursor = None;
        }
        None
    }
}

// =============================================================================
// ModificationScan
// =============================================================================

#[derive(Clone)]
struct ModificationSegment {
    inverse: Arc<dyn OrderedMap<bool>>,
    lower_inclusive: u64,
    upper_exclusive: u64,
}

/// Change events `(key, timestamp)` within a time range, descending by timestamp
#[derive(Clone, Default)]
pub struct ModificationScan {
    segments: Vec<ModificationSegment>,
}

impl ModificationScan {
    /// Changes recorded in one inverse map within `[lower_inclusive, upper_exclusive)`
    pub fn new(inverse: Arc<dyn OrderedMap<bool>>, lower_inclusive: u64, upper_exclusive: u64) -> Self {
        let mut scan = Self::empty();
        if lower_inclusive < upper_exclusive {
            scan.segments.push(ModificationSegment {
                inverse,
                lower_inclusive,
                upper_exclusive,
            });
        }
        scan
    }

    /// A scan with no entries
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Append a scan covering strictly older timestamps
    pub fn then(mut self, older: ModificationScan) -> Self {
        self.segments.extend(older.segments);
        self
    }

    /// Start a fresh descending walk
    pub fn iter(&self) -> ModificationIter<'_> {
        ModificationIter {
            scan: self,
            segment: 0,
            cursor: None,
        }
    }

    /// Collect all change events, descending by timestamp
    pub fn to_vec(&self) -> Result<Vec<TemporalKey>> {
        self.iter().collect()
    }
}

impl fmt::Debug for ModificationScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModificationScan")
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ModificationScan {
    type Item = Result<TemporalKey>;
    type IntoIter = ModificationIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Descending walk over a [`ModificationScan`]
pub struct ModificationIter<'a> {
    scan: &'a ModificationScan,
    segment: usize,
    cursor: Option<String>,
}

impl Iterator for ModificationIter<'_> {
    type Item = Result<TemporalKey>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(segment) = self.scan.segments.get(self.segment) {
            let entry = match &self.cursor {
                None => segment.inverse.lower_entry(
                    &InverseTemporalKey::create_min_inclusive(segment.upper_exclusive).encode(),
                ),
                Some(last) => segment.inverse.lower_entry(last),
            };
            let floor = InverseTemporalKey::create_min_inclusive(segment.lower_inclusive).encode();
            if let Some((encoded, _)) = entry.filter(|(encoded, _)| *encoded >= floor) {
                match InverseTemporalKey::decode(&encoded) {
                    Ok(ik) => {
                        self.cursor = Some(encoded);
                        return Some(Ok(ik.to_temporal_key()));
                    }
                    Err(e) => {
                        self.segment = self.scan.segments.len();
                        return Some(Err(e));
                    }
                }
            }
            self.segment += 1;
            self.cursor = None;
        }
        None
    }
}
