//! Half-open validity intervals over commit timestamps
//!
//! A `Period` is `[lower, upper)`: the lower bound is inclusive, the upper
//! bound exclusive. `u64::MAX` as the upper bound means "open ended".
//!
//! ## Invariants
//!
//! - `lower < upper` for every non-empty period
//! - The only period with `lower == upper` is [`Period::empty()`]
//! - `set_upper_bound` only ever shrinks a period and never empties it
//!
//! Equality and ordering are structural (lower bound first, then upper bound).
//! Because no constructor can build any other empty-shaped range, the empty
//! period equals nothing but itself.

use crate::error::{Result, TemporaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest representable timestamp; as an upper bound it means "no end"
pub const TIMESTAMP_MAX: u64 = u64::MAX;

/// A half-open interval `[lower, upper)` of timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    lower: u64,
    upper: u64,
}

const EMPTY: Period = Period { lower: 0, upper: 0 };
const ETERNAL: Period = Period {
    lower: 0,
    upper: TIMESTAMP_MAX,
};

impl Period {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// The empty period. Contains nothing, overlaps nothing.
    #[inline]
    pub const fn empty() -> Self {
        EMPTY
    }

    /// The period spanning all timestamps: `[0, MAX)`
    #[inline]
    pub const fn eternal() -> Self {
        ETERNAL
    }

    /// Create `[lower, upper)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` if `lower >= upper`.
    pub fn create_range(lower: u64, upper: u64) -> Result<Self> {
        if lower >= upper {
            return Err(TemporaError::InvalidPeriod {
                lower,
                upper,
                requested: upper,
                reason: "lower bound must be strictly less than upper bound",
            });
        }
        Ok(Period { lower, upper })
    }

    /// Create `[timestamp, timestamp + 1)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` for `u64::MAX`, which has no successor.
    pub fn create_point(timestamp: u64) -> Result<Self> {
        let upper = timestamp.checked_add(1).ok_or(TemporaError::InvalidPeriod {
            lower: timestamp,
            upper: timestamp,
            requested: timestamp,
            reason: "point period requires a successor timestamp",
        })?;
        Ok(Period {
            lower: timestamp,
            upper,
        })
    }

    /// Create `[lower, MAX)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` if `lower` is `u64::MAX`.
    pub fn create_open_ended_range(lower: u64) -> Result<Self> {
        Self::create_range(lower, TIMESTAMP_MAX)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Inclusive lower bound
    #[inline]
    pub const fn lower_bound(&self) -> u64 {
        self.lower
    }

    /// Exclusive upper bound
    #[inline]
    pub const fn upper_bound(&self) -> u64 {
        self.upper
    }

    /// Whether this is the empty period
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    /// Whether the upper bound is unlimited
    #[inline]
    pub const fn is_open_ended(&self) -> bool {
        !self.is_empty() && self.upper == TIMESTAMP_MAX
    }

    /// Number of timestamps covered (`upper - lower`, 0 for empty)
    #[inline]
    pub const fn length(&self) -> u64 {
        self.upper - self.lower
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Whether `timestamp` lies within `[lower, upper)`
    #[inline]
    pub const fn contains(&self, timestamp: u64) -> bool {
        self.lower <= timestamp && timestamp < self.upper
    }

    /// Whether `other` lies entirely within this period
    ///
    /// Always false if either side is empty.
    pub fn contains_period(&self, other: &Period) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.lower <= other.lower && other.upper <= self.upper
    }

    /// Whether the two periods share at least one timestamp
    pub fn overlaps(&self, other: &Period) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.lower < other.upper && other.lower < self.upper
    }

    /// Whether the periods touch on either side without overlapping
    pub fn is_adjacent_to(&self, other: &Period) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.upper == other.lower || other.upper == self.lower
    }

    /// Whether this period ends at or before `other` begins
    pub fn is_before(&self, other: &Period) -> bool {
        !self.is_empty() && !other.is_empty() && self.upper <= other.lower
    }

    /// Whether this period ends before `other` begins with a gap between them
    pub fn is_strictly_before(&self, other: &Period) -> bool {
        !self.is_empty() && !other.is_empty() && self.upper < other.lower
    }

    /// Whether this period begins at or after `other` ends
    pub fn is_after(&self, other: &Period) -> bool {
        other.is_before(self)
    }

    /// Whether this period begins after `other` ends with a gap between them
    pub fn is_strictly_after(&self, other: &Period) -> bool {
        other.is_strictly_before(self)
    }

    /// Whether every timestamp of this period is smaller than `timestamp`
    pub fn is_before_timestamp(&self, timestamp: u64) -> bool {
        !self.is_empty() && self.upper <= timestamp
    }

    /// Whether every timestamp of this period is greater than `timestamp`
    pub fn is_after_timestamp(&self, timestamp: u64) -> bool {
        !self.is_empty() && self.lower > timestamp
    }

    // =========================================================================
    // Derivation
    // =========================================================================

    /// Return a copy of this period with a smaller upper bound
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` if this period is empty, if `new_upper <= lower`
    /// (the result would be empty or inverted), or if `new_upper > upper`
    /// (periods never grow).
    pub fn set_upper_bound(&self, new_upper: u64) -> Result<Period> {
        let reject = |reason| TemporaError::InvalidPeriod {
            lower: self.lower,
            upper: self.upper,
            requested: new_upper,
            reason,
        };
        if self.is_empty() {
            return Err(reject("the empty period has no bounds to change"));
        }
        if new_upper <= self.lower {
            return Err(reject("new upper bound must exceed the lower bound"));
        }
        if new_upper > self.upper {
            return Err(reject("upper bound can only shrink"));
        }
        Ok(Period {
            lower: self.lower,
            upper: new_upper,
        })
    }

    /// Clamp the upper bound to at most `upper`, leaving shorter periods alone
    ///
    /// Returns the empty period if nothing remains.
    pub fn truncate_to(&self, upper: u64) -> Period {
        if self.is_empty() || upper <= self.lower {
            return EMPTY;
        }
        Period {
            lower: self.lower,
            upper: self.upper.min(upper),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[empty)");
        }
        if self.is_open_ended() {
            write!(f, "[{};MAX)", self.lower)
        } else {
            write!(f, "[{};{})", self.lower, self.upper)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lower: u64, upper: u64) -> Period {
        Period::create_range(lower, upper).unwrap()
    }

    #[test]
    fn test_singletons() {
        assert!(Period::empty().is_empty());
        assert_eq!(Period::empty().length(), 0);
        assert_eq!(Period::eternal().lower_bound(), 0);
        assert!(Period::eternal().is_open_ended());
        assert!(!Period::empty().is_open_ended());
        assert_eq!(Period::empty(), Period::empty());
        assert_ne!(Period::empty(), p(0, 1));
    }

    #[test]
    fn test_create_range_rejects_empty_and_inverted() {
        assert!(Period::create_range(5, 5).is_err());
        assert!(Period::create_range(6, 5).is_err());
        assert!(Period::create_point(u64::MAX).is_err());
        assert!(Period::create_open_ended_range(u64::MAX).is_err());
    }

    #[test]
    fn test_contains_timestamp_is_half_open() {
        let period = p(5, 10);
        assert!(!period.contains(4));
        assert!(period.contains(5));
        assert!(period.contains(9));
        assert!(!period.contains(10));
        assert!(!Period::empty().contains(0));
    }

    #[test]
    fn test_contains_period() {
        assert!(p(0, 10).contains_period(&p(2, 5)));
        assert!(p(0, 10).contains_period(&p(0, 10)));
        assert!(!p(0, 10).contains_period(&p(5, 11)));
        assert!(!Period::empty().contains_period(&Period::empty()));
        assert!(!p(0, 10).contains_period(&Period::empty()));
    }

    #[test]
    fn test_overlaps_and_adjacency() {
        assert!(p(0, 10).overlaps(&p(9, 12)));
        assert!(!p(0, 10).overlaps(&p(10, 12)));
        assert!(p(0, 10).is_adjacent_to(&p(10, 12)));
        assert!(p(10, 12).is_adjacent_to(&p(0, 10)));
        assert!(!p(0, 10).is_adjacent_to(&p(11, 12)));
        assert!(!p(0, 10).is_adjacent_to(&p(0, 10)));
    }

    #[test]
    fn test_before_and_after() {
        assert!(p(0, 10).is_before(&p(10, 20)));
        assert!(!p(0, 10).is_strictly_before(&p(10, 20)));
        assert!(p(0, 10).is_strictly_before(&p(11, 20)));
        assert!(p(10, 20).is_after(&p(0, 10)));
        assert!(!p(10, 20).is_strictly_after(&p(0, 10)));
        assert!(p(12, 20).is_strictly_after(&p(0, 10)));
        assert!(p(0, 10).is_before_timestamp(10));
        assert!(!p(0, 10).is_before_timestamp(9));
        assert!(p(5, 10).is_after_timestamp(4));
        assert!(!p(5, 10).is_after_timestamp(5));
    }

    #[test]
    fn test_set_upper_bound_shrinks() {
        let period = Period::create_open_ended_range(5).unwrap();
        let trimmed = period.set_upper_bound(9).unwrap();
        assert_eq!(trimmed, p(5, 9));
        assert!(!trimmed.is_open_ended());
        // the original value is untouched
        assert!(period.is_open_ended());
    }

    #[test]
    fn test_set_upper_bound_rejections() {
        let period = p(5, 10);
        assert!(matches!(
            period.set_upper_bound(5),
            Err(TemporaError::InvalidPeriod { requested: 5, .. })
        ));
        assert!(period.set_upper_bound(2).is_err());
        assert!(period.set_upper_bound(11).is_err());
        assert!(Period::empty().set_upper_bound(1).is_err());
    }

    #[test]
    fn test_ordering_is_lower_then_upper() {
        let mut periods = vec![p(5, 10), p(0, 20), p(5, 7), p(0, 3)];
        periods.sort();
        assert_eq!(periods, vec![p(0, 3), p(0, 20), p(5, 7), p(5, 10)]);
    }

    #[test]
    fn test_truncate_to() {
        assert_eq!(Period::eternal().truncate_to(7), p(0, 7));
        assert_eq!(p(3, 5).truncate_to(9), p(3, 5));
        assert!(p(3, 5).truncate_to(3).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(p(1, 4).to_string(), "[1;4)");
        assert_eq!(Period::eternal().to_string(), "[0;MAX)");
        assert_eq!(Period::empty().to_string(), "[empty)");
    }
}
