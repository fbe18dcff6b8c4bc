//! Replay protection over sequence numbers.
//!
//! Accepted sequence numbers are stored as a sorted set of disjoint closed
//! intervals, keyed by their lower bound. Adjacent intervals are always
//! merged, so a sender that delivers mostly in order keeps the set at one
//! range regardless of how many messages it has sent.
//!
//! # Invariants
//!
//! - Ranges are sorted by `min` (guaranteed by the map)
//! - For every range `min <= max`
//! - Consecutive ranges `a`, `b` satisfy `a.max + 1 < b.min` (disjoint and
//!   non-adjacent)
//!
//! All comparisons are on `u64`; values above `2^63` sort after smaller ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed interval `[min, max]` of accepted sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedRange {
    /// Lowest sequence number in the range
    pub min: u64,
    /// Highest sequence number in the range
    pub max: u64,
}

impl UsedRange {
    /// Range covering a single sequence number.
    pub const fn single(seq: u64) -> Self {
        Self { min: seq, max: seq }
    }
}

/// Persisted ranges that violate the set invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// `min > max`
    #[error("inverted range [{min}, {max}]")]
    Inverted {
        /// Range lower bound
        min: u64,
        /// Range upper bound
        max: u64,
    },

    /// Ranges out of order, overlapping, or adjacent
    #[error("range starting at {next_min} does not follow range ending at {prev_max}")]
    NotDisjoint {
        /// End of the earlier range
        prev_max: u64,
        /// Start of the later range
        next_min: u64,
    },
}

/// Accepted-sequence tracker for one sender identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayGuard {
    /// `min -> max`
    ranges: BTreeMap<u64, u64>,
}

impl ReplayGuard {
    /// Empty guard; every sequence number is fresh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted ranges, rejecting anything that breaks the
    /// invariants.
    pub fn from_ranges(ranges: &[UsedRange]) -> Result<Self, RangeError> {
        let mut map = BTreeMap::new();
        let mut prev: Option<UsedRange> = None;

        for &range in ranges {
            if range.min > range.max {
                return Err(RangeError::Inverted { min: range.min, max: range.max });
            }
            if let Some(prev) = prev {
                let follows = prev.max.checked_add(1).is_some_and(|after| after < range.min);
                if !follows {
                    return Err(RangeError::NotDisjoint { prev_max: prev.max, next_min: range.min });
                }
            }
            map.insert(range.min, range.max);
            prev = Some(range);
        }

        Ok(Self { ranges: map })
    }

    /// Record `seq`. Returns `false` if it was already recorded.
    ///
    /// O(log n) in the number of ranges.
    pub fn use_seq(&mut self, seq: u64) -> bool {
        let floor =
            self.ranges.range(..=seq).next_back().map(|(&min, &max)| UsedRange { min, max });
        let ceiling = self.ranges.range(seq..).next().map(|(&min, &max)| UsedRange { min, max });

        if floor.is_some_and(|f| f.max >= seq) || ceiling.is_some_and(|c| c.min <= seq) {
            return false;
        }

        let mut merged = UsedRange::single(seq);

        if let Some(f) = floor
            && f.max.checked_add(1) == Some(seq)
        {
            self.ranges.remove(&f.min);
            merged.min = f.min;
        }

        if let Some(c) = ceiling
            && c.min.checked_sub(1) == Some(seq)
        {
            self.ranges.remove(&c.min);
            merged.max = c.max;
        }

        self.ranges.insert(merged.min, merged.max);

        debug_assert!(self.contains(seq));
        true
    }

    /// Whether `seq` has been recorded.
    pub fn contains(&self, seq: u64) -> bool {
        self.ranges.range(..=seq).next_back().is_some_and(|(_, &max)| max >= seq)
    }

    /// Current ranges, ascending.
    pub fn ranges(&self) -> Vec<UsedRange> {
        self.ranges.iter().map(|(&min, &max)| UsedRange { min, max }).collect()
    }

    /// Number of disjoint ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }
}
