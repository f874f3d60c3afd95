//! Inclusive id ranges.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive interval of ids, `min_id <= max_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdRange {
    /// Smallest id in the range (inclusive).
    pub min_id: i64,
    /// Largest id in the range (inclusive).
    pub max_id: i64,
}

impl IdRange {
    /// Create a range from bounds computed internally.
    ///
    /// # Panics
    ///
    /// Panics if `min_id > max_id`. Internal callers only build ranges from
    /// bounds they already ordered, so a reversed range here is a bug.
    pub fn new(min_id: i64, max_id: i64) -> Self {
        assert!(
            min_id <= max_id,
            "IdRange min {} exceeds max {}",
            min_id,
            max_id
        );
        Self { min_id, max_id }
    }

    /// Create a range from externally supplied bounds.
    pub fn try_new(min_id: i64, max_id: i64) -> Result<Self> {
        if min_id > max_id {
            return Err(MigrateError::InvalidRange { min_id, max_id });
        }
        Ok(Self { min_id, max_id })
    }

    /// Number of ids covered by the range.
    pub fn len(&self) -> u64 {
        self.span() + 1
    }

    /// `max_id - min_id`, computed without overflow.
    pub fn span(&self) -> u64 {
        self.max_id.abs_diff(self.min_id)
    }

    /// Whether the range covers a single id.
    pub fn is_single(&self) -> bool {
        self.min_id == self.max_id
    }

    pub fn contains(&self, id: i64) -> bool {
        self.min_id <= id && id <= self.max_id
    }

    pub fn overlaps(&self, other: &IdRange) -> bool {
        self.min_id <= other.max_id && other.min_id <= self.max_id
    }

    /// The common part of two ranges, if any.
    pub fn intersection(&self, other: &IdRange) -> Option<IdRange> {
        let min_id = self.min_id.max(other.min_id);
        let max_id = self.max_id.min(other.max_id);
        (min_id <= max_id).then(|| IdRange::new(min_id, max_id))
    }

    /// Split into `[min, mid]` and `[mid + 1, max]` by id value.
    ///
    /// # Panics
    ///
    /// Panics on a single-id range, which has no non-empty halves.
    pub fn split_at_midpoint(&self) -> (IdRange, IdRange) {
        assert!(
            !self.is_single(),
            "cannot split single-id range {}",
            self
        );
        let mid = self.min_id + (self.span() / 2) as i64;
        (
            IdRange::new(self.min_id, mid),
            IdRange::new(mid + 1, self.max_id),
        )
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min_id, self.max_id)
    }
}

/// Check that no two ranges in the list share an id.
pub fn ranges_are_disjoint(ranges: &[IdRange]) -> bool {
    let mut sorted: Vec<&IdRange> = ranges.iter().collect();
    sorted.sort();
    sorted.windows(2).all(|w| w[0].max_id < w[1].min_id)
}
