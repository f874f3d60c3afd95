//! Checksum range differ.
//!
//! Narrows a mismatching id range down to the sub-ranges whose checksums
//! differ between source and destination, halving by id value until a range
//! is small enough to re-transfer wholesale.

use crate::core::{ChecksumOracle, IdRange, MigrationType};
use crate::error::Result;
use tracing::debug;

/// Result of diffing one id range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Ranges whose checksums differ, ascending by id.
    pub update_ranges: Vec<IdRange>,
    /// Ranges whose checksums matched, ascending by id.
    pub skipped_ranges: Vec<IdRange>,
    /// Number of range comparisons (each is one call per system).
    pub comparisons: u64,
}

/// Compares range checksums between two systems.
pub struct ChecksumRangeDiffer<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    destination: &'a D,
    migration_type: &'a MigrationType,
    salt: &'a str,
    batch_size: u64,
}

impl<'a, S, D> ChecksumRangeDiffer<'a, S, D>
where
    S: ChecksumOracle + ?Sized,
    D: ChecksumOracle + ?Sized,
{
    /// # Panics
    ///
    /// Panics if `batch_size` is zero; configuration validation rejects it.
    pub fn new(
        source: &'a S,
        destination: &'a D,
        migration_type: &'a MigrationType,
        salt: &'a str,
        batch_size: u64,
    ) -> Self {
        assert!(batch_size > 0, "batch size must be at least 1");
        Self {
            source,
            destination,
            migration_type,
            salt,
            batch_size,
        }
    }

    /// Find the sub-ranges of `range` that differ.
    ///
    /// Pending ranges live on an explicit stack, right half pushed first,
    /// so results come out in ascending id order.
    pub async fn diff(&self, range: IdRange) -> Result<DiffOutcome> {
        let mut outcome = DiffOutcome::default();
        let mut pending = vec![range];

        while let Some(current) = pending.pop() {
            let (source_sum, dest_sum) = tokio::join!(
                self.source.checksum_for_range(
                    self.migration_type,
                    self.salt,
                    current.min_id,
                    current.max_id
                ),
                self.destination.checksum_for_range(
                    self.migration_type,
                    self.salt,
                    current.min_id,
                    current.max_id
                )
            );
            let source_sum = source_sum?;
            let dest_sum = dest_sum?;
            outcome.comparisons += 1;

            if source_sum == dest_sum {
                outcome.skipped_ranges.push(current);
                continue;
            }

            if current.span() < self.batch_size {
                debug!(
                    "{} range {}: checksum mismatch, scheduling update",
                    self.migration_type, current
                );
                outcome.update_ranges.push(current);
                continue;
            }

            let (left, right) = current.split_at_midpoint();
            pending.push(right);
            pending.push(left);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::Checksum;
    use crate::error::MigrateError;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Checksums derived from a set of "dirty" ids: a range matches when it
    /// holds no dirty id. Records every call for assertions.
    pub(crate) struct DirtyIdOracle {
        dirty: BTreeSet<i64>,
        side: &'static str,
        pub calls: Mutex<Vec<(i64, i64)>>,
    }

    impl DirtyIdOracle {
        pub(crate) fn new(side: &'static str, dirty: impl IntoIterator<Item = i64>) -> Self {
            Self {
                dirty: dirty.into_iter().collect(),
                side,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn clean(side: &'static str) -> Self {
            Self::new(side, Vec::<i64>::new())
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChecksumOracle for DirtyIdOracle {
        async fn checksum_for_range(
            &self,
            _migration_type: &MigrationType,
            _salt: &str,
            min_id: i64,
            max_id: i64,
        ) -> Result<Checksum> {
            self.calls.lock().unwrap().push((min_id, max_id));
            let dirty = self.dirty.range(min_id..=max_id).next().is_some();
            Ok(if dirty {
                Checksum::new(format!("{}-{}-{}", self.side, min_id, max_id))
            } else {
                Checksum::new("clean")
            })
        }
    }

    /// Returns the same checksum for every range.
    pub(crate) struct ConstantOracle(pub &'static str);

    #[async_trait]
    impl ChecksumOracle for ConstantOracle {
        async fn checksum_for_range(
            &self,
            _migration_type: &MigrationType,
            _salt: &str,
            _min_id: i64,
            _max_id: i64,
        ) -> Result<Checksum> {
            Ok(Checksum::new(self.0))
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl ChecksumOracle for FailingOracle {
        async fn checksum_for_range(
            &self,
            _migration_type: &MigrationType,
            _salt: &str,
            _min_id: i64,
            _max_id: i64,
        ) -> Result<Checksum> {
            Err(MigrateError::oracle("destination", "connection reset"))
        }
    }

    fn assert_exact_cover(range: IdRange, outcome: &DiffOutcome) {
        let mut all: Vec<IdRange> = outcome
            .update_ranges
            .iter()
            .chain(outcome.skipped_ranges.iter())
            .copied()
            .collect();
        all.sort();
        assert_eq!(all.first().map(|r| r.min_id), Some(range.min_id));
        assert_eq!(all.last().map(|r| r.max_id), Some(range.max_id));
        for pair in all.windows(2) {
            assert_eq!(pair[0].max_id + 1, pair[1].min_id, "gap or overlap");
        }
    }

    #[tokio::test]
    async fn test_matching_range_costs_one_comparison() {
        let ty = MigrationType::new("NODE");
        let src = DirtyIdOracle::clean("src");
        let dest = DirtyIdOracle::clean("dest");
        let differ = ChecksumRangeDiffer::new(&src, &dest, &ty, "salt", 10);

        let outcome = differ.diff(IdRange::new(1, 1_000_000)).await.unwrap();
        assert!(outcome.update_ranges.is_empty());
        assert_eq!(outcome.comparisons, 1);
        assert_eq!(src.call_count(), 1);
        assert_eq!(dest.call_count(), 1);
    }

    #[tokio::test]
    async fn test_small_mismatch_is_not_split() {
        let ty = MigrationType::new("NODE");
        let (src, dest) = (ConstantOracle("a"), ConstantOracle("b"));
        let differ = ChecksumRangeDiffer::new(&src, &dest, &ty, "salt", 1000);
        let outcome = differ.diff(IdRange::new(50, 100)).await.unwrap();
        assert_eq!(outcome.update_ranges, vec![IdRange::new(50, 100)]);
        assert_eq!(outcome.comparisons, 1);
    }

    #[tokio::test]
    async fn test_total_mismatch_splits_down_to_batch_size() {
        let ty = MigrationType::new("NODE");
        let (src, dest) = (ConstantOracle("a"), ConstantOracle("b"));
        let differ = ChecksumRangeDiffer::new(&src, &dest, &ty, "salt", 4);
        let range = IdRange::new(1, 16);
        let outcome = differ.diff(range).await.unwrap();
        assert_eq!(
            outcome.update_ranges,
            vec![
                IdRange::new(1, 4),
                IdRange::new(5, 8),
                IdRange::new(9, 12),
                IdRange::new(13, 16)
            ]
        );
        // 1 root, 2 halves, 4 leaves
        assert_eq!(outcome.comparisons, 7);
        assert_exact_cover(range, &outcome);
    }

    #[tokio::test]
    async fn test_isolates_dirty_ids() {
        let ty = MigrationType::new("NODE");
        let src = DirtyIdOracle::new("src", [3, 700]);
        let dest = DirtyIdOracle::new("dest", [3, 700]);
        let differ = ChecksumRangeDiffer::new(&src, &dest, &ty, "salt", 8);

        let range = IdRange::new(1, 1024);
        let outcome = differ.diff(range).await.unwrap();
        assert_eq!(outcome.update_ranges.len(), 2);
        assert!(outcome.update_ranges[0].contains(3));
        assert!(outcome.update_ranges[1].contains(700));
        assert!(outcome.update_ranges.iter().all(|r| r.span() < 8));
        assert_exact_cover(range, &outcome);
    }

    #[tokio::test]
    async fn test_cover_holds_for_odd_bounds() {
        let ty = MigrationType::new("NODE");
        for (lo, hi, dirty) in [(-37, 91, vec![-37, 0, 91]), (5, 6, vec![6]), (9, 9, vec![9])] {
            let src = DirtyIdOracle::new("src", dirty.clone());
            let dest = DirtyIdOracle::new("dest", dirty);
            let differ = ChecksumRangeDiffer::new(&src, &dest, &ty, "salt", 1);
            let range = IdRange::new(lo, hi);
            let outcome = differ.diff(range).await.unwrap();
            assert_exact_cover(range, &outcome);
        }
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates() {
        let ty = MigrationType::new("NODE");
        let src = ConstantOracle("a");
        let differ = ChecksumRangeDiffer::new(&src, &FailingOracle, &ty, "salt", 10);
        let err = differ.diff(IdRange::new(1, 100)).await.unwrap_err();
        assert!(matches!(err, MigrateError::Oracle { .. }));
    }
}
