//! Per-type delta finder.

use super::differ::ChecksumRangeDiffer;
use crate::core::{ranges_are_disjoint, ChecksumOracle, IdRange, MigrationType, TypeToMigrateMetadata};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Edit plan for one migration type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRanges {
    pub migration_type: MigrationType,
    /// Source-only id ranges to create at the destination.
    pub insert_ranges: Vec<IdRange>,
    /// Ranges present on both sides whose content differs.
    pub update_ranges: Vec<IdRange>,
    /// Destination-only id ranges to purge.
    pub delete_ranges: Vec<IdRange>,
}

impl DeltaRanges {
    pub fn empty(migration_type: MigrationType) -> Self {
        Self {
            migration_type,
            insert_ranges: Vec::new(),
            update_ranges: Vec::new(),
            delete_ranges: Vec::new(),
        }
    }

    /// Whether both systems already agree for this type.
    pub fn is_in_sync(&self) -> bool {
        self.insert_ranges.is_empty() && self.update_ranges.is_empty() && self.delete_ranges.is_empty()
    }

    /// # Panics
    ///
    /// Panics if any list overlaps itself or an insert range overlaps a
    /// delete range. Both would mean the finder computed a broken plan.
    pub fn assert_disjoint(&self) {
        assert!(
            ranges_are_disjoint(&self.insert_ranges),
            "{}: overlapping insert ranges",
            self.migration_type
        );
        assert!(
            ranges_are_disjoint(&self.update_ranges),
            "{}: overlapping update ranges",
            self.migration_type
        );
        assert!(
            ranges_are_disjoint(&self.delete_ranges),
            "{}: overlapping delete ranges",
            self.migration_type
        );
        for ins in &self.insert_ranges {
            assert!(
                !self.delete_ranges.iter().any(|del| del.overlaps(ins)),
                "{}: insert range {} overlaps a delete range",
                self.migration_type,
                ins
            );
        }
    }
}

/// Computes [`DeltaRanges`] for one type from bounds plus range checksums.
pub struct DeltaFinder<'a, S: ?Sized, D: ?Sized> {
    metadata: &'a TypeToMigrateMetadata,
    source: &'a S,
    destination: &'a D,
    salt: &'a str,
    batch_size: u64,
}

impl<'a, S, D> DeltaFinder<'a, S, D>
where
    S: ChecksumOracle + ?Sized,
    D: ChecksumOracle + ?Sized,
{
    pub fn new(
        metadata: &'a TypeToMigrateMetadata,
        source: &'a S,
        destination: &'a D,
        salt: &'a str,
        batch_size: u64,
    ) -> Self {
        Self {
            metadata,
            source,
            destination,
            salt,
            batch_size,
        }
    }

    pub async fn find_delta_ranges(&self) -> Result<DeltaRanges> {
        self.metadata.validate()?;
        let migration_type = &self.metadata.migration_type;
        let mut ranges = DeltaRanges::empty(migration_type.clone());

        let (src, dest) = match (self.metadata.src_range(), self.metadata.dest_range()) {
            (None, None) => {
                debug!("{}: empty on both systems", migration_type);
                return Ok(ranges);
            }
            (None, Some(dest)) => {
                ranges.delete_ranges.push(dest);
                info!("{}: source empty, deleting {}", migration_type, dest);
                return Ok(ranges);
            }
            (Some(src), None) => {
                ranges.insert_ranges.push(src);
                info!("{}: destination empty, inserting {}", migration_type, src);
                return Ok(ranges);
            }
            (Some(src), Some(dest)) => (src, dest),
        };

        let overlap = match src.intersection(&dest) {
            Some(overlap) => overlap,
            None => {
                // Disjoint id spaces share no rows, so there is nothing to checksum.
                ranges.insert_ranges.push(src);
                ranges.delete_ranges.push(dest);
                info!(
                    "{}: disjoint id spaces, inserting {} and deleting {}",
                    migration_type, src, dest
                );
                ranges.assert_disjoint();
                return Ok(ranges);
            }
        };

        if src.min_id < overlap.min_id {
            ranges
                .insert_ranges
                .push(IdRange::new(src.min_id, overlap.min_id - 1));
        }
        if dest.min_id < overlap.min_id {
            ranges
                .delete_ranges
                .push(IdRange::new(dest.min_id, overlap.min_id - 1));
        }
        if src.max_id > overlap.max_id {
            ranges
                .insert_ranges
                .push(IdRange::new(overlap.max_id + 1, src.max_id));
        }
        if dest.max_id > overlap.max_id {
            ranges
                .delete_ranges
                .push(IdRange::new(overlap.max_id + 1, dest.max_id));
        }

        let differ = ChecksumRangeDiffer::new(
            self.source,
            self.destination,
            migration_type,
            self.salt,
            self.batch_size,
        );
        let outcome = differ.diff(overlap).await?;
        ranges.update_ranges = outcome.update_ranges;

        info!(
            "{}: {} insert, {} update, {} delete ranges ({} checksum comparisons over {})",
            migration_type,
            ranges.insert_ranges.len(),
            ranges.update_ranges.len(),
            ranges.delete_ranges.len(),
            outcome.comparisons,
            overlap
        );

        ranges.assert_disjoint();
        Ok(ranges)
    }
}
