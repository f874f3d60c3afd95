//! Dependency-level bucketizer.

use super::grouping::{GroupingStore, ParentKey};
use super::BucketProvider;
use crate::core::RowMetadata;
use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// What a bucketize pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketizeSummary {
    /// Number of buckets opened (one per dependency depth).
    pub levels: usize,
    /// Total ids written across all buckets.
    pub rows: usize,
}

/// Split `rows` into dependency levels, one bucket per level.
///
/// Level 0 holds the anchors: rows without a parent and rows whose parent is
/// not part of the input (already migrated). Every later level holds the
/// children of the previous one, so a child always lands strictly after its
/// parent when the parent is in the input.
pub fn bucketize<I, G, P>(rows: I, store: &mut G, provider: &mut P) -> Result<BucketizeSummary>
where
    I: IntoIterator<Item = Result<RowMetadata>>,
    G: GroupingStore + ?Sized,
    P: BucketProvider<i64> + ?Sized,
{
    for row in rows {
        store.insert(&row?)?;
    }
    if store.is_empty() {
        return Ok(BucketizeSummary::default());
    }

    let mut resolved: HashSet<ParentKey> = store
        .keys()
        .into_iter()
        .filter(|key| match key {
            ParentKey::Root => true,
            ParentKey::Id(id) => !store.contains_id(*id),
        })
        .collect();
    if resolved.is_empty() {
        return Err(MigrateError::NoDependencyAnchor);
    }

    let mut summary = BucketizeSummary::default();
    while !store.is_empty() {
        let ready: Vec<ParentKey> = store
            .keys()
            .into_iter()
            .filter(|key| resolved.contains(key))
            .collect();
        if ready.is_empty() {
            return Err(MigrateError::UnresolvableDependencies {
                remaining: store.len(),
            });
        }

        let bucket = provider.new_bucket()?;
        let mut level_ids = Vec::new();
        for key in &ready {
            for id in store.take_children(key)? {
                bucket.append(id)?;
                level_ids.push(id);
            }
        }
        debug!(
            "Bucket level {}: {} ids from {} parent groups",
            summary.levels,
            level_ids.len(),
            ready.len()
        );
        summary.levels += 1;
        summary.rows += level_ids.len();
        resolved.extend(level_ids.into_iter().map(ParentKey::Id));
    }

    Ok(summary)
}
