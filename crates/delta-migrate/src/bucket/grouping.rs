//! Parent-to-children grouping used by the bucketizer.
//!
//! The grouping is the only structure whose size grows with the input, so it
//! sits behind [`GroupingStore`]. [`MemoryGroupingStore`] is the in-memory
//! implementation; an external sorted store can stand in for very large runs.

use crate::core::RowMetadata;
use crate::error::Result;
use std::collections::{BTreeMap, HashSet};

/// Grouping key: either a real parent id or the sentinel for true roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParentKey {
    /// Rows without a parent.
    Root,
    Id(i64),
}

impl From<Option<i64>> for ParentKey {
    fn from(parent_id: Option<i64>) -> Self {
        match parent_id {
            Some(id) => ParentKey::Id(id),
            None => ParentKey::Root,
        }
    }
}

/// Storage for the parent -> children map built in the bucketizer's first pass.
pub trait GroupingStore {
    /// Record the row's id and file it under its parent.
    fn insert(&mut self, row: &RowMetadata) -> Result<()>;

    /// Whether `id` appeared as a row id in the input.
    fn contains_id(&self, id: i64) -> bool;

    /// Remaining parent keys in a stable order.
    fn keys(&self) -> Vec<ParentKey>;

    /// Remove a parent's entry, returning its children in input order.
    fn take_children(&mut self, key: &ParentKey) -> Result<Vec<i64>>;

    /// Number of remaining parent entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory grouping ordered by key (`Root` first, then ascending ids).
#[derive(Debug, Default)]
pub struct MemoryGroupingStore {
    children: BTreeMap<ParentKey, Vec<i64>>,
    ids: HashSet<i64>,
}

impl MemoryGroupingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupingStore for MemoryGroupingStore {
    fn insert(&mut self, row: &RowMetadata) -> Result<()> {
        self.ids.insert(row.id);
        self.children
            .entry(ParentKey::from(row.parent_id))
            .or_default()
            .push(row.id);
        Ok(())
    }

    fn contains_id(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    fn keys(&self) -> Vec<ParentKey> {
        self.children.keys().copied().collect()
    }

    fn take_children(&mut self, key: &ParentKey) -> Result<Vec<i64>> {
        Ok(self.children.remove(key).unwrap_or_default())
    }

    fn len(&self) -> usize {
        self.children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_children_in_input_order() {
        let mut store = MemoryGroupingStore::new();
        for row in [
            RowMetadata::child(3, 1),
            RowMetadata::root(1),
            RowMetadata::child(2, 1),
        ] {
            store.insert(&row).unwrap();
        }
        assert_eq!(store.keys(), vec![ParentKey::Root, ParentKey::Id(1)]);
        assert!(store.contains_id(3));
        assert!(!store.contains_id(4));
        assert_eq!(store.take_children(&ParentKey::Id(1)).unwrap(), vec![3, 2]);
        assert_eq!(store.len(), 1);
    }
}
