//! In-memory reference system backed by a JSON snapshot.
//!
//! Implements every collaborator trait over a per-type `BTreeMap`, so a whole
//! planning run can be executed locally: against snapshot files from the CLI,
//! or against hand-built fixtures in tests.

use crate::core::{
    Checksum, ChecksumOracle, MetadataProvider, MigrationSystem, MigrationType,
    MigrationTypeCount, RowMetadata, RowMetadataSource,
};
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One row in a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Content version; any change to the row must change it.
    #[serde(default)]
    pub etag: String,
}

/// All rows of one type in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSnapshot {
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    #[serde(default)]
    pub rows: Vec<SnapshotRow>,
}

/// Snapshot file layout. Types are listed in migration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub types: Vec<TypeSnapshot>,
}

#[derive(Debug, Clone)]
struct StoredRow {
    parent_id: Option<i64>,
    etag: String,
}

/// A deployment held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemorySystem {
    name: String,
    order: Vec<MigrationType>,
    tables: HashMap<MigrationType, BTreeMap<i64, StoredRow>>,
}

impl MemorySystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Vec::new(),
            tables: HashMap::new(),
        }
    }

    /// Load a snapshot file.
    pub fn load<P: AsRef<Path>>(name: impl Into<String>, path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Self::from_snapshot(name, snapshot)
    }

    /// Build from a parsed snapshot. Duplicate types or ids are rejected.
    pub fn from_snapshot(name: impl Into<String>, snapshot: Snapshot) -> Result<Self> {
        let mut system = Self::new(name);
        for table in snapshot.types {
            if system.tables.contains_key(&table.migration_type) {
                return Err(MigrateError::Config(format!(
                    "snapshot for {} lists type {} twice",
                    system.name, table.migration_type
                )));
            }
            system.add_type(table.migration_type.clone());
            for row in table.rows {
                if system.contains(&table.migration_type, row.id) {
                    return Err(MigrateError::Config(format!(
                        "snapshot for {} has duplicate id {} in type {}",
                        system.name, row.id, table.migration_type
                    )));
                }
                system.upsert(&table.migration_type, row);
            }
        }
        Ok(system)
    }

    /// Register a type (appended to the migration order) if it is new.
    pub fn add_type(&mut self, migration_type: MigrationType) {
        if !self.tables.contains_key(&migration_type) {
            self.order.push(migration_type.clone());
            self.tables.insert(migration_type, BTreeMap::new());
        }
    }

    /// Insert or replace a row, registering its type if needed.
    pub fn upsert(&mut self, migration_type: &MigrationType, row: SnapshotRow) {
        self.add_type(migration_type.clone());
        if let Some(table) = self.tables.get_mut(migration_type) {
            table.insert(
                row.id,
                StoredRow {
                    parent_id: row.parent_id,
                    etag: row.etag,
                },
            );
        }
    }

    pub fn remove(&mut self, migration_type: &MigrationType, id: i64) -> bool {
        self.tables
            .get_mut(migration_type)
            .map(|t| t.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn contains(&self, migration_type: &MigrationType, id: i64) -> bool {
        self.tables
            .get(migration_type)
            .map(|t| t.contains_key(&id))
            .unwrap_or(false)
    }

    /// Every field is framed (fixed-width integers, length-prefixed strings,
    /// a tag byte for the parent) so no etag content can shift a boundary.
    fn range_checksum(
        &self,
        migration_type: &MigrationType,
        salt: &str,
        min_id: i64,
        max_id: i64,
    ) -> Checksum {
        let mut hasher = Sha256::new();
        hash_str(&mut hasher, salt);
        if let Some(table) = self.tables.get(migration_type) {
            for (id, row) in table.range(min_id..=max_id) {
                hasher.update(id.to_be_bytes());
                hash_str(&mut hasher, &row.etag);
                match row.parent_id {
                    Some(parent) => {
                        hasher.update([1u8]);
                        hasher.update(parent.to_be_bytes());
                    }
                    None => hasher.update([0u8]),
                }
            }
        }
        Checksum::new(hex::encode(hasher.finalize()))
    }
}

fn hash_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

#[async_trait]
impl ChecksumOracle for MemorySystem {
    async fn checksum_for_range(
        &self,
        migration_type: &MigrationType,
        salt: &str,
        min_id: i64,
        max_id: i64,
    ) -> Result<Checksum> {
        if min_id > max_id {
            return Err(MigrateError::InvalidRange { min_id, max_id });
        }
        Ok(self.range_checksum(migration_type, salt, min_id, max_id))
    }
}

#[async_trait]
impl MetadataProvider for MemorySystem {
    async fn primary_types(&self) -> Result<Vec<MigrationType>> {
        Ok(self.order.clone())
    }

    async fn type_counts(&self) -> Result<Vec<MigrationTypeCount>> {
        Ok(self
            .order
            .iter()
            .map(|t| {
                let table = self.tables.get(t);
                MigrationTypeCount {
                    migration_type: t.clone(),
                    count: table.map(|r| r.len() as i64).unwrap_or(0),
                    min_id: table.and_then(|r| r.keys().next().copied()),
                    max_id: table.and_then(|r| r.keys().next_back().copied()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl RowMetadataSource for MemorySystem {
    async fn row_metadata_page(
        &self,
        migration_type: &MigrationType,
        min_id: i64,
        max_id: i64,
        limit: usize,
    ) -> Result<Vec<RowMetadata>> {
        if min_id > max_id {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .get(migration_type)
            .map(|table| {
                table
                    .range(min_id..=max_id)
                    .take(limit)
                    .map(|(id, row)| RowMetadata::new(*id, row.parent_id))
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl MigrationSystem for MemorySystem {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>, etag: &str) -> SnapshotRow {
        SnapshotRow {
            id,
            parent_id,
            etag: etag.to_string(),
        }
    }

    fn system(rows: &[SnapshotRow]) -> MemorySystem {
        let mut s = MemorySystem::new("test");
        let ty = MigrationType::new("NODE");
        for r in rows {
            s.upsert(&ty, r.clone());
        }
        s
    }

    #[tokio::test]
    async fn test_identical_content_identical_checksum() {
        let ty = MigrationType::new("NODE");
        let a = system(&[row(1, None, "e1"), row(2, Some(1), "e2")]);
        let b = system(&[row(2, Some(1), "e2"), row(1, None, "e1")]);
        assert_eq!(
            a.checksum_for_range(&ty, "salt", 1, 2).await.unwrap(),
            b.checksum_for_range(&ty, "salt", 1, 2).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_checksum_sensitive_to_etag_parent_and_salt() {
        let ty = MigrationType::new("NODE");
        let base = system(&[row(1, None, "e1")]);
        let etag = system(&[row(1, None, "e1b")]);
        let parent = system(&[row(1, Some(7), "e1")]);
        let sum = |s: &MemorySystem, salt: &'static str| {
            let s = s.clone();
            let ty = ty.clone();
            async move { s.checksum_for_range(&ty, salt, 1, 1).await.unwrap() }
        };
        let expected = sum(&base, "salt").await;
        assert_ne!(expected, sum(&etag, "salt").await);
        assert_ne!(expected, sum(&parent, "salt").await);
        assert_ne!(expected, sum(&base, "other").await);
    }

    #[tokio::test]
    async fn test_delimiters_in_etag_cannot_merge_rows() {
        let ty = MigrationType::new("NODE");
        // Joined on ':' and ';' both would read "1:e:NULL;2:f:NULL;"
        let merged = system(&[row(1, None, "e:NULL;2:f")]);
        let split = system(&[row(1, None, "e"), row(2, None, "f")]);
        assert_ne!(
            merged.checksum_for_range(&ty, "s", 1, 2).await.unwrap(),
            split.checksum_for_range(&ty, "s", 1, 2).await.unwrap()
        );

        let shifted = system(&[row(1, None, "a;"), row(2, None, "b")]);
        let unshifted = system(&[row(1, None, "a"), row(2, None, ";b")]);
        assert_ne!(
            shifted.checksum_for_range(&ty, "s", 1, 2).await.unwrap(),
            unshifted.checksum_for_range(&ty, "s", 1, 2).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_rows_outside_range_do_not_affect_checksum() {
        let ty = MigrationType::new("NODE");
        let a = system(&[row(1, None, "e1"), row(50, None, "x")]);
        let b = system(&[row(1, None, "e1"), row(50, None, "y")]);
        assert_eq!(
            a.checksum_for_range(&ty, "s", 1, 49).await.unwrap(),
            b.checksum_for_range(&ty, "s", 1, 49).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_type_counts_and_pages() {
        let ty = MigrationType::new("NODE");
        let mut s = system(&[row(5, None, "a"), row(9, Some(5), "b"), row(7, Some(5), "c")]);
        s.add_type(MigrationType::new("EMPTY"));

        let counts = s.type_counts().await.unwrap();
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[0].min_id, Some(5));
        assert_eq!(counts[0].max_id, Some(9));
        assert_eq!(counts[1].count, 0);
        assert_eq!(counts[1].min_id, None);

        let page = s.row_metadata_page(&ty, 6, 100, 1).await.unwrap();
        assert_eq!(page, vec![RowMetadata::child(7, 5)]);
    }

    #[test]
    fn test_snapshot_json_round_trip_and_duplicates() {
        let json = r#"{"types":[{"type":"NODE","rows":[{"id":1,"parent_id":null,"etag":"a"},{"id":2,"parent_id":1}]}]}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let s = MemorySystem::from_snapshot("src", snapshot).unwrap();
        assert!(s.contains(&MigrationType::new("NODE"), 2));
        assert_eq!(s.name(), "src");

        let dup = r#"{"types":[{"type":"NODE","rows":[{"id":1},{"id":1}]}]}"#;
        let snapshot: Snapshot = serde_json::from_str(dup).unwrap();
        assert!(MemorySystem::from_snapshot("src", snapshot).is_err());
    }
}
