//! Per-type metadata exchanged with the two systems.

use super::range::IdRange;
use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A named category of records sharing one id space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationType(pub String);

impl MigrationType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MigrationType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque checksum token. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(pub String);

impl Checksum {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// Count and id bounds one system reports for one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTypeCount {
    pub migration_type: MigrationType,
    pub count: i64,
    /// `None` when the system holds no rows of this type.
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
}

/// Bounds and counts for one type on both systems.
///
/// A missing min/max means "no rows of this type on that system".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeToMigrateMetadata {
    pub migration_type: MigrationType,
    pub src_min_id: Option<i64>,
    pub src_max_id: Option<i64>,
    pub src_count: Option<i64>,
    pub dest_min_id: Option<i64>,
    pub dest_max_id: Option<i64>,
    pub dest_count: Option<i64>,
}

impl TypeToMigrateMetadata {
    /// Reject inconsistent bounds before any delta computation.
    pub fn validate(&self) -> Result<()> {
        validate_side(
            &self.migration_type,
            "source",
            self.src_min_id,
            self.src_max_id,
            self.src_count,
        )?;
        validate_side(
            &self.migration_type,
            "destination",
            self.dest_min_id,
            self.dest_max_id,
            self.dest_count,
        )
    }

    /// Source id bounds, `None` when the source is empty.
    pub fn src_range(&self) -> Option<IdRange> {
        match (self.src_min_id, self.src_max_id) {
            (Some(min), Some(max)) if min <= max => Some(IdRange::new(min, max)),
            _ => None,
        }
    }

    /// Destination id bounds, `None` when the destination is empty.
    pub fn dest_range(&self) -> Option<IdRange> {
        match (self.dest_min_id, self.dest_max_id) {
            (Some(min), Some(max)) if min <= max => Some(IdRange::new(min, max)),
            _ => None,
        }
    }
}

fn validate_side(
    migration_type: &MigrationType,
    side: &str,
    min_id: Option<i64>,
    max_id: Option<i64>,
    count: Option<i64>,
) -> Result<()> {
    match (min_id, max_id) {
        (None, None) => Ok(()),
        (Some(_), None) | (None, Some(_)) => Err(MigrateError::malformed(
            migration_type.as_str(),
            format!("{} min and max ids must both be present or both absent", side),
        )),
        (Some(min), Some(max)) => {
            if count.is_none() {
                return Err(MigrateError::malformed(
                    migration_type.as_str(),
                    format!("{} min id {} present without a count", side, min),
                ));
            }
            if min > max {
                return Err(MigrateError::malformed(
                    migration_type.as_str(),
                    format!("{} min id {} exceeds max id {}", side, min, max),
                ));
            }
            Ok(())
        }
    }
}

/// Pair up both systems' counts for the requested types, keeping their order.
///
/// A type absent from one side's counts is treated as empty there.
pub fn build_type_to_migrate_metadata(
    src_counts: &[MigrationTypeCount],
    dest_counts: &[MigrationTypeCount],
    types: &[MigrationType],
) -> Vec<TypeToMigrateMetadata> {
    let src: HashMap<&MigrationType, &MigrationTypeCount> =
        src_counts.iter().map(|c| (&c.migration_type, c)).collect();
    let dest: HashMap<&MigrationType, &MigrationTypeCount> =
        dest_counts.iter().map(|c| (&c.migration_type, c)).collect();

    types
        .iter()
        .map(|t| {
            let s = src.get(t);
            let d = dest.get(t);
            TypeToMigrateMetadata {
                migration_type: t.clone(),
                src_min_id: s.and_then(|c| c.min_id),
                src_max_id: s.and_then(|c| c.max_id),
                src_count: Some(s.map(|c| c.count).unwrap_or(0)),
                dest_min_id: d.and_then(|c| c.min_id),
                dest_max_id: d.and_then(|c| c.max_id),
                dest_count: Some(d.map(|c| c.count).unwrap_or(0)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(src: Option<(i64, i64)>, dest: Option<(i64, i64)>) -> TypeToMigrateMetadata {
        TypeToMigrateMetadata {
            migration_type: MigrationType::new("NODE"),
            src_min_id: src.map(|s| s.0),
            src_max_id: src.map(|s| s.1),
            src_count: Some(src.map(|s| s.1 - s.0 + 1).unwrap_or(0)),
            dest_min_id: dest.map(|d| d.0),
            dest_max_id: dest.map(|d| d.1),
            dest_count: Some(dest.map(|d| d.1 - d.0 + 1).unwrap_or(0)),
        }
    }

    #[test]
    fn test_valid_metadata() {
        assert!(meta(Some((1, 100)), None).validate().is_ok());
        assert!(meta(None, None).validate().is_ok());
    }

    #[test]
    fn test_min_without_count_rejected() {
        let mut m = meta(Some((1, 100)), Some((1, 50)));
        m.dest_count = None;
        let err = m.validate().unwrap_err();
        assert!(matches!(err, MigrateError::MalformedMetadata { .. }));
        assert!(err.to_string().contains("without a count"));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let m = meta(Some((100, 1)), None);
        assert!(matches!(
            m.validate(),
            Err(MigrateError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_min_without_max_rejected() {
        let mut m = meta(None, None);
        m.src_min_id = Some(4);
        m.src_count = Some(1);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_ranges() {
        let m = meta(Some((5, 9)), None);
        assert_eq!(m.src_range(), Some(IdRange::new(5, 9)));
        assert_eq!(m.dest_range(), None);
    }

    #[test]
    fn test_build_metadata_keeps_type_order_and_fills_missing() {
        let node = MigrationType::new("NODE");
        let acl = MigrationType::new("ACL");
        let src = vec![
            MigrationTypeCount {
                migration_type: acl.clone(),
                count: 3,
                min_id: Some(1),
                max_id: Some(3),
            },
            MigrationTypeCount {
                migration_type: node.clone(),
                count: 10,
                min_id: Some(100),
                max_id: Some(109),
            },
        ];
        let dest = vec![MigrationTypeCount {
            migration_type: node.clone(),
            count: 2,
            min_id: Some(100),
            max_id: Some(101),
        }];

        let built = build_type_to_migrate_metadata(&src, &dest, &[node.clone(), acl.clone()]);
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].migration_type, node);
        assert_eq!(built[0].src_count, Some(10));
        assert_eq!(built[0].dest_max_id, Some(101));
        assert_eq!(built[1].migration_type, acl);
        assert_eq!(built[1].dest_count, Some(0));
        assert_eq!(built[1].dest_min_id, None);
        assert!(built.iter().all(|m| m.validate().is_ok()));
    }
}
