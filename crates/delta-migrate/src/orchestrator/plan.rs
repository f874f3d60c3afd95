//! Result types produced by a planning run.

use crate::bucket::{BucketizeSummary, LevelFile};
use crate::core::{MigrationType, TypeToMigrateMetadata};
use crate::delta::{DeltaCounts, DeltaRanges};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of planning one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeStatus {
    /// Both systems already agree.
    InSync,
    /// A delta was computed.
    Planned,
    Failed,
}

/// Row spools written for one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSpool {
    pub dir: PathBuf,
    pub create: PathBuf,
    pub update: PathBuf,
    pub delete: PathBuf,
    /// Create ids split into dependency levels, shallowest first.
    pub create_levels: Vec<LevelFile>,
    pub bucketize: BucketizeSummary,
}

/// Plan for one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypePlan {
    pub migration_type: MigrationType,
    pub status: TypeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: TypeToMigrateMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<DeltaRanges>,
    /// Row counts, only known when rows were spooled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<DeltaCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool: Option<TypeSpool>,
    pub duration_seconds: f64,
}

impl TypePlan {
    pub(crate) fn failed(
        metadata: TypeToMigrateMetadata,
        error: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            migration_type: metadata.migration_type.clone(),
            status: TypeStatus::Failed,
            error: Some(error.into()),
            metadata,
            ranges: None,
            counts: None,
            spool: None,
            duration_seconds,
        }
    }

    pub fn has_deletes(&self) -> bool {
        match (&self.counts, &self.ranges) {
            (Some(c), _) => c.delete > 0,
            (None, Some(r)) => !r.delete_ranges.is_empty(),
            _ => false,
        }
    }

    pub fn has_creates(&self) -> bool {
        match (&self.counts, &self.ranges) {
            (Some(c), _) => c.create > 0,
            (None, Some(r)) => !r.insert_ranges.is_empty(),
            _ => false,
        }
    }

    pub fn has_updates(&self) -> bool {
        match (&self.counts, &self.ranges) {
            (Some(c), _) => c.update > 0,
            (None, Some(r)) => !r.update_ranges.is_empty(),
            _ => false,
        }
    }
}

/// Result of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, failed or cancelled.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub types_total: usize,
    pub types_in_sync: usize,
    pub types_failed: usize,

    /// List of failed type names.
    pub failed_types: Vec<MigrationType>,

    /// Deletes run first, children before parents.
    pub delete_order: Vec<MigrationType>,
    pub create_order: Vec<MigrationType>,
    pub update_order: Vec<MigrationType>,

    /// Per-type plans in migration order.
    pub types: Vec<TypePlan>,
}

impl PlanResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Derive the phase orders from per-type plans in migration order.
pub(crate) fn phase_orders(
    types: &[TypePlan],
) -> (Vec<MigrationType>, Vec<MigrationType>, Vec<MigrationType>) {
    let delete_order = types
        .iter()
        .rev()
        .filter(|p| p.has_deletes())
        .map(|p| p.migration_type.clone())
        .collect();
    let create_order = types
        .iter()
        .filter(|p| p.has_creates())
        .map(|p| p.migration_type.clone())
        .collect();
    let update_order = types
        .iter()
        .filter(|p| p.has_updates())
        .map(|p| p.migration_type.clone())
        .collect();
    (delete_order, create_order, update_order)
}
