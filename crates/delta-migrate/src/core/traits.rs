//! Collaborator traits the delta engine is written against.
//!
//! The engine never talks to a deployment directly. Each system (source or
//! destination) is reached through these traits:
//!
//! - [`ChecksumOracle`]: range checksums, the only call the differ makes
//! - [`MetadataProvider`]: primary types plus per-type counts and id bounds
//! - [`RowMetadataSource`]: paged `(id, parent_id)` listings for row expansion
//!
//! Implementations are usually thin clients over a remote admin endpoint. Any
//! retry or timeout policy belongs there; the engine propagates failures as-is.

use async_trait::async_trait;

use crate::error::Result;

use super::row::RowMetadata;
use super::types::{Checksum, MigrationType, MigrationTypeCount};

/// Computes a deterministic checksum over one id range of one type.
#[async_trait]
pub trait ChecksumOracle: Send + Sync {
    /// Checksum of all rows of `migration_type` with ids in `[min_id, max_id]`.
    ///
    /// Both systems must compute this identically for identical content,
    /// using the same `salt` and the same row ordering.
    async fn checksum_for_range(
        &self,
        migration_type: &MigrationType,
        salt: &str,
        min_id: i64,
        max_id: i64,
    ) -> Result<Checksum>;
}

/// Supplies the per-type snapshot that drives one planning run.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Primary types in migration order (parents before dependents).
    async fn primary_types(&self) -> Result<Vec<MigrationType>>;

    /// Count and id bounds for every type this system holds.
    async fn type_counts(&self) -> Result<Vec<MigrationTypeCount>>;
}

/// Lists row identities within an id range, for expanding delta ranges.
#[async_trait]
pub trait RowMetadataSource: Send + Sync {
    /// Up to `limit` rows with ids in `[min_id, max_id]`, ascending by id.
    async fn row_metadata_page(
        &self,
        migration_type: &MigrationType,
        min_id: i64,
        max_id: i64,
        limit: usize,
    ) -> Result<Vec<RowMetadata>>;
}

/// Everything the orchestrator needs from one deployment.
pub trait MigrationSystem: ChecksumOracle + MetadataProvider + RowMetadataSource {
    /// Short name used in logs and errors ("source", "prod", ...).
    fn name(&self) -> &str;
}
