//! Value types and collaborator traits shared by the whole engine.
//!
//! - [`range`]: inclusive id intervals
//! - [`row`]: `(id, parent_id)` row identity
//! - [`types`]: migration types, checksums and per-type bounds/counts
//! - [`traits`]: the seams to the source and destination systems

pub mod range;
pub mod row;
pub mod traits;
pub mod types;

pub use range::{ranges_are_disjoint, IdRange};
pub use row::RowMetadata;
pub use traits::{ChecksumOracle, MetadataProvider, MigrationSystem, RowMetadataSource};
pub use types::{
    build_type_to_migrate_metadata, Checksum, MigrationType, MigrationTypeCount,
    TypeToMigrateMetadata,
};
