//! # delta-migrate
//!
//! Delta planning between two deployments of the same record store.
//!
//! Given a source and a destination that expose per-type counts, range
//! checksums and `(id, parent_id)` row metadata, this library works out
//! the minimal set of edits that brings the destination in line:
//!
//! - **Range checksums** narrow each type's shared id space down to the
//!   sub-ranges whose content differs
//! - **Insert and delete ranges** cover ids present on one side only
//! - **Row spools** expand ranges into create/update/delete row files
//! - **Dependency levels** order rows to create so parents land first
//!
//! ## Example
//!
//! ```rust,no_run
//! use delta_migrate::{Config, MemorySystem, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> delta_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = MemorySystem::load(&config.source.name, &config.source.snapshot)?;
//!     let destination =
//!         MemorySystem::load(&config.destination.name, &config.destination.snapshot)?;
//!     let orchestrator = Orchestrator::new(config, Arc::new(source), Arc::new(destination))?;
//!     let result = orchestrator.run(None).await?;
//!     println!("Planned {} types", result.types_total);
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod core;
pub mod delta;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod spool;

// Re-exports for convenient access
pub use bucket::{
    bucketize, Bucket, BucketProvider, BucketizeSummary, ListBucketProvider, MemoryGroupingStore,
    SpoolBucketProvider,
};
pub use config::{Config, MigrationConfig, SystemConfig};
pub use crate::core::{
    ChecksumOracle, IdRange, MetadataProvider, MigrationSystem, MigrationType, RowMetadata,
    RowMetadataSource, TypeToMigrateMetadata,
};
pub use delta::{DeltaBuilder, DeltaCounts, DeltaFinder, DeltaRanges};
pub use error::{MigrateError, Result};
pub use memory::MemorySystem;
pub use orchestrator::{Orchestrator, PlanResult, TypePlan, TypeStatus};
pub use spool::{RowMetadataReader, RowMetadataWriter, SpoolFile};
