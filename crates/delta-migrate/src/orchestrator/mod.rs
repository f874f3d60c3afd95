//! Planning orchestrator - main workflow coordinator.
//!
//! Reads type metadata from both systems, runs the delta finder for every
//! type to migrate and, when a spool directory is configured, expands the
//! ranges into row spools and dependency levels.

mod plan;

pub use plan::{PlanResult, TypePlan, TypeSpool, TypeStatus};

use crate::bucket::{bucketize, MemoryGroupingStore, SpoolBucketProvider};
use crate::config::Config;
use crate::core::{build_type_to_migrate_metadata, MigrationSystem, TypeToMigrateMetadata};
use crate::delta::{DeltaBuilder, DeltaCounts, DeltaFinder, DeltaRanges, DeltaWriters};
use crate::error::Result;
use crate::spool::SpoolFile;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Planning orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn MigrationSystem>,
    destination: Arc<dyn MigrationSystem>,
}

impl Orchestrator {
    /// Create a new orchestrator over already-opened systems.
    ///
    /// The configuration is validated here, so a bad knob fails the run
    /// up front instead of inside a type.
    pub fn new(
        config: Config,
        source: Arc<dyn MigrationSystem>,
        destination: Arc<dyn MigrationSystem>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            destination,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Counts and bounds on both sides for every type that would be planned.
    ///
    /// Types to migrate are the destination's primary types that the source
    /// also has, in destination order, narrowed by the include/exclude lists.
    pub async fn counts(&self) -> Result<Vec<TypeToMigrateMetadata>> {
        let (src_types, dest_types) = tokio::join!(
            self.source.primary_types(),
            self.destination.primary_types()
        );
        let (src_types, dest_types) = (src_types?, dest_types?);

        let mut types = Vec::with_capacity(dest_types.len());
        for t in dest_types {
            if !src_types.contains(&t) {
                debug!("{}: not present at {}, skipping", t, self.source.name());
            } else if !self.config.migration.selects(&t) {
                debug!("{}: filtered out by include/exclude lists", t);
            } else {
                types.push(t);
            }
        }

        let (src_counts, dest_counts) = tokio::join!(
            self.source.type_counts(),
            self.destination.type_counts()
        );
        Ok(build_type_to_migrate_metadata(
            &src_counts?,
            &dest_counts?,
            &types,
        ))
    }

    /// Run the planner.
    ///
    /// Fails only when type metadata cannot be read. A type that fails to
    /// plan is reported in the result and does not affect the others.
    pub async fn run(&self, cancel: Option<CancellationToken>) -> Result<PlanResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = cancel.unwrap_or_default();
        let salt = self
            .config
            .migration
            .salt
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            "Starting delta plan run: {} ({} -> {})",
            run_id,
            self.source.name(),
            self.destination.name()
        );

        info!("Phase 1: Reading type metadata");
        let metadata = self.counts().await?;
        info!("Found {} types to plan", metadata.len());

        let spool_root = self
            .config
            .migration
            .spool_dir
            .as_ref()
            .map(|dir| dir.join(&run_id));
        let parallel = self.config.migration.get_parallel_types();

        info!(
            "Phase 2: Finding deltas (batch size {}, {} types at a time)",
            self.config.migration.get_batch_size(),
            parallel
        );
        let types: Vec<TypePlan> = stream::iter(
            metadata
                .into_iter()
                .enumerate()
                .map(|(position, m)| {
                    self.plan_type(position, m, &salt, spool_root.as_deref(), &cancel)
                }),
        )
        .buffered(parallel)
        .collect()
        .await;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let failed_types: Vec<_> = types
            .iter()
            .filter(|p| p.status == TypeStatus::Failed)
            .map(|p| p.migration_type.clone())
            .collect();
        let types_in_sync = types
            .iter()
            .filter(|p| p.status == TypeStatus::InSync)
            .count();
        let (delete_order, create_order, update_order) = plan::phase_orders(&types);

        let status = if cancel.is_cancelled() {
            "cancelled"
        } else if !failed_types.is_empty() {
            "failed"
        } else {
            "completed"
        };

        let result = PlanResult {
            run_id,
            status: status.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            types_total: types.len(),
            types_in_sync,
            types_failed: failed_types.len(),
            failed_types,
            delete_order,
            create_order,
            update_order,
            types,
        };

        info!(
            "Plan {}: {} types ({} in sync, {} failed) in {:.1}s",
            result.status,
            result.types_total,
            result.types_in_sync,
            result.types_failed,
            result.duration_seconds
        );

        Ok(result)
    }

    async fn plan_type(
        &self,
        position: usize,
        metadata: TypeToMigrateMetadata,
        salt: &str,
        spool_root: Option<&Path>,
        cancel: &CancellationToken,
    ) -> TypePlan {
        let started = Instant::now();
        if cancel.is_cancelled() {
            info!("{}: cancellation requested, not starting", metadata.migration_type);
            return TypePlan::failed(metadata, "cancelled", 0.0);
        }

        let outcome = self
            .find_and_spool(position, &metadata, salt, spool_root)
            .await;
        match outcome {
            Ok((ranges, counts, spool)) => {
                let elapsed = started.elapsed().as_secs_f64();
                let status = if ranges.is_in_sync() {
                    TypeStatus::InSync
                } else {
                    TypeStatus::Planned
                };
                info!(
                    "{}: {} insert, {} update, {} delete ranges ({:.2}s)",
                    metadata.migration_type,
                    ranges.insert_ranges.len(),
                    ranges.update_ranges.len(),
                    ranges.delete_ranges.len(),
                    elapsed
                );
                TypePlan {
                    migration_type: metadata.migration_type.clone(),
                    status,
                    error: None,
                    metadata,
                    ranges: Some(ranges),
                    counts,
                    spool,
                    duration_seconds: elapsed,
                }
            }
            Err(e) => {
                warn!("{}: planning failed: {}", metadata.migration_type, e);
                let elapsed = started.elapsed().as_secs_f64();
                let message = e.to_string();
                TypePlan::failed(metadata, message, elapsed)
            }
        }
    }

    async fn find_and_spool(
        &self,
        position: usize,
        metadata: &TypeToMigrateMetadata,
        salt: &str,
        spool_root: Option<&Path>,
    ) -> Result<(DeltaRanges, Option<DeltaCounts>, Option<TypeSpool>)> {
        let finder = DeltaFinder::new(
            metadata,
            self.source.as_ref(),
            self.destination.as_ref(),
            salt,
            self.config.migration.get_batch_size(),
        );
        let ranges = finder.find_delta_ranges().await?;

        let Some(root) = spool_root else {
            return Ok((ranges, None, None));
        };

        let dir = root.join(spool_dir_name(position, metadata.migration_type.as_str()));
        std::fs::create_dir_all(&dir)?;
        let (create, create_writer) = SpoolFile::create(dir.join("create.rows"))?;
        let (update, update_writer) = SpoolFile::create(dir.join("update.rows"))?;
        let (delete, delete_writer) = SpoolFile::create(dir.join("delete.rows"))?;
        let mut writers = DeltaWriters {
            create: create_writer,
            update: update_writer,
            delete: delete_writer,
        };

        let builder = DeltaBuilder::new(
            &metadata.migration_type,
            self.source.as_ref(),
            self.destination.as_ref(),
            self.config.migration.get_page_size(),
        );
        let counts = builder.build(&ranges, &mut writers).await?;
        writers.flush()?;
        drop(writers);

        let mut store = MemoryGroupingStore::new();
        let mut provider = SpoolBucketProvider::new(dir.join("create-levels"))?;
        let summary = bucketize(create.open()?, &mut store, &mut provider)?;
        let create_levels = provider.finish()?;
        debug!(
            "{}: {} create rows in {} levels",
            metadata.migration_type, summary.rows, summary.levels
        );

        let spool = TypeSpool {
            dir,
            create: create.path().to_path_buf(),
            update: update.path().to_path_buf(),
            delete: delete.path().to_path_buf(),
            create_levels,
            bucketize: summary,
        };
        Ok((ranges, Some(counts), Some(spool)))
    }
}

/// Directory name for a type's spools: `<position>-<name>`, with anything in
/// the name outside `[A-Za-z0-9_-]` replaced by `_`.
///
/// The migration-order position keeps names unique when two types sanitize
/// to the same string.
fn spool_dir_name(position: usize, name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{:04}-{}", position, sanitized)
}
