//! Configuration type definitions.

use crate::core::MigrationType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// System being migrated from.
    pub source: SystemConfig,

    /// System being brought in sync.
    pub destination: SystemConfig,

    /// Planning behavior.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Resolve relative snapshot and spool paths against `base`
    /// (normally the directory holding the config file).
    pub fn resolve_paths(&mut self, base: &Path) {
        self.source.snapshot = resolve(base, &self.source.snapshot);
        self.destination.snapshot = resolve(base, &self.destination.snapshot);
        if let Some(dir) = &self.migration.spool_dir {
            self.migration.spool_dir = Some(resolve(base, dir));
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && !path.as_os_str().is_empty() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// One side of the migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Display name used in logs and errors.
    pub name: String,

    /// JSON snapshot file describing this system's rows.
    pub snapshot: PathBuf,
}

/// Migration behavior configuration.
///
/// Unset knobs fall back to the defaults in the `get_*` accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Ranges narrower than this are reported as a whole instead of split.
    #[serde(default)]
    pub batch_size: Option<u64>,

    /// Rows fetched per page when expanding ranges.
    #[serde(default)]
    pub page_size: Option<usize>,

    /// Types planned at the same time.
    #[serde(default)]
    pub parallel_types: Option<usize>,

    /// Checksum salt. A fresh UUID is used when unset.
    #[serde(default)]
    pub salt: Option<String>,

    /// Where row spools are written. Ranges only when unset.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Only plan these types (empty = all).
    #[serde(default)]
    pub include_types: Vec<MigrationType>,

    /// Never plan these types.
    #[serde(default)]
    pub exclude_types: Vec<MigrationType>,
}

impl MigrationConfig {
    pub fn get_batch_size(&self) -> u64 {
        self.batch_size.unwrap_or(25_000)
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size.unwrap_or(10_000)
    }

    pub fn get_parallel_types(&self) -> usize {
        self.parallel_types.unwrap_or(4)
    }

    /// Whether `migration_type` passes the include/exclude filters.
    pub fn selects(&self, migration_type: &MigrationType) -> bool {
        (self.include_types.is_empty() || self.include_types.contains(migration_type))
            && !self.exclude_types.contains(migration_type)
    }
}
