//! Error types for the delta planning library.

use thiserror::Error;

/// Main error type for delta planning operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An id range supplied from outside had min > max
    #[error("Invalid id range [{min_id}, {max_id}]: min must not exceed max")]
    InvalidRange { min_id: i64, max_id: i64 },

    /// Inconsistent per-type bounds/counts metadata
    #[error("Malformed metadata for type {migration_type}: {message}")]
    MalformedMetadata {
        migration_type: String,
        message: String,
    },

    /// A spooled row metadata line could not be parsed
    #[error("Spool parse error at line {line}: {message}")]
    SpoolParse { line: u64, message: String },

    /// Dependency graph has no root and no external parent to start from
    #[error("Dependency graph has no anchor: every parent is itself a row in the input")]
    NoDependencyAnchor,

    /// Some rows can never be leveled (cycle not reachable from any anchor)
    #[error("Dependency graph cannot be leveled: {remaining} parent groups never resolve")]
    UnresolvableDependencies { remaining: usize },

    /// Checksum, count or row metadata collaborator failed
    #[error("Oracle call to {system} failed: {message}")]
    Oracle { system: String, message: String },

    /// Planning failed for one migration type
    #[error("Planning failed for type {migration_type}: {message}")]
    TypeFailed {
        migration_type: String,
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Migration planning cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create an Oracle error naming the system that failed
    pub fn oracle(system: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Oracle {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Create a MalformedMetadata error
    pub fn malformed(migration_type: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::MalformedMetadata {
            migration_type: migration_type.into(),
            message: message.into(),
        }
    }

    /// Create a TypeFailed error
    pub fn type_failed(migration_type: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::TypeFailed {
            migration_type: migration_type.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::InvalidRange { .. }
            | MigrateError::MalformedMetadata { .. }
            | MigrateError::SpoolParse { .. }
            | MigrateError::NoDependencyAnchor
            | MigrateError::UnresolvableDependencies { .. } => 3,
            MigrateError::Oracle { .. } | MigrateError::TypeFailed { .. } => 4,
            MigrateError::Cancelled => 130,
            MigrateError::Io(_) | MigrateError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for delta planning operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
