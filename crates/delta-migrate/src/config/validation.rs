//! Configuration validation.

use super::{Config, SystemConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_system("source", &config.source)?;
    validate_system("destination", &config.destination)?;

    if config.source.snapshot == config.destination.snapshot {
        return Err(MigrateError::Config(
            "source and destination cannot be the same snapshot".into(),
        ));
    }

    // Only check knobs that are explicitly set
    if let Some(0) = config.migration.batch_size {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.page_size {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.parallel_types {
        return Err(MigrateError::Config(
            "migration.parallel_types must be at least 1".into(),
        ));
    }
    if let Some(salt) = &config.migration.salt {
        if salt.is_empty() {
            return Err(MigrateError::Config(
                "migration.salt cannot be empty when set".into(),
            ));
        }
    }

    if let Some(t) = config
        .migration
        .include_types
        .iter()
        .find(|t| config.migration.exclude_types.contains(t))
    {
        return Err(MigrateError::Config(format!(
            "type '{}' is both included and excluded",
            t
        )));
    }

    Ok(())
}

fn validate_system(side: &str, system: &SystemConfig) -> Result<()> {
    if system.name.is_empty() {
        return Err(MigrateError::Config(format!("{}.name is required", side)));
    }
    if system.snapshot.as_os_str().is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.snapshot is required",
            side
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::core::MigrationType;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            source: SystemConfig {
                name: "prod".to_string(),
                snapshot: PathBuf::from("source.json"),
            },
            destination: SystemConfig {
                name: "staging".to_string(),
                snapshot: PathBuf::from("dest.json"),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_name() {
        let mut config = valid_config();
        config.source.name = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_destination_snapshot() {
        let mut config = valid_config();
        config.destination.snapshot = PathBuf::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("destination.snapshot"));
    }

    #[test]
    fn test_same_snapshot_rejected() {
        let mut config = valid_config();
        config.destination.snapshot = config.source.snapshot.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_knobs_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = Some(0);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.migration.page_size = Some(0);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.migration.parallel_types = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_include_exclude_conflict() {
        let mut config = valid_config();
        config.migration.include_types = vec![MigrationType::new("NODE")];
        config.migration.exclude_types = vec![MigrationType::new("NODE")];
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains("NODE"));
    }
}
