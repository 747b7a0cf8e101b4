//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.connection_string.is_none() {
        if config.source.path.as_os_str().is_empty() {
            return Err(MigrateError::Config(
                "source.path is required (or set source.connection_string)".into(),
            ));
        }
        if config.source.driver.is_empty() {
            return Err(MigrateError::Config("source.driver must not be empty".into()));
        }
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(blank) = config.migration.tables.iter().find(|t| t.trim().is_empty()) {
        return Err(MigrateError::Config(format!(
            "migration.tables contains a blank entry: {:?}",
            blank
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                path: PathBuf::from("C:\\data\\legacy.accdb"),
                driver: "Microsoft Access Driver (*.mdb, *.accdb)".to_string(),
                password: None,
                connection_string: None,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "target_db".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                encrypt: false,
                trust_server_cert: true,
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
    fn test_missing_source_path() {
        let mut config = valid_config();
        config.source.path = PathBuf::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_string_replaces_path() {
        let mut config = valid_config();
        config.source.path = PathBuf::new();
        config.source.connection_string = Some("DSN=Legacy;".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_blank_table_entry() {
        let mut config = valid_config();
        config.migration.tables = vec!["Customers".into(), "  ".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = Some("super_secret_password_123".to_string());
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
