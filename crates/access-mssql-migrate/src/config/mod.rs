//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceConfig {
    /// Build the ODBC connection string for the Access driver.
    pub fn connection_string(&self) -> String {
        if let Some(conn_str) = &self.connection_string {
            return conn_str.clone();
        }

        let mut conn_str = format!(
            "Driver={{{}}};Dbq={};",
            self.driver,
            self.path.display()
        );
        if let Some(password) = &self.password {
            conn_str.push_str(&format!("PWD={};", password));
        }
        conn_str
    }
}

impl TargetConfig {
    /// Build an ADO-style connection string (used for display with the password masked).
    pub fn display_string(&self) -> String {
        format!(
            "Server=tcp:{},{};Database={};User Id={};Password=****;Encrypt={};TrustServerCertificate={}",
            self.host, self.port, self.database, self.user, self.encrypt, self.trust_server_cert
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
source:
  path: /data/northwind.accdb
target:
  host: sql01
  database: Northwind
  user: sa
  password: secret
migration:
  tables: [Customers, Orders]
  batch_size: 500
  create_foreign_keys: false
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.target.port, 1433);
        assert!(config.target.encrypt);
        assert_eq!(config.migration.tables, vec!["Customers", "Orders"]);
        assert_eq!(config.migration.batch_size, 500);
        assert!(config.migration.create_indexes);
        assert!(!config.migration.create_foreign_keys);
        assert_eq!(config.migration.target_mode, TargetMode::DropRecreate);
        assert_eq!(
            config.source.driver,
            "Microsoft Access Driver (*.mdb, *.accdb)"
        );
    }

    #[test]
    fn test_migration_section_optional() {
        let yaml = r#"
source:
  path: legacy.mdb
target:
  host: localhost
  database: Legacy
  user: sa
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.migration.tables.is_empty());
        assert_eq!(config.migration.batch_size, 1000);
    }

    #[test]
    fn test_source_connection_string() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.source.connection_string(),
            "Driver={Microsoft Access Driver (*.mdb, *.accdb)};Dbq=/data/northwind.accdb;"
        );
    }

    #[test]
    fn test_source_connection_string_with_password_and_override() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.source.password = Some("pw".into());
        assert!(config.source.connection_string().ends_with("PWD=pw;"));

        config.source.connection_string = Some("DSN=Legacy;".into());
        assert_eq!(config.source.connection_string(), "DSN=Legacy;");
    }

    #[test]
    fn test_target_display_string_masks_password() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let display = config.target.display_string();
        assert!(display.contains("Server=tcp:sql01,1433"));
        assert!(!display.contains("secret"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.target.database, "Northwind");
    }

    #[test]
    fn test_target_mode_parsing() {
        let yaml = SAMPLE.replace("batch_size: 500", "batch_size: 500\n  target_mode: fail_if_exists");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.migration.target_mode, TargetMode::FailIfExists);
    }
}
