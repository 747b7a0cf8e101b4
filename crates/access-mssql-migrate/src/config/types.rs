//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Access).
    pub source: SourceConfig,

    /// Target database configuration (SQL Server).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (Access) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the `.mdb` / `.accdb` file.
    #[serde(default)]
    pub path: PathBuf,

    /// ODBC driver name.
    #[serde(default = "default_access_driver")]
    pub driver: String,

    /// Database password, if the file is password protected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Full ODBC connection string. Overrides `path`, `driver` and `password` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

/// Target database (SQL Server) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

/// What to do with a target table that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Drop the existing table and create it again (destroys target data).
    #[default]
    DropRecreate,
    /// Abort the run instead of touching an existing table.
    FailIfExists,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Tables to migrate (case-insensitive). Empty means every table.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Create indexes after the data transfer (default: true).
    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Create foreign keys after the indexes (default: true).
    #[serde(default = "default_true")]
    pub create_foreign_keys: bool,

    /// Rows per insert transaction (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Existing target table handling (default: drop_recreate).
    #[serde(default)]
    pub target_mode: TargetMode,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            create_indexes: true,
            create_foreign_keys: true,
            batch_size: default_batch_size(),
            target_mode: TargetMode::default(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("path", &self.path)
            .field("driver", &self.driver)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

fn default_access_driver() -> String {
    "Microsoft Access Driver (*.mdb, *.accdb)".to_string()
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}
