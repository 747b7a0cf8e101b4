//! # access-mssql-migrate
//!
//! Microsoft Access to SQL Server migration library.
//!
//! This library moves the schema and data of an Access database into a
//! SQL Server database:
//!
//! - **Schema introspection** of Access tables, indexes and relationships over ODBC
//! - **Type mapping** from Access column types to SQL Server types
//! - **DDL generation** for tables, primary keys, indexes and foreign keys
//! - **Batched transfers** with one transaction per batch
//! - **Progress events** for every stage, table and batch
//!
//! ## Example
//!
//! ```rust,no_run
//! use access_mssql_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> access_mssql_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(&config)?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, TargetMode};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationOutcome, MigrationPlan, MigrationResult, Orchestrator,
    ProgressEvent, RunStatus, Stage,
};
pub use source::{SourceReader, TableData, TableSchema};
pub use target::{MssqlTarget, SqlValue, TargetWriter};
pub use typemap::{access_to_mssql, TypeMapping};
