//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database (Access/ODBC) error
    #[error("Source database error: {0}")]
    Source(String),

    /// Target database (SQL Server) error
    #[error("Target database error: {0}")]
    Target(#[from] tiberius::error::Error),

    /// Connection could not be established
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// CREATE TABLE (or the preceding DROP) failed for a table
    #[error("Failed to create table {table}: {message}")]
    TableCreation { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A single batch failed and was rolled back
    #[error("Batch {batch} failed for table {table} ({rows_committed} rows committed before it): {message}")]
    Batch {
        table: String,
        batch: usize,
        rows_committed: u64,
        message: String,
    },

    /// Nothing left to migrate after filtering and schema analysis
    #[error("No tables to migrate: {0}")]
    NoTables(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// Unexpected failure caught by the top-level handler
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a TableCreation error
    pub fn table_creation(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::TableCreation {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connection { .. } => 3,
            MigrateError::NoTables(_) => 4,
            MigrateError::TableCreation { .. } => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
