//! SQL Server target database operations.

pub mod ddl;
mod mssql;

pub use mssql::MssqlTarget;

use crate::error::{MigrateError, Result};
use crate::source::{ColumnInfo, IndexInfo, RelationshipInfo, TableData, TableSchema};
use crate::typemap::TargetKind;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(NaiveDateTime),
}

/// Type hint for NULL values so the parameter is sent with a compatible type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    Bool,
    I64,
    F64,
    Decimal,
    String,
    Bytes,
    Uuid,
    DateTime,
}

impl SqlNullType {
    /// NULL type used when binding to a column of the given kind.
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Boolean => SqlNullType::Bool,
            TargetKind::Numeric => SqlNullType::Decimal,
            TargetKind::DateTime => SqlNullType::DateTime,
            TargetKind::Binary => SqlNullType::Bytes,
            TargetKind::Guid => SqlNullType::Uuid,
            TargetKind::Text | TargetKind::Other => SqlNullType::String,
        }
    }
}

/// Result of attempting one index or foreign key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub name: String,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Skipped(String),
}

impl ItemOutcome {
    pub fn success(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: OutcomeStatus::Success,
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: OutcomeStatus::Skipped(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Reported after each committed batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchCommit {
    /// 1-based batch number.
    pub batch: usize,
    pub total_batches: usize,
    pub rows_in_batch: u64,
    /// Rows committed for the table so far, this batch included.
    pub rows_committed: u64,
}

/// Totals from [`TargetWriter::insert_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub rows: u64,
    pub batches: usize,
    /// Stopped early because the run was cancelled.
    pub cancelled: bool,
}

/// Trait for target database operations.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Open a connection and run a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Drop a table (and foreign keys that reference it).
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Create a table from metadata.
    async fn create_table(&self, table: &TableSchema) -> Result<()>;

    /// Insert already-bound rows inside a single transaction.
    ///
    /// `columns` are the target column names in value order. An empty list
    /// means every column is generated by the target.
    async fn write_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Create one secondary index.
    async fn create_index(&self, index: &IndexInfo) -> Result<()>;

    /// Create one foreign key constraint.
    async fn create_foreign_key(&self, rel: &RelationshipInfo) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Insert `data` into `table` in consecutive batches of at most `batch_size` rows.
    ///
    /// Each batch is one call to [`write_batch`](Self::write_batch). A failing
    /// batch stops the table with [`MigrateError::Batch`]; batches before it
    /// stay committed. Cancellation is checked before each batch.
    async fn insert_batch(
        &self,
        table: &TableSchema,
        data: &TableData,
        batch_size: usize,
        cancel: &CancellationToken,
        on_commit: &(dyn Fn(BatchCommit) + Send + Sync),
    ) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();
        if data.is_empty() {
            return Ok(summary);
        }

        let plan = BindPlan::new(&table.insert_columns(), data);
        for missing in &plan.missing {
            warn!(
                "Column {}.{} not present in source data, inserting NULL",
                table.name, missing
            );
        }

        let batch_size = batch_size.max(1);
        let total_batches = data.len().div_ceil(batch_size);

        for (idx, chunk) in data.rows.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Cancelled {} after {} of {} batches",
                    table.name, summary.batches, total_batches
                );
                summary.cancelled = true;
                break;
            }

            let batch = idx + 1;
            let rows = plan.bind_rows(chunk);
            let written = self
                .write_batch(&table.name, &plan.columns, rows)
                .await
                .map_err(|e| MigrateError::Batch {
                    table: table.name.clone(),
                    batch,
                    rows_committed: summary.rows,
                    message: e.to_string(),
                })?;

            summary.rows += written;
            summary.batches += 1;
            debug!(
                "{}: batch {}/{} committed ({} rows)",
                table.name, batch, total_batches, written
            );
            on_commit(BatchCommit {
                batch,
                total_batches,
                rows_in_batch: written,
                rows_committed: summary.rows,
            });
        }

        Ok(summary)
    }

    /// Create every non-primary-key index, continuing past failures.
    async fn create_indexes(&self, table: &str, indexes: &[IndexInfo]) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::new();

        for index in indexes.iter().filter(|i| !i.is_primary_key) {
            match self.create_index(index).await {
                Ok(()) => {
                    info!("Created index {} on {}", index.name, table);
                    outcomes.push(ItemOutcome::success(&index.name));
                }
                Err(e) => {
                    warn!("Failed to create index {} on {}: {}", index.name, table, e);
                    outcomes.push(ItemOutcome::skipped(&index.name, e.to_string()));
                }
            }
        }

        outcomes
    }

    /// Create every foreign key, continuing past failures.
    async fn create_foreign_keys(&self, relationships: &[RelationshipInfo]) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(relationships.len());

        for rel in relationships {
            let name = rel.constraint_name();
            if let Some(reason) = rel.unsupported_reason() {
                warn!("Skipping foreign key {}: {}", name, reason);
                outcomes.push(ItemOutcome::skipped(name, reason));
                continue;
            }
            match self.create_foreign_key(rel).await {
                Ok(()) => {
                    info!(
                        "Created foreign key {} ({}.{} -> {}.{})",
                        name, rel.child_table, rel.child_column, rel.parent_table, rel.parent_column
                    );
                    outcomes.push(ItemOutcome::success(name));
                }
                Err(e) => {
                    warn!("Failed to create foreign key {}: {}", name, e);
                    outcomes.push(ItemOutcome::skipped(name, e.to_string()));
                }
            }
        }

        outcomes
    }
}

/// Maps source result-set columns onto the target's insert columns.
struct BindPlan {
    columns: Vec<String>,
    kinds: Vec<TargetKind>,
    positions: Vec<Option<usize>>,
    missing: Vec<String>,
}

impl BindPlan {
    fn new(columns: &[&ColumnInfo], data: &TableData) -> Self {
        let positions: Vec<Option<usize>> =
            columns.iter().map(|c| data.column_index(&c.name)).collect();
        let missing = columns
            .iter()
            .zip(&positions)
            .filter(|(_, pos)| pos.is_none())
            .map(|(c, _)| c.name.clone())
            .collect();

        Self {
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            kinds: columns.iter().map(|c| TargetKind::of(&c.target_type)).collect(),
            positions,
            missing,
        }
    }

    fn bind_rows(&self, rows: &[Vec<SqlValue>]) -> Vec<Vec<SqlValue>> {
        rows.iter()
            .map(|row| {
                self.positions
                    .iter()
                    .zip(&self.kinds)
                    .map(|(pos, kind)| match pos.and_then(|p| row.get(p)) {
                        Some(value) => coerce_value(*kind, value),
                        None => SqlValue::Null(SqlNullType::for_kind(*kind)),
                    })
                    .collect()
            })
            .collect()
    }
}

/// Coerce a source value for binding to a column of the given kind.
///
/// Values the source already typed pass through. Text is converted where the
/// target needs it; when conversion fails the raw text is bound and the
/// server gets the final say.
pub fn coerce_value(kind: TargetKind, value: &SqlValue) -> SqlValue {
    let text = match value {
        SqlValue::Null(_) => return SqlValue::Null(SqlNullType::for_kind(kind)),
        SqlValue::String(s) => s,
        other => return other.clone(),
    };

    match kind {
        TargetKind::Boolean => SqlValue::Bool(parse_bool(text)),
        TargetKind::Numeric => coerce_numeric(text),
        TargetKind::DateTime => parse_datetime(text)
            .map(SqlValue::DateTime)
            .unwrap_or_else(|| SqlValue::String(text.clone())),
        TargetKind::Binary => {
            let hex_str = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text.as_str());
            // Undecodable text stays text so the server rejects the row.
            hex::decode(hex_str)
                .map(SqlValue::Bytes)
                .unwrap_or_else(|_| SqlValue::String(text.clone()))
        }
        TargetKind::Guid => {
            let trimmed = text.trim().trim_start_matches('{').trim_end_matches('}');
            uuid::Uuid::parse_str(trimmed)
                .map(SqlValue::Uuid)
                .unwrap_or_else(|_| SqlValue::String(text.clone()))
        }
        TargetKind::Text | TargetKind::Other => SqlValue::String(text.clone()),
    }
}

/// Access boolean text: `true`, `yes`, `1` and `-1` are true, anything else false.
pub fn parse_bool(text: &str) -> bool {
    let t = text.trim();
    ["true", "yes", "1", "-1"]
        .iter()
        .any(|v| t.eq_ignore_ascii_case(v))
}

fn coerce_numeric(text: &str) -> SqlValue {
    let t = text.trim();
    if t.is_empty() {
        return SqlValue::Null(SqlNullType::Decimal);
    }

    // Currency columns may come back with symbols or grouping.
    let cleaned = t.replace(['$', ','], "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return SqlValue::I64(i);
    }
    if let Ok(d) = cleaned.parse::<Decimal>() {
        return SqlValue::Decimal(d);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(SqlValue::F64)
        .unwrap_or_else(|| SqlValue::String(text.to_string()))
}

/// Parse the date/time text formats the Access driver produces.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %I:%M:%S %p",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

    let t = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
