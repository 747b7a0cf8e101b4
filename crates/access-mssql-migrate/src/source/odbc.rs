//! Access catalog over ODBC.
//!
//! **Requirements:**
//! - The `odbc` feature must be enabled
//! - The Microsoft Access Database Engine ODBC driver must be installed
//!   ("Microsoft Access Driver (*.mdb, *.accdb)"), matching the bitness of
//!   this binary
//!
//! Tables and columns come from the ODBC catalog functions, counts and data
//! from plain SQL, and relationships from `MSysRelationships`. odbc-api has
//! no wrapper for `SQLStatistics`, so index metadata is requested on an
//! odbc-api statement handle and read back through an odbc-api cursor.

use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::source::{ColumnRow, IndexRow, RelationshipRow, SourceCatalog, TableData};
use crate::target::{SqlNullType, SqlValue};
use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rows fetched per round trip for catalog queries.
const CATALOG_FETCH_ROWS: usize = 500;

/// Rows fetched per round trip when reading table data.
const DATA_FETCH_ROWS: usize = 256;

/// Upper bound on one text value in bytes. A longer memo/OLE value fails the table.
const MAX_TEXT_BYTES: usize = 65536;

/// Access catalog through the Access ODBC driver.
pub struct AccessOdbcCatalog {
    env: Arc<Environment>,
    connection_string: String,
    description: String,
    /// Mutex to serialize ODBC operations (ODBC is not thread-safe)
    conn_mutex: Mutex<()>,
}

/// Escape a SQL identifier for use in bracketed notation.
/// Doubles right brackets: `Table]Name` -> `Table]]Name`
fn escape_sql_ident(s: &str) -> String {
    s.replace(']', "]]")
}

impl AccessOdbcCatalog {
    /// Create a catalog for the configured Access file. No connection is kept open.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::connection(
                format!(
                    "Failed to create ODBC environment: {}. \
                     Make sure an ODBC driver manager and the Microsoft Access ODBC driver are installed.",
                    e
                ),
                "ODBC environment",
            )
        })?;

        let description = if config.connection_string.is_some() {
            "custom connection string".to_string()
        } else {
            config.path.display().to_string()
        };

        Ok(Self {
            env: Arc::new(env),
            connection_string: config.connection_string(),
            description,
            conn_mutex: Mutex::new(()),
        })
    }

    /// Get a new ODBC connection.
    fn get_connection(&self) -> Result<odbc_api::Connection<'_>> {
        self.env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| {
                MigrateError::connection(
                    format!("ODBC connection failed: {}", e),
                    format!("opening Access database {}", self.description),
                )
            })
    }

    /// Execute a query and return rows as text.
    fn execute_query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let conn = self.get_connection()?;

        let cursor = conn.execute(sql, ()).map_err(|e| {
            MigrateError::Source(format!("ODBC query failed: {} - SQL: {}", e, sql))
        })?;

        match cursor {
            Some(cursor) => fetch_text(cursor, CATALOG_FETCH_ROWS, Some(4096)),
            None => Ok(Vec::new()),
        }
    }

    fn table_names_sync(&self) -> Result<Vec<String>> {
        let conn = self.get_connection()?;
        let cursor = conn
            .tables("", "", "", "TABLE")
            .map_err(|e| MigrateError::SchemaExtraction(format!("SQLTables failed: {}", e)))?;

        let rows = fetch_text(cursor, CATALOG_FETCH_ROWS, Some(1024))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(2).cloned().flatten())
            .collect())
    }

    fn column_rows_sync(&self, table: &str) -> Result<Vec<ColumnRow>> {
        let conn = self.get_connection()?;
        let cursor = conn.columns("", "", table, "").map_err(|e| {
            MigrateError::SchemaExtraction(format!("SQLColumns failed for {}: {}", table, e))
        })?;

        let rows = fetch_text(cursor, CATALOG_FETCH_ROWS, Some(4096))?;
        let mut columns = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let text = |idx: usize| row.get(idx).cloned().flatten();
            let number = |idx: usize| text(idx).and_then(|s| s.trim().parse::<i32>().ok());

            let Some(name) = text(3) else {
                continue;
            };

            columns.push(ColumnRow {
                name,
                type_name: text(5).unwrap_or_default(),
                column_size: number(6),
                nullable: number(10).map(|n| n != 0).unwrap_or(true),
                default_value: text(12),
                ordinal_position: number(16).unwrap_or(i as i32 + 1),
            });
        }

        Ok(columns)
    }

    fn index_rows_sync(&self, table: &str) -> Result<Vec<IndexRow>> {
        let conn = self.get_connection()?;
        let mut statement = conn.preallocate().map_err(|e| {
            MigrateError::SchemaExtraction(format!("Failed to allocate statement: {}", e))
        })?;
        let cursor = statistics::query(&mut statement, table)?;

        let rows = fetch_text(cursor, CATALOG_FETCH_ROWS, Some(1024))?;
        Ok(rows.iter().filter_map(|row| decode_statistics_row(row)).collect())
    }

    fn row_count_sync(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM [{}]", escape_sql_ident(table));
        let rows = self.execute_query(&sql)?;

        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_ref())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0))
    }

    fn relationship_rows_sync(&self) -> Result<Vec<RelationshipRow>> {
        let sql = "SELECT szRelationship, szReferencedObject, szReferencedColumn, \
                   szObject, szColumn, grbit \
                   FROM MSysRelationships ORDER BY szRelationship, icolumn";
        let rows = self.execute_query(sql)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let text = |idx: usize| row.get(idx).cloned().flatten().unwrap_or_default();
                RelationshipRow {
                    name: text(0),
                    parent_table: text(1),
                    parent_column: text(2),
                    child_table: text(3),
                    child_column: text(4),
                    attributes: text(5).trim().parse().unwrap_or(0),
                }
            })
            .collect())
    }

    fn read_rows_sync(&self, table: &str) -> Result<TableData> {
        let conn = self.get_connection()?;
        let sql = format!("SELECT * FROM [{}]", escape_sql_ident(table));

        let Some(mut cursor) = conn
            .execute(&sql, ())
            .map_err(|e| MigrateError::transfer(table, format!("Query failed: {}", e)))?
        else {
            return Ok(TableData::default());
        };

        let num_cols = cursor
            .num_result_cols()
            .map_err(|e| MigrateError::transfer(table, format!("Failed to get column count: {}", e)))?
            as u16;
        let mut columns = Vec::with_capacity(num_cols as usize);
        for i in 1..=num_cols {
            let name = cursor.col_name(i).map_err(|e| {
                MigrateError::transfer(table, format!("Failed to get column name: {}", e))
            })?;
            columns.push(name);
        }

        let rows = fetch_text(cursor, DATA_FETCH_ROWS, Some(MAX_TEXT_BYTES))
            .map_err(|e| {
                MigrateError::transfer(
                    table,
                    format!("{} (text values are read up to {} bytes)", e, MAX_TEXT_BYTES),
                )
            })?
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|value| match value {
                        Some(s) => SqlValue::String(s),
                        None => SqlValue::Null(SqlNullType::String),
                    })
                    .collect()
            })
            .collect();

        Ok(TableData { columns, rows })
    }
}

#[async_trait]
impl SourceCatalog for AccessOdbcCatalog {
    async fn test_connection(&self) -> Result<()> {
        let _lock = self.conn_mutex.lock().await;
        self.get_connection()?;
        info!("Connected to Access database: {}", self.description);
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let _lock = self.conn_mutex.lock().await;
        self.table_names_sync()
    }

    async fn column_rows(&self, table: &str) -> Result<Vec<ColumnRow>> {
        let _lock = self.conn_mutex.lock().await;
        self.column_rows_sync(table)
    }

    async fn index_rows(&self, table: &str) -> Result<Vec<IndexRow>> {
        let _lock = self.conn_mutex.lock().await;
        let rows = self.index_rows_sync(table)?;
        debug!("SQLStatistics returned {} index rows for {}", rows.len(), table);
        Ok(rows)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let _lock = self.conn_mutex.lock().await;
        self.row_count_sync(table)
    }

    async fn relationship_rows(&self) -> Result<Vec<RelationshipRow>> {
        let _lock = self.conn_mutex.lock().await;
        self.relationship_rows_sync()
    }

    async fn read_rows(&self, table: &str) -> Result<TableData> {
        let _lock = self.conn_mutex.lock().await;
        self.read_rows_sync(table)
    }

    fn db_type(&self) -> &str {
        "access"
    }
}

/// Drain a cursor into rows of optional text values.
fn fetch_text(
    mut cursor: impl Cursor,
    fetch_rows: usize,
    max_str_len: Option<usize>,
) -> Result<Vec<Vec<Option<String>>>> {
    let num_cols = cursor
        .num_result_cols()
        .map_err(|e| MigrateError::Source(format!("Failed to get column count: {}", e)))?
        as usize;

    let mut buffers = TextRowSet::for_cursor(fetch_rows, &mut cursor, max_str_len)
        .map_err(|e| MigrateError::Source(format!("Failed to create row buffer: {}", e)))?;

    let mut row_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| MigrateError::Source(format!("Failed to bind buffer: {}", e)))?;

    let mut rows = Vec::new();
    // A value longer than its buffer is an error, never a silent cut.
    while let Some(batch) = row_cursor
        .fetch_with_truncation_check(true)
        .map_err(|e| MigrateError::Source(format!("Failed to fetch rows: {}", e)))?
    {
        for row_idx in 0..batch.num_rows() {
            let row = (0..num_cols)
                .map(|col_idx| {
                    batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                })
                .collect();
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Decode one `SQLStatistics` result row. Table statistics rows and rows
/// without an index or column name yield `None`.
fn decode_statistics_row(row: &[Option<String>]) -> Option<IndexRow> {
    let text = |idx: usize| row.get(idx).cloned().flatten();
    let number = |idx: usize| text(idx).and_then(|s| s.trim().parse::<i32>().ok());

    let kind = number(6).unwrap_or(statistics::SQL_TABLE_STAT);
    if kind == statistics::SQL_TABLE_STAT {
        return None;
    }

    Some(IndexRow {
        index_name: text(5).filter(|s| !s.is_empty())?,
        column_name: text(8).filter(|s| !s.is_empty())?,
        non_unique: number(3).map(|n| n != 0).unwrap_or(true),
        clustered: kind == statistics::SQL_INDEX_CLUSTERED,
    })
}

/// `SQLStatisticsW` issued on an odbc-api statement handle.
mod statistics {
    use crate::error::{MigrateError, Result};
    use odbc_api::handles::{AsStatementRef, Statement, StatementRef};
    use odbc_api::sys::HStmt;
    use odbc_api::CursorImpl;
    use std::ptr;

    pub(super) const SQL_TABLE_STAT: i32 = 0;
    pub(super) const SQL_INDEX_CLUSTERED: i32 = 1;

    const SQL_INDEX_ALL: u16 = 1;
    const SQL_QUICK: u16 = 0;

    #[cfg_attr(windows, link(name = "odbc32"))]
    #[cfg_attr(not(windows), link(name = "odbc"))]
    extern "system" {
        fn SQLStatisticsW(
            stmt: HStmt,
            catalog: *const u16,
            catalog_len: i16,
            schema: *const u16,
            schema_len: i16,
            table: *const u16,
            table_len: i16,
            unique: u16,
            reserved: u16,
        ) -> i16;
    }

    /// Open the index catalog of `table` as a cursor on `statement`.
    pub(super) fn query<'s>(
        statement: &'s mut impl AsStatementRef,
        table: &str,
    ) -> Result<CursorImpl<StatementRef<'s>>> {
        let stmt = statement.as_stmt_ref();
        let table_name: Vec<u16> = table.encode_utf16().collect();
        // SAFETY: `stmt` is a live statement allocated by odbc-api. Catalog and
        // schema are omitted; the table pointer/length describe `table_name`.
        let ret = unsafe {
            SQLStatisticsW(
                stmt.as_sys(),
                ptr::null(),
                0,
                ptr::null(),
                0,
                table_name.as_ptr(),
                table_name.len() as i16,
                SQL_INDEX_ALL,
                SQL_QUICK,
            )
        };
        if ret != 0 && ret != 1 {
            return Err(MigrateError::SchemaExtraction(format!(
                "SQLStatistics failed with code {} for table {}",
                ret, table
            )));
        }

        // SAFETY: SQLStatistics succeeded, so the statement holds an open result set.
        Ok(unsafe { CursorImpl::new(stmt) })
    }
}
