//! Access source database operations.
//!
//! Reading is split in two layers. A [`SourceCatalog`] returns raw catalog
//! rows exactly as the driver reports them. The [`Introspector`] turns those
//! rows into [`TableSchema`] values: it hides system tables, maps types,
//! groups index rows, marks primary-key columns and decodes relationship
//! flags. Only the catalog talks to ODBC, so the interpretation rules are
//! testable without an Access file.

#[cfg(feature = "odbc")]
mod odbc;
mod types;

#[cfg(feature = "odbc")]
pub use odbc::AccessOdbcCatalog;
pub use types::*;

use crate::error::{MigrateError, Result};
use crate::typemap::access_to_mssql;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Name prefixes of tables that Access maintains for itself.
pub const SYSTEM_TABLE_PREFIXES: &[&str] = &["MSys", "USys", "~"];

/// Relationship attribute bits stored in `MSysRelationships.grbit`.
const REL_NOT_ENFORCED: i64 = 0x2;
const REL_UPDATE_CASCADE: i64 = 0x100;
const REL_DELETE_CASCADE: i64 = 0x1000;

/// One column row from the driver's column catalog.
#[derive(Debug, Clone, Default)]
pub struct ColumnRow {
    pub name: String,
    pub type_name: String,
    pub column_size: Option<i32>,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i32,
}

/// One (index, column) row from the driver's statistics catalog.
#[derive(Debug, Clone, Default)]
pub struct IndexRow {
    pub index_name: String,
    pub column_name: String,
    pub non_unique: bool,
    pub clustered: bool,
}

/// One (relationship, column pair) row from the relationship catalog.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRow {
    pub name: String,
    pub parent_table: String,
    pub parent_column: String,
    pub child_table: String,
    pub child_column: String,
    pub attributes: i64,
}

/// Raw catalog access for an Access database.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Open and close a connection.
    async fn test_connection(&self) -> Result<()>;

    /// Names of all user-visible tables, system tables included.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Column catalog rows for a table.
    async fn column_rows(&self, table: &str) -> Result<Vec<ColumnRow>>;

    /// Index catalog rows for a table, in key order within each index.
    async fn index_rows(&self, table: &str) -> Result<Vec<IndexRow>>;

    /// `SELECT COUNT(*)` for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Relationship catalog rows for the whole database.
    async fn relationship_rows(&self) -> Result<Vec<RelationshipRow>>;

    /// Every row of a table.
    async fn read_rows(&self, table: &str) -> Result<TableData>;

    /// Get the database type.
    fn db_type(&self) -> &str;
}

/// Schema-level view of the source used by the orchestrator.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Open and close a connection.
    async fn test_connection(&self) -> Result<()>;

    /// User table names, system tables excluded, sorted.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Full metadata for one table.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Every enforced relationship in the database.
    async fn list_relationships(&self) -> Result<Vec<RelationshipInfo>>;

    /// Every row of a table.
    async fn read_table(&self, table: &str) -> Result<TableData>;

    /// Get the database type.
    fn db_type(&self) -> &str;
}

/// Interprets raw catalog rows from a [`SourceCatalog`].
pub struct Introspector<C> {
    catalog: C,
}

impl<C: SourceCatalog> Introspector<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// Borrow the underlying catalog.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}

#[async_trait]
impl<C: SourceCatalog> SourceReader for Introspector<C> {
    async fn test_connection(&self) -> Result<()> {
        self.catalog.test_connection().await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut tables: Vec<String> = self
            .catalog
            .table_names()
            .await?
            .into_iter()
            .filter(|name| !name.trim().is_empty() && !is_system_table(name))
            .collect();

        tables.sort();
        tables.dedup();

        debug!("Found {} user tables", tables.len());
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let column_rows = self.catalog.column_rows(table).await?;
        if column_rows.is_empty() {
            return Err(MigrateError::SchemaExtraction(format!(
                "table {} reported no columns",
                table
            )));
        }

        let index_rows = match self.catalog.index_rows(table).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to read indexes for {}: {}", table, e);
                Vec::new()
            }
        };
        let indexes = group_indexes(table, &index_rows);

        let pk_columns: HashSet<String> = indexes
            .iter()
            .filter(|idx| idx.is_primary_key)
            .flat_map(|idx| idx.columns.iter().map(|c| c.to_lowercase()))
            .collect();

        let mut columns: Vec<ColumnInfo> = column_rows
            .into_iter()
            .map(|row| build_column(row, &pk_columns))
            .collect();
        columns.sort_by_key(|c| c.ordinal_position);
        renumber_duplicate_ordinals(&mut columns);

        let row_count = match self.catalog.row_count(table).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to count rows in {}: {}", table, e);
                0
            }
        };

        debug!(
            "Table {}: {} columns, {} indexes, {} rows",
            table,
            columns.len(),
            indexes.len(),
            row_count
        );

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            indexes,
            relationships: Vec::new(),
            row_count,
        })
    }

    async fn list_relationships(&self) -> Result<Vec<RelationshipInfo>> {
        let rows = match self.catalog.relationship_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Relationship catalog unavailable, skipping foreign keys: {}", e);
                return Ok(Vec::new());
            }
        };

        let total = rows.len();
        let relationships: Vec<RelationshipInfo> = rows
            .into_iter()
            .filter_map(|row| {
                let rel = decode_relationship(row);
                if !rel.is_complete() {
                    warn!(
                        "Discarding relationship {:?}: parent or child table is missing",
                        rel.name
                    );
                    return None;
                }
                Some(rel)
            })
            .collect();

        info!(
            "Found {} relationships ({} catalog rows)",
            relationships.len(),
            total
        );
        Ok(relationships)
    }

    async fn read_table(&self, table: &str) -> Result<TableData> {
        let data = self.catalog.read_rows(table).await?;
        debug!("Read {} rows from {}", data.len(), table);
        Ok(data)
    }

    fn db_type(&self) -> &str {
        self.catalog.db_type()
    }
}

/// Whether a table is maintained by Access itself.
pub fn is_system_table(name: &str) -> bool {
    SYSTEM_TABLE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Whether an index name marks the primary key.
pub fn is_primary_key_index(name: &str) -> bool {
    name.eq_ignore_ascii_case("PrimaryKey") || name.to_ascii_uppercase().starts_with("PK_")
}

fn build_column(row: ColumnRow, pk_columns: &HashSet<String>) -> ColumnInfo {
    let mapping = access_to_mssql(&row.type_name, row.column_size);
    let is_primary_key = pk_columns.contains(&row.name.to_lowercase());

    ColumnInfo {
        is_nullable: row.nullable && !mapping.is_auto_increment && !is_primary_key,
        is_auto_increment: mapping.is_auto_increment,
        is_primary_key,
        target_type: mapping.target_type,
        native_type: row.type_name,
        max_length: row.column_size,
        default_value: row.default_value.filter(|d| !d.trim().is_empty()),
        ordinal_position: row.ordinal_position,
        name: row.name,
    }
}

/// Assign 1..n when the catalog reported the same position twice.
fn renumber_duplicate_ordinals(columns: &mut [ColumnInfo]) {
    let distinct: HashSet<i32> = columns.iter().map(|c| c.ordinal_position).collect();
    if distinct.len() != columns.len() {
        for (i, col) in columns.iter_mut().enumerate() {
            col.ordinal_position = i as i32 + 1;
        }
    }
}

/// Group index rows by name, keeping catalog order for both indexes and key columns.
fn group_indexes(table: &str, rows: &[IndexRow]) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();

    for row in rows {
        if row.index_name.is_empty() || row.column_name.is_empty() {
            continue;
        }

        match indexes.iter_mut().find(|idx| idx.name == row.index_name) {
            Some(idx) => {
                idx.columns.push(row.column_name.clone());
                idx.is_unique &= !row.non_unique;
                idx.is_clustered |= row.clustered;
            }
            None => indexes.push(IndexInfo {
                name: row.index_name.clone(),
                table: table.to_string(),
                columns: vec![row.column_name.clone()],
                is_unique: !row.non_unique,
                is_clustered: row.clustered,
                is_primary_key: is_primary_key_index(&row.index_name),
            }),
        }
    }

    indexes
}

fn decode_relationship(row: RelationshipRow) -> RelationshipInfo {
    let action = |bit: i64| {
        if row.attributes & bit != 0 {
            ReferentialAction::Cascade
        } else {
            ReferentialAction::NoAction
        }
    };

    RelationshipInfo {
        on_delete: action(REL_DELETE_CASCADE),
        on_update: action(REL_UPDATE_CASCADE),
        not_enforced: row.attributes & REL_NOT_ENFORCED != 0,
        name: row.name,
        parent_table: row.parent_table,
        parent_column: row.parent_column,
        child_table: row.child_table,
        child_column: row.child_column,
    }
}
