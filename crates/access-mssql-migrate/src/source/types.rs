//! Schema and metadata types.

use crate::target::SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Column definitions, ordered by ordinal position.
    pub columns: Vec<ColumnInfo>,

    /// Indexes, including the primary-key index if one was found.
    pub indexes: Vec<IndexInfo>,

    /// Relationships where this table is the child. Filled from the global list.
    pub relationships: Vec<RelationshipInfo>,

    /// Row count at analysis time (advisory).
    pub row_count: i64,
}

impl TableSchema {
    /// Primary key columns in ordinal order.
    pub fn pk_columns(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Columns that receive explicit values on INSERT (everything but auto-increment).
    pub fn insert_columns(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().filter(|c| !c.is_auto_increment).collect()
    }

    /// Indexes that are created separately from the table.
    pub fn secondary_indexes(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indexes.iter().filter(|i| !i.is_primary_key)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Type name as reported by the source catalog (e.g., "VARCHAR", "COUNTER").
    pub native_type: String,

    /// Resolved SQL Server type (e.g., "NVARCHAR(50)").
    pub target_type: String,

    /// Maximum character length, if the catalog reported one.
    pub max_length: Option<i32>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the target generates the value (IDENTITY).
    pub is_auto_increment: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Default value in source syntax (e.g., `"abc"`, `=Now()`, `0`).
    pub default_value: Option<String>,

    /// Ordinal position (1-based).
    pub ordinal_position: i32,
}

/// Index metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,

    /// Owning table name.
    pub table: String,

    /// Indexed column names in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub is_unique: bool,

    /// Whether the index is clustered.
    pub is_clustered: bool,

    /// Whether this is the primary-key index.
    pub is_primary_key: bool,
}

/// ON DELETE / ON UPDATE behavior of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
        })
    }
}

/// Relationship (foreign key) metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipInfo {
    /// Relationship name. Empty when the source did not name it.
    pub name: String,

    /// Referenced (parent) table.
    pub parent_table: String,

    /// Referenced (parent) column.
    pub parent_column: String,

    /// Referencing (child) table.
    pub child_table: String,

    /// Referencing (child) column.
    pub child_column: String,

    /// ON DELETE action.
    pub on_delete: ReferentialAction,

    /// ON UPDATE action.
    pub on_update: ReferentialAction,

    /// Access stores the relationship without enforcing it.
    #[serde(default)]
    pub not_enforced: bool,
}

impl RelationshipInfo {
    /// Constraint name on the target: the source name, or `FK_<child>_<parent>`.
    pub fn constraint_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("FK_{}_{}", self.child_table, self.parent_table)
        } else {
            self.name.clone()
        }
    }

    /// Both ends name a table.
    pub fn is_complete(&self) -> bool {
        !self.parent_table.trim().is_empty() && !self.child_table.trim().is_empty()
    }

    /// Why this relationship cannot become a constraint, if it cannot.
    pub fn unsupported_reason(&self) -> Option<&'static str> {
        if self.not_enforced {
            Some("relationship is not enforced in the source")
        } else if self.parent_column.trim().is_empty() || self.child_column.trim().is_empty() {
            Some("relationship has no column mapping")
        } else {
            None
        }
    }
}

/// Full contents of a source table.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    /// Column names in result-set order.
    pub columns: Vec<String>,

    /// Row values, one entry per column.
    pub rows: Vec<Vec<SqlValue>>,
}

impl TableData {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in the result set (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_name_synthesized_when_empty() {
        let rel = RelationshipInfo {
            parent_table: "Customers".into(),
            parent_column: "ID".into(),
            child_table: "Orders".into(),
            child_column: "CustomerID".into(),
            ..Default::default()
        };
        assert_eq!(rel.constraint_name(), "FK_Orders_Customers");

        let named = RelationshipInfo {
            name: "CustomersOrders".into(),
            ..rel
        };
        assert_eq!(named.constraint_name(), "CustomersOrders");
        assert_eq!(named.unsupported_reason(), None);
    }

    #[test]
    fn test_unsupported_relationships() {
        let loose = RelationshipInfo {
            parent_table: "Customers".into(),
            parent_column: "ID".into(),
            child_table: "Notes".into(),
            child_column: "CustomerID".into(),
            not_enforced: true,
            ..Default::default()
        };
        assert!(loose.unsupported_reason().unwrap().contains("not enforced"));

        let unmapped = RelationshipInfo {
            child_column: String::new(),
            not_enforced: false,
            ..loose
        };
        assert!(unmapped.unsupported_reason().unwrap().contains("column"));
    }

    #[test]
    fn test_referential_action_display() {
        assert_eq!(ReferentialAction::default().to_string(), "NO ACTION");
        assert_eq!(ReferentialAction::Cascade.to_string(), "CASCADE");
    }

    #[test]
    fn test_insert_columns_skip_auto_increment() {
        let table = TableSchema {
            name: "Customers".into(),
            columns: vec![
                ColumnInfo {
                    name: "ID".into(),
                    is_auto_increment: true,
                    is_primary_key: true,
                    ordinal_position: 1,
                    ..Default::default()
                },
                ColumnInfo {
                    name: "Name".into(),
                    ordinal_position: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let names: Vec<_> = table.insert_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Name"]);
        assert!(table.has_pk());
    }

    #[test]
    fn test_column_index_case_insensitive() {
        let data = TableData {
            columns: vec!["ID".into(), "CompanyName".into()],
            rows: Vec::new(),
        };
        assert_eq!(data.column_index("companyname"), Some(1));
        assert_eq!(data.column_index("Missing"), None);
        assert!(data.is_empty());
    }
}
