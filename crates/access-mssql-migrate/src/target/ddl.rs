//! SQL Server DDL and DML text generation.
//!
//! Everything here is pure string building so the generated schema can be
//! previewed (`plan`) and tested without a server.

use super::parse_datetime;
use crate::source::{ColumnInfo, IndexInfo, RelationshipInfo, TableSchema};
use crate::typemap::TargetKind;

/// Quote an MSSQL identifier with brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Name of the primary-key constraint for a table.
pub fn pk_constraint_name(table: &str) -> String {
    format!("PK_{}", table)
}

/// `[name] TYPE[ NOT NULL][ DEFAULT value]`
pub fn column_definition(col: &ColumnInfo) -> String {
    let mut def = format!("{} {}", quote_ident(&col.name), col.target_type);

    if !col.is_nullable && !col.is_auto_increment {
        def.push_str(" NOT NULL");
    }

    if !col.is_auto_increment {
        if let Some(default) = col.default_value.as_deref() {
            if let Some(formatted) = format_default(col, default) {
                def.push_str(" DEFAULT ");
                def.push_str(&formatted);
            }
        }
    }

    def
}

/// Render an Access default expression as a SQL Server DEFAULT value.
///
/// Returns `None` for an empty expression.
pub fn format_default(col: &ColumnInfo, raw: &str) -> Option<String> {
    let expr = raw.trim();
    let expr = expr.strip_prefix('=').unwrap_or(expr).trim();
    if expr.is_empty() {
        return None;
    }

    let formatted = match TargetKind::of(&col.target_type) {
        TargetKind::Text => format!("N{}", quote_literal(strip_quotes(expr))),
        TargetKind::Boolean => {
            if super::parse_bool(strip_quotes(expr)) || expr.eq_ignore_ascii_case("on") {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        _ if is_now_sentinel(expr) => "GETDATE()".to_string(),
        TargetKind::DateTime => {
            let inner = expr.trim_matches('#');
            match parse_datetime(strip_quotes(inner)) {
                Some(dt) => format!("'{}'", dt.format("%Y-%m-%dT%H:%M:%S")),
                None => quote_literal(strip_quotes(inner)),
            }
        }
        _ if is_numeric_literal(expr) => expr.to_string(),
        _ => quote_literal(strip_quotes(expr)),
    };

    Some(formatted)
}

/// `Now()`, `Date()`, `Time()` and friends.
fn is_now_sentinel(expr: &str) -> bool {
    let lower = expr.to_ascii_lowercase();
    let name = lower.strip_suffix("()").unwrap_or(&lower).trim();
    matches!(name, "now" | "date" | "time" | "getdate" | "current_timestamp")
}

fn is_numeric_literal(expr: &str) -> bool {
    expr.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
}

fn strip_quotes(expr: &str) -> &str {
    for q in ['"', '\''] {
        if expr.len() >= 2 && expr.starts_with(q) && expr.ends_with(q) {
            return &expr[1..expr.len() - 1];
        }
    }
    expr
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// CREATE TABLE with columns in ordinal order and a clustered primary key.
pub fn create_table_sql(table: &TableSchema) -> String {
    let mut columns: Vec<&ColumnInfo> = table.columns.iter().collect();
    columns.sort_by_key(|c| c.ordinal_position);

    let mut lines: Vec<String> = columns.iter().map(|c| column_definition(c)).collect();

    let pk_cols: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !pk_cols.is_empty() {
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY CLUSTERED ({})",
            quote_ident(&pk_constraint_name(&table.name)),
            pk_cols.join(", ")
        ));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(&table.name),
        lines.join(",\n    ")
    )
}

/// CREATE INDEX, or `None` for the primary-key index (created with the table).
pub fn create_index_sql(index: &IndexInfo) -> Option<String> {
    if index.is_primary_key {
        return None;
    }

    let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    Some(format!(
        "CREATE {}{} INDEX {} ON {} ({})",
        if index.is_unique { "UNIQUE " } else { "" },
        if index.is_clustered {
            "CLUSTERED"
        } else {
            "NONCLUSTERED"
        },
        quote_ident(&index.name),
        quote_ident(&index.table),
        cols.join(", ")
    ))
}

/// ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY with both referential rules.
pub fn foreign_key_sql(rel: &RelationshipInfo) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        quote_ident(&rel.child_table),
        quote_ident(&rel.constraint_name()),
        quote_ident(&rel.child_column),
        quote_ident(&rel.parent_table),
        quote_ident(&rel.parent_column),
        rel.on_delete,
        rel.on_update
    )
}

/// Multi-row parameterized INSERT: `VALUES (@P1, @P2), (@P3, @P4), ...`
pub fn insert_sql(table: &str, columns: &[String], row_count: usize) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }

    let col_str = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut param_idx = 1;
    let value_groups: Vec<String> = (0..row_count)
        .map(|_| {
            let placeholders: Vec<String> = (0..columns.len())
                .map(|_| {
                    let p = format!("@P{}", param_idx);
                    param_idx += 1;
                    p
                })
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        col_str,
        value_groups.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReferentialAction;

    fn col(name: &str, target_type: &str, ordinal: i32) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            target_type: target_type.into(),
            is_nullable: true,
            ordinal_position: ordinal,
            ..Default::default()
        }
    }

    fn customers() -> TableSchema {
        let mut id = col("ID", "INT IDENTITY(1,1)", 1);
        id.is_auto_increment = true;
        id.is_primary_key = true;
        id.is_nullable = false;
        id.default_value = Some("0".into());

        let mut name = col("CompanyName", "NVARCHAR(40)", 2);
        name.is_nullable = false;

        TableSchema {
            name: "Customers".into(),
            columns: vec![col("Notes", "NTEXT", 3), name, id],
            ..Default::default()
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Order Details"), "[Order Details]");
        assert_eq!(quote_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(&customers());
        assert_eq!(
            sql,
            "CREATE TABLE [Customers] (\n    \
             [ID] INT IDENTITY(1,1),\n    \
             [CompanyName] NVARCHAR(40) NOT NULL,\n    \
             [Notes] NTEXT,\n    \
             CONSTRAINT [PK_Customers] PRIMARY KEY CLUSTERED ([ID])\n)"
        );
    }

    #[test]
    fn test_composite_pk_in_ordinal_order() {
        let mut line = col("LineNo", "SMALLINT", 2);
        line.is_primary_key = true;
        let mut order = col("OrderID", "BIGINT", 1);
        order.is_primary_key = true;
        let table = TableSchema {
            name: "OrderLines".into(),
            columns: vec![line, col("Qty", "SMALLINT", 3), order],
            ..Default::default()
        };

        let sql = create_table_sql(&table);
        assert_eq!(sql.matches("PK_OrderLines").count(), 1);
        assert!(sql.contains("PRIMARY KEY CLUSTERED ([OrderID], [LineNo])"));
    }

    #[test]
    fn test_no_pk_constraint_without_pk_columns() {
        let table = TableSchema {
            name: "Log".into(),
            columns: vec![col("Message", "NVARCHAR(255)", 1)],
            ..Default::default()
        };
        assert!(!create_table_sql(&table).contains("PRIMARY KEY"));
    }

    #[test]
    fn test_text_defaults() {
        let c = col("City", "NVARCHAR(50)", 1);
        assert_eq!(format_default(&c, "\"Seattle\"").unwrap(), "N'Seattle'");
        assert_eq!(format_default(&c, "O'Hare").unwrap(), "N'O''Hare'");
        assert_eq!(format_default(&c, "  "), None);
    }

    #[test]
    fn test_boolean_defaults() {
        let c = col("Active", "BIT", 1);
        assert_eq!(format_default(&c, "Yes").unwrap(), "1");
        assert_eq!(format_default(&c, "-1").unwrap(), "1");
        assert_eq!(format_default(&c, "False").unwrap(), "0");
        assert_eq!(format_default(&c, "0").unwrap(), "0");
    }

    #[test]
    fn test_date_defaults() {
        let c = col("Created", "DATETIME2", 1);
        assert_eq!(format_default(&c, "=Now()").unwrap(), "GETDATE()");
        assert_eq!(format_default(&c, "Date()").unwrap(), "GETDATE()");
        assert_eq!(
            format_default(&c, "#2020-01-31#").unwrap(),
            "'2020-01-31T00:00:00'"
        );
        assert_eq!(
            format_default(&c, "#1/31/2020 08:15:00#").unwrap(),
            "'2020-01-31T08:15:00'"
        );
        assert_eq!(format_default(&c, "someday").unwrap(), "'someday'");
    }

    #[test]
    fn test_numeric_and_fallback_defaults() {
        assert_eq!(format_default(&col("Qty", "SMALLINT", 1), "1").unwrap(), "1");
        assert_eq!(
            format_default(&col("Price", "MONEY", 1), "=0.5").unwrap(),
            "0.5"
        );
        assert_eq!(
            format_default(&col("Price", "MONEY", 1), "abc").unwrap(),
            "'abc'"
        );
    }

    #[test]
    fn test_column_definition_default_and_auto_increment() {
        let mut qty = col("Qty", "SMALLINT", 1);
        qty.is_nullable = false;
        qty.default_value = Some("1".into());
        assert_eq!(column_definition(&qty), "[Qty] SMALLINT NOT NULL DEFAULT 1");

        let table = customers();
        let id = table.columns.iter().find(|c| c.name == "ID").unwrap();
        assert_eq!(column_definition(id), "[ID] INT IDENTITY(1,1)");
    }

    #[test]
    fn test_create_index_sql() {
        let idx = IndexInfo {
            name: "idx_name".into(),
            table: "Products".into(),
            columns: vec!["Name".into(), "Category".into()],
            is_unique: true,
            is_clustered: false,
            is_primary_key: false,
        };
        assert_eq!(
            create_index_sql(&idx).unwrap(),
            "CREATE UNIQUE NONCLUSTERED INDEX [idx_name] ON [Products] ([Name], [Category])"
        );

        let pk = IndexInfo {
            is_primary_key: true,
            ..idx
        };
        assert!(create_index_sql(&pk).is_none());
    }

    #[test]
    fn test_foreign_key_sql_synthesizes_name() {
        let rel = RelationshipInfo {
            name: String::new(),
            parent_table: "Customers".into(),
            parent_column: "ID".into(),
            child_table: "Orders".into(),
            child_column: "CustomerID".into(),
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
            not_enforced: false,
        };
        assert_eq!(
            foreign_key_sql(&rel),
            "ALTER TABLE [Orders] ADD CONSTRAINT [FK_Orders_Customers] FOREIGN KEY ([CustomerID]) \
             REFERENCES [Customers] ([ID]) ON DELETE CASCADE ON UPDATE NO ACTION"
        );
    }

    #[test]
    fn test_insert_sql() {
        let cols = vec!["Name".to_string(), "Price".to_string()];
        assert_eq!(
            insert_sql("Products", &cols, 2),
            "INSERT INTO [Products] ([Name], [Price]) VALUES (@P1, @P2), (@P3, @P4)"
        );
        assert_eq!(
            insert_sql("Counter", &[], 1),
            "INSERT INTO [Counter] DEFAULT VALUES"
        );
    }
}
