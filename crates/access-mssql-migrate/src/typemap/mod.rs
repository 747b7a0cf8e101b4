//! Type mapping between Access and SQL Server.
//!
//! The table below covers both the names shown in the Access designer
//! (`Text`, `Yes/No`, `AutoNumber`, ...) and the names the Access ODBC driver
//! reports in its catalog (`VARCHAR`, `BIT`, `COUNTER`, ...). Lookups are
//! case-insensitive. Anything not in the table becomes `NVARCHAR(255)`, so a
//! strange column never stops a migration; it may be stored wider than needed.

/// Length used for text columns when nothing says how long they are.
pub const DEFAULT_TEXT_LENGTH: i32 = 255;

/// Longest length that is spelled out; anything above becomes `(MAX)`.
pub const MAX_SIZED_TEXT_LENGTH: i32 = 4000;

/// Target base type for text columns with a length.
const SIZED_TEXT_TYPE: &str = "NVARCHAR";

/// Native type name (lowercase) → SQL Server base type.
const TYPE_TABLE: &[(&str, &str)] = &[
    // Text
    ("text", "NVARCHAR"),
    ("short text", "NVARCHAR"),
    ("varchar", "NVARCHAR"),
    ("char", "NVARCHAR"),
    ("string", "NVARCHAR"),
    ("memo", "NTEXT"),
    ("long text", "NTEXT"),
    ("longchar", "NTEXT"),
    ("longtext", "NTEXT"),
    ("hyperlink", "NTEXT"),
    // Integers
    ("byte", "TINYINT"),
    ("smallint", "SMALLINT"),
    ("short", "SMALLINT"),
    ("integer", "INT"),
    ("long", "BIGINT"),
    ("long integer", "BIGINT"),
    // Floating point and money
    ("single", "REAL"),
    ("real", "REAL"),
    ("double", "FLOAT"),
    ("float", "FLOAT"),
    ("currency", "MONEY"),
    ("money", "MONEY"),
    ("decimal", "DECIMAL(18,4)"),
    ("numeric", "DECIMAL(18,4)"),
    // Date/time
    ("date/time", "DATETIME2"),
    ("datetime", "DATETIME2"),
    ("date", "DATETIME2"),
    // Boolean
    ("yes/no", "BIT"),
    ("bit", "BIT"),
    ("boolean", "BIT"),
    ("logical", "BIT"),
    // Auto-increment
    ("autonumber", "INT IDENTITY(1,1)"),
    ("counter", "INT IDENTITY(1,1)"),
    // Binary
    ("ole object", "VARBINARY(MAX)"),
    ("longbinary", "VARBINARY(MAX)"),
    ("binary", "VARBINARY(MAX)"),
    ("varbinary", "VARBINARY(MAX)"),
    ("image", "VARBINARY(MAX)"),
    ("attachment", "VARBINARY(MAX)"),
    // GUID
    ("guid", "UNIQUEIDENTIFIER"),
    ("replication id", "UNIQUEIDENTIFIER"),
    ("replicationid", "UNIQUEIDENTIFIER"),
];

/// The only native types that generate their own values.
const AUTO_INCREMENT_TYPES: &[&str] = &["autonumber", "counter"];

/// Result of mapping a native type to SQL Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Target type string (e.g., "NVARCHAR(50)", "INT IDENTITY(1,1)").
    pub target_type: String,
    /// Whether the target generates values for this column.
    pub is_auto_increment: bool,
    /// Whether the target type is numeric.
    pub is_numeric: bool,
    /// Whether the target type is character data.
    pub is_text: bool,
}

impl TypeMapping {
    fn new(target_type: String, is_auto_increment: bool) -> Self {
        let kind = TargetKind::of(&target_type);
        Self {
            target_type,
            is_auto_increment,
            is_numeric: kind == TargetKind::Numeric,
            is_text: kind == TargetKind::Text,
        }
    }
}

/// Broad family of a SQL Server type, used for value coercion and DEFAULT formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Text,
    Numeric,
    Boolean,
    DateTime,
    Binary,
    Guid,
    Other,
}

impl TargetKind {
    /// Classify a target type string such as `NVARCHAR(50)` or `INT IDENTITY(1,1)`.
    pub fn of(target_type: &str) -> Self {
        let base = target_type
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match base.as_str() {
            "NVARCHAR" | "NCHAR" | "VARCHAR" | "CHAR" | "NTEXT" | "TEXT" => TargetKind::Text,
            "TINYINT" | "SMALLINT" | "INT" | "BIGINT" | "REAL" | "FLOAT" | "MONEY"
            | "SMALLMONEY" | "DECIMAL" | "NUMERIC" => TargetKind::Numeric,
            "BIT" => TargetKind::Boolean,
            "DATETIME2" | "DATETIME" | "SMALLDATETIME" | "DATE" => TargetKind::DateTime,
            "VARBINARY" | "BINARY" | "IMAGE" => TargetKind::Binary,
            "UNIQUEIDENTIFIER" => TargetKind::Guid,
            _ => TargetKind::Other,
        }
    }
}

/// Map an Access type name to SQL Server.
///
/// `max_length` is the length reported separately by the catalog, if any. It
/// wins over an inline suffix such as `Text(50)`. Only variable-length text
/// targets use a length: `1..=4000` is kept, anything else becomes `MAX`, and
/// no length at all falls back to [`DEFAULT_TEXT_LENGTH`].
pub fn access_to_mssql(native_type: &str, max_length: Option<i32>) -> TypeMapping {
    let (base, inline_length) = split_size_suffix(native_type);
    let key = base.trim().to_lowercase();

    let Some(target_base) = lookup(&key) else {
        return TypeMapping::new(
            format!("{}({})", SIZED_TEXT_TYPE, DEFAULT_TEXT_LENGTH),
            false,
        );
    };

    let is_auto_increment = AUTO_INCREMENT_TYPES.contains(&key.as_str());

    if target_base != SIZED_TEXT_TYPE {
        return TypeMapping::new(target_base.to_string(), is_auto_increment);
    }

    let target_type = match max_length.or(inline_length) {
        None => format!("{}({})", target_base, DEFAULT_TEXT_LENGTH),
        Some(len) if (1..=MAX_SIZED_TEXT_LENGTH).contains(&len) => {
            format!("{}({})", target_base, len)
        }
        Some(_) => format!("{}(MAX)", target_base),
    };

    TypeMapping::new(target_type, is_auto_increment)
}

fn lookup(key: &str) -> Option<&'static str> {
    TYPE_TABLE
        .iter()
        .find(|(native, _)| *native == key)
        .map(|(_, target)| *target)
}

/// Split `Text(50)` into `("Text", Some(50))`. Non-numeric suffixes are dropped.
fn split_size_suffix(native_type: &str) -> (&str, Option<i32>) {
    let trimmed = native_type.trim();
    match (trimmed.find('('), trimmed.ends_with(')')) {
        (Some(open), true) => {
            let size = trimmed[open + 1..trimmed.len() - 1].trim().parse().ok();
            (&trimmed[..open], size)
        }
        _ => (trimmed, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mappings() {
        assert_eq!(access_to_mssql("Memo", None).target_type, "NTEXT");
        assert_eq!(access_to_mssql("Long", None).target_type, "BIGINT");
        assert_eq!(access_to_mssql("Currency", None).target_type, "MONEY");
        assert_eq!(access_to_mssql("Yes/No", None).target_type, "BIT");
        assert_eq!(access_to_mssql("OLE Object", None).target_type, "VARBINARY(MAX)");
        assert_eq!(access_to_mssql("Double", None).target_type, "FLOAT");
        assert_eq!(access_to_mssql("Byte", None).target_type, "TINYINT");
        assert_eq!(access_to_mssql("DATETIME", None).target_type, "DATETIME2");
        assert_eq!(access_to_mssql("GUID", None).target_type, "UNIQUEIDENTIFIER");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(access_to_mssql("currency", None), access_to_mssql("CURRENCY", None));
        assert_eq!(access_to_mssql("yes/NO", None).target_type, "BIT");
    }

    #[test]
    fn test_auto_increment_types() {
        let auto = access_to_mssql("AutoNumber", None);
        assert_eq!(auto.target_type, "INT IDENTITY(1,1)");
        assert!(auto.is_auto_increment);
        assert!(auto.is_numeric);

        assert!(access_to_mssql("COUNTER", None).is_auto_increment);
        assert!(!access_to_mssql("Long", None).is_auto_increment);
        assert!(!access_to_mssql("Text", None).is_auto_increment);
    }

    #[test]
    fn test_text_lengths() {
        assert_eq!(access_to_mssql("Text", Some(50)).target_type, "NVARCHAR(50)");
        assert_eq!(access_to_mssql("Text", Some(4000)).target_type, "NVARCHAR(4000)");
        assert_eq!(access_to_mssql("Text", Some(4001)).target_type, "NVARCHAR(MAX)");
        assert_eq!(access_to_mssql("VARCHAR", Some(-1)).target_type, "NVARCHAR(MAX)");
        assert_eq!(access_to_mssql("Text", None).target_type, "NVARCHAR(255)");
    }

    #[test]
    fn test_inline_size_suffix() {
        assert_eq!(access_to_mssql("Text(50)", None).target_type, "NVARCHAR(50)");
        assert_eq!(access_to_mssql("text (120)", None).target_type, "NVARCHAR(120)");
        // Catalog length wins over the inline suffix.
        assert_eq!(access_to_mssql("Text(50)", Some(80)).target_type, "NVARCHAR(80)");
        // Suffix is only reattached to text targets.
        assert_eq!(access_to_mssql("Decimal(10,2)", None).target_type, "DECIMAL(18,4)");
        assert_eq!(access_to_mssql("Long(8)", None).target_type, "BIGINT");
    }

    #[test]
    fn test_length_ignored_for_non_text() {
        assert_eq!(access_to_mssql("Long", Some(10)).target_type, "BIGINT");
        assert_eq!(access_to_mssql("Memo", Some(65535)).target_type, "NTEXT");
    }

    #[test]
    fn test_unknown_type_defaults_to_text_255() {
        for native in ["Calculated", "", "Widget(12)", "geometry"] {
            let mapping = access_to_mssql(native, Some(20));
            assert_eq!(mapping.target_type, "NVARCHAR(255)", "native type {:?}", native);
            assert!(mapping.is_text);
            assert!(!mapping.is_auto_increment);
        }
    }

    #[test]
    fn test_mapping_is_total_and_deterministic() {
        for (native, _) in TYPE_TABLE {
            let first = access_to_mssql(native, None);
            let second = access_to_mssql(native, None);
            assert_eq!(first, second);
            assert!(!first.target_type.is_empty());
        }
    }

    #[test]
    fn test_predicates() {
        let money = access_to_mssql("Currency", None);
        assert!(money.is_numeric);
        assert!(!money.is_text);

        let memo = access_to_mssql("Memo", None);
        assert!(memo.is_text);
        assert!(!memo.is_numeric);

        let flag = access_to_mssql("Yes/No", None);
        assert!(!flag.is_numeric);
        assert!(!flag.is_text);
    }

    #[test]
    fn test_target_kind() {
        assert_eq!(TargetKind::of("NVARCHAR(MAX)"), TargetKind::Text);
        assert_eq!(TargetKind::of("INT IDENTITY(1,1)"), TargetKind::Numeric);
        assert_eq!(TargetKind::of("DECIMAL(18,4)"), TargetKind::Numeric);
        assert_eq!(TargetKind::of("bit"), TargetKind::Boolean);
        assert_eq!(TargetKind::of("DATETIME2"), TargetKind::DateTime);
        assert_eq!(TargetKind::of("VARBINARY(MAX)"), TargetKind::Binary);
        assert_eq!(TargetKind::of("UNIQUEIDENTIFIER"), TargetKind::Guid);
        assert_eq!(TargetKind::of("XML"), TargetKind::Other);
    }
}
