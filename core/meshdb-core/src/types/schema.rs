//! Table and column schema types.

use crate::error::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};

/// Column descriptor. Type is a SQL-style string ("INT", "VARCHAR(255)",
/// "VECTOR", ...); vector columns carry an explicit dimension validated
/// on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_dim: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, col_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: col_type.into(),
            nullable: true,
            primary: false,
            vector_dim: None,
        }
    }

    pub fn primary(name: impl Into<String>, col_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: col_type.into(),
            nullable: false,
            primary: true,
            vector_dim: None,
        }
    }

    pub fn vector(name: impl Into<String>, dim: usize) -> Self {
        Self {
            name: name.into(),
            col_type: "VECTOR".to_string(),
            nullable: true,
            primary: false,
            vector_dim: Some(dim),
        }
    }
}

/// True for SQL integer type names. Auto-increment only applies to
/// integer-typed primary columns.
pub fn is_integer_type(col_type: &str) -> bool {
    matches!(
        col_type.to_ascii_uppercase().as_str(),
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "INT64" | "SERIAL"
    )
}

/// Table schema: name plus an ordered sequence of columns. Immutable
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Validate the schema: column names unique, at most one primary.
    pub fn validate(&self) -> MeshResult<()> {
        let mut seen = std::collections::HashSet::new();
        let mut primaries = 0usize;
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(MeshError::InvalidArgument(format!(
                    "duplicate column '{}' in table '{}'",
                    col.name, self.name
                )));
            }
            if col.primary {
                primaries += 1;
            }
        }
        if primaries > 1 {
            return Err(MeshError::InvalidArgument(format!(
                "table '{}' declares {} primary columns",
                self.name, primaries
            )));
        }
        Ok(())
    }

    /// The primary column, if one is declared.
    pub fn primary_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.primary)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Per-table engine knobs stored alongside the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Column receiving sequence values on insert (integer primary)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment_column: Option<String>,
    /// Columns indexed for full-text search
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fulltext_columns: Vec<String>,
    /// Secondary index column sets; composites keep declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_schema() -> TableInfo {
        TableInfo::new(
            "users",
            vec![
                ColumnInfo::primary("id", "INT"),
                ColumnInfo::new("name", "VARCHAR(255)"),
            ],
        )
    }

    #[test]
    fn validate_accepts_single_primary() {
        assert!(users_schema().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_columns() {
        let info = TableInfo::new(
            "t",
            vec![ColumnInfo::new("a", "INT"), ColumnInfo::new("a", "TEXT")],
        );
        assert!(info.validate().is_err());
    }

    #[test]
    fn validate_rejects_two_primaries() {
        let info = TableInfo::new(
            "t",
            vec![
                ColumnInfo::primary("a", "INT"),
                ColumnInfo::primary("b", "INT"),
            ],
        );
        assert!(info.validate().is_err());
    }

    #[test]
    fn integer_type_names() {
        assert!(is_integer_type("INT"));
        assert!(is_integer_type("bigint"));
        assert!(!is_integer_type("VARCHAR(255)"));
        assert!(!is_integer_type("FLOAT"));
    }

    #[test]
    fn schema_serde_round_trip() {
        let info = users_schema();
        let json = serde_json::to_string(&info).unwrap();
        let back: TableInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
