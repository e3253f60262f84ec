//! SQL pipeline: parse → logical plan → optimizer → physical plan →
//! operator tree.
//!
//! Parsing itself is `sqlparser`'s job; everything downstream of the AST
//! lives here.

pub mod executor;
pub mod optimizer;
pub mod plan;
pub mod planner;
pub mod show;

use crate::error::{MeshError, MeshResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// Thin wrapper over the external SQL parser (MySQL dialect).
pub struct SqlParser {
    dialect: MySqlDialect,
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlParser {
    pub fn new() -> Self {
        Self {
            dialect: MySqlDialect {},
        }
    }

    pub fn parse(&self, sql: &str) -> MeshResult<Vec<Statement>> {
        Parser::parse_sql(&self.dialect, sql).map_err(|e| MeshError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        })
    }

    /// Parse exactly one statement.
    pub fn parse_one(&self, sql: &str) -> MeshResult<Statement> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            n => Err(MeshError::SqlParse {
                message: format!("expected one statement, got {n}"),
                sql: sql.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mysql_flavoured_sql() {
        let parser = SqlParser::new();
        let statements = parser
            .parse("SELECT `id` FROM users WHERE name LIKE 'a%' LIMIT 10")
            .unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parse_one_rejects_batches() {
        let parser = SqlParser::new();
        assert!(parser.parse_one("SELECT 1; SELECT 2").is_err());
        assert!(parser.parse_one("SELECT 1").is_ok());
    }

    #[test]
    fn parse_error_carries_sql() {
        let parser = SqlParser::new();
        let err = parser.parse("SELEC 1").unwrap_err();
        assert!(err.to_string().contains("SELEC"));
    }
}
