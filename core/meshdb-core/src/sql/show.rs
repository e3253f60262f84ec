//! MySQL compatibility surface.
//!
//! SHOW statements are rewritten into `information_schema` queries and
//! run through the normal pipeline; PROCESSLIST reads the runtime, and
//! VARIABLES/STATUS return a fixed compatibility list with an optional
//! case-insensitive LIKE filter.

use crate::datasource::{DataSource, Manager};
use crate::error::{MeshError, MeshResult};
use crate::runtime::{QueryContext, QueryRuntime};
use crate::session::Session;
use crate::types::{
    ColumnInfo, Filter, QueryOptions, QueryResult, Row, SortDirection, TableInfo, Value,
    like_match, row_from_pairs,
};
use std::sync::{Arc, Weak};

/// A recognised SHOW/USE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowStatement {
    Tables,
    Databases,
    Columns { table: String },
    Processlist,
    Variables { like: Option<String> },
    Status { like: Option<String> },
    Use { database: String },
}

/// Recognise SHOW/USE ahead of the SQL parser. Returns `None` for
/// everything else.
pub fn parse_show(sql: &str) -> Option<ShowStatement> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let tokens: Vec<String> = trimmed
        .split_whitespace()
        .map(|t| t.to_ascii_uppercase())
        .collect();
    let raw: Vec<&str> = trimmed.split_whitespace().collect();

    match tokens.first().map(String::as_str) {
        Some("USE") if raw.len() == 2 => Some(ShowStatement::Use {
            database: raw[1].trim_matches('`').to_string(),
        }),
        Some("SHOW") => match tokens.get(1).map(String::as_str) {
            Some("TABLES") => Some(ShowStatement::Tables),
            Some("DATABASES") | Some("SCHEMAS") => Some(ShowStatement::Databases),
            Some("COLUMNS") | Some("FIELDS") => {
                // SHOW COLUMNS FROM <table>
                if tokens.get(2).map(String::as_str) == Some("FROM") && raw.len() >= 4 {
                    Some(ShowStatement::Columns {
                        table: raw[3].trim_matches('`').to_string(),
                    })
                } else {
                    None
                }
            }
            Some("PROCESSLIST") => Some(ShowStatement::Processlist),
            Some("VARIABLES") => Some(ShowStatement::Variables {
                like: parse_like(&tokens, &raw, 2),
            }),
            Some("STATUS") => Some(ShowStatement::Status {
                like: parse_like(&tokens, &raw, 2),
            }),
            _ => None,
        },
        _ => None,
    }
}

fn parse_like(tokens: &[String], raw: &[&str], at: usize) -> Option<String> {
    if tokens.get(at).map(String::as_str) == Some("LIKE") {
        raw.get(at + 1)
            .map(|p| p.trim_matches('\'').trim_matches('"').to_string())
    } else {
        None
    }
}

/// Rewrite catalog SHOW statements into information_schema SQL.
pub fn rewrite_to_sql(statement: &ShowStatement) -> Option<String> {
    match statement {
        ShowStatement::Tables => Some(
            "SELECT table_name FROM information_schema.tables ORDER BY table_name".to_string(),
        ),
        ShowStatement::Databases => Some(
            "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name".to_string(),
        ),
        ShowStatement::Columns { table } => Some(format!(
            "SELECT column_name, data_type, is_nullable, column_key \
             FROM information_schema.columns WHERE table_name = '{table}'"
        )),
        _ => None,
    }
}

/// Fixed MySQL-compat variable list; session variables override it.
const COMPAT_VARIABLES: &[(&str, &str)] = &[
    ("autocommit", "ON"),
    ("character_set_server", "utf8mb4"),
    ("collation_server", "utf8mb4_general_ci"),
    ("lower_case_table_names", "0"),
    ("max_allowed_packet", "67108864"),
    ("max_connections", "151"),
    ("sql_mode", "ANSI_QUOTES"),
    ("time_zone", "SYSTEM"),
    ("version", "8.0.0-mesh"),
    ("version_comment", "MeshDB federated SQL engine"),
];

const COMPAT_STATUS: &[(&str, &str)] = &[
    ("Connections", "1"),
    ("Questions", "0"),
    ("Slow_queries", "0"),
    ("Threads_connected", "1"),
    ("Threads_running", "1"),
    ("Uptime", "0"),
];

fn name_value_result(
    pairs: impl IntoIterator<Item = (String, String)>,
    like: Option<&str>,
) -> QueryResult {
    let rows: Vec<Row> = pairs
        .into_iter()
        .filter(|(name, _)| like.is_none_or(|pattern| like_match(name, pattern)))
        .map(|(name, value)| {
            row_from_pairs([
                ("Variable_name", Value::Str(name)),
                ("Value", Value::Str(value)),
            ])
        })
        .collect();
    QueryResult::new(
        vec![
            ColumnInfo::new("Variable_name", "VARCHAR(64)"),
            ColumnInfo::new("Value", "VARCHAR(1024)"),
        ],
        rows,
    )
}

/// SHOW VARIABLES, with session overrides applied.
pub fn show_variables(session: Option<&Session>, like: Option<&str>) -> QueryResult {
    let mut pairs: Vec<(String, String)> = COMPAT_VARIABLES
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();
    if let Some(session) = session {
        for (name, value) in session.variables() {
            match pairs.iter_mut().find(|(n, _)| *n == name) {
                Some(pair) => pair.1 = value.to_string(),
                None => pairs.push((name, value.to_string())),
            }
        }
        pairs.sort();
    }
    name_value_result(pairs, like)
}

pub fn show_status(like: Option<&str>) -> QueryResult {
    name_value_result(
        COMPAT_STATUS
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string())),
        like,
    )
}

/// SHOW PROCESSLIST from the runtime registry.
pub fn show_processlist(runtime: &QueryRuntime) -> QueryResult {
    let columns = vec![
        ColumnInfo::new("Id", "VARCHAR(64)"),
        ColumnInfo::new("Info", "TEXT"),
        ColumnInfo::new("State", "VARCHAR(32)"),
        ColumnInfo::new("Progress", "DOUBLE"),
        ColumnInfo::new("Time", "BIGINT"),
    ];
    let rows: Vec<Row> = runtime
        .get_all_queries()
        .into_iter()
        .map(|q| {
            row_from_pairs([
                ("Id", Value::Str(q.query_id)),
                ("Info", Value::Str(q.sql)),
                ("State", Value::Str(q.status.as_str().to_string())),
                ("Progress", Value::Float64(q.progress)),
                ("Time", Value::Int64(q.elapsed.as_secs() as i64)),
            ])
        })
        .collect();
    QueryResult::new(columns, rows)
}

/// Read-only catalog source serving `information_schema.tables`,
/// `.schemata` and `.columns` from the live registry. Registered like
/// any other source so rewritten SHOW statements (and direct SELECTs)
/// flow through the normal scan path.
pub struct InformationSchemaSource {
    manager: Weak<Manager>,
}

impl InformationSchemaSource {
    pub const NAME: &'static str = "information_schema";

    pub fn new(manager: Weak<Manager>) -> Self {
        Self { manager }
    }

    fn manager(&self) -> MeshResult<Arc<Manager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| MeshError::SourceUnavailable {
                name: Self::NAME.to_string(),
                reason: "manager dropped".to_string(),
            })
    }

    fn strip(table: &str) -> &str {
        table
            .strip_prefix("information_schema.")
            .unwrap_or(table)
    }

    fn tables_rows(&self) -> MeshResult<Vec<Row>> {
        let manager = self.manager()?;
        let mut rows = Vec::new();
        for source_name in manager.source_names() {
            if source_name == Self::NAME {
                continue;
            }
            let source = manager.get(&source_name)?;
            let Ok(tables) = source.get_tables() else {
                continue; // unreachable sources drop out of the catalog
            };
            for table in tables {
                rows.push(row_from_pairs([
                    ("table_schema", Value::Str(source_name.clone())),
                    ("table_name", Value::Str(table)),
                    ("table_type", Value::Str("BASE TABLE".to_string())),
                ]));
            }
        }
        Ok(rows)
    }

    fn schemata_rows(&self) -> MeshResult<Vec<Row>> {
        let manager = self.manager()?;
        let mut rows: Vec<Row> = manager
            .source_names()
            .into_iter()
            .filter(|name| name != Self::NAME)
            .map(|name| row_from_pairs([("schema_name", Value::Str(name))]))
            .collect();
        rows.push(row_from_pairs([(
            "schema_name",
            Value::Str(Self::NAME.to_string()),
        )]));
        Ok(rows)
    }

    fn columns_rows(&self) -> MeshResult<Vec<Row>> {
        let manager = self.manager()?;
        let mut rows = Vec::new();
        for source_name in manager.source_names() {
            if source_name == Self::NAME {
                continue;
            }
            let source = manager.get(&source_name)?;
            let Ok(tables) = source.get_tables() else {
                continue;
            };
            for table in tables {
                let Ok(info) = source.get_table_info(&table) else {
                    continue;
                };
                for (position, col) in info.columns.iter().enumerate() {
                    rows.push(row_from_pairs([
                        ("table_schema", Value::Str(source_name.clone())),
                        ("table_name", Value::Str(table.clone())),
                        ("column_name", Value::Str(col.name.clone())),
                        ("ordinal_position", Value::Int64(position as i64 + 1)),
                        ("data_type", Value::Str(col.col_type.clone())),
                        (
                            "is_nullable",
                            Value::Str(if col.nullable { "YES" } else { "NO" }.to_string()),
                        ),
                        (
                            "column_key",
                            Value::Str(if col.primary { "PRI" } else { "" }.to_string()),
                        ),
                    ]));
                }
            }
        }
        Ok(rows)
    }

    fn schema_of(table: &str) -> MeshResult<TableInfo> {
        let columns = match table {
            "tables" => vec![
                ColumnInfo::new("table_schema", "VARCHAR(64)"),
                ColumnInfo::new("table_name", "VARCHAR(64)"),
                ColumnInfo::new("table_type", "VARCHAR(64)"),
            ],
            "schemata" => vec![ColumnInfo::new("schema_name", "VARCHAR(64)")],
            "columns" => vec![
                ColumnInfo::new("table_schema", "VARCHAR(64)"),
                ColumnInfo::new("table_name", "VARCHAR(64)"),
                ColumnInfo::new("column_name", "VARCHAR(64)"),
                ColumnInfo::new("ordinal_position", "BIGINT"),
                ColumnInfo::new("data_type", "VARCHAR(64)"),
                ColumnInfo::new("is_nullable", "VARCHAR(3)"),
                ColumnInfo::new("column_key", "VARCHAR(3)"),
            ],
            other => return Err(MeshError::TableNotFound(other.to_string())),
        };
        Ok(TableInfo::new(format!("information_schema.{table}"), columns))
    }

    fn read_only(&self) -> MeshError {
        MeshError::InvalidArgument("information_schema is read-only".to_string())
    }
}

impl DataSource for InformationSchemaSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn connect(&self) -> MeshResult<()> {
        Ok(())
    }

    fn close(&self) -> MeshResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.manager.upgrade().is_some()
    }

    fn get_tables(&self) -> MeshResult<Vec<String>> {
        Ok(vec![
            "columns".to_string(),
            "schemata".to_string(),
            "tables".to_string(),
        ])
    }

    fn get_table_info(&self, table: &str) -> MeshResult<TableInfo> {
        Self::schema_of(Self::strip(table))
    }

    fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult> {
        ctx.check()?;
        let stripped = Self::strip(table);
        let info = Self::schema_of(stripped)?;
        let mut rows = match stripped {
            "tables" => self.tables_rows()?,
            "schemata" => self.schemata_rows()?,
            "columns" => self.columns_rows()?,
            other => return Err(MeshError::TableNotFound(other.to_string())),
        };

        rows.retain(|row| options.filters.iter().all(|f| f.matches(row)));
        if let Some(order_col) = &options.order_by {
            let direction = options.order_direction;
            rows.sort_by(|a, b| {
                let av = a.get(order_col).unwrap_or(&Value::Null);
                let bv = b.get(order_col).unwrap_or(&Value::Null);
                let ord = av.compare(bv);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        let total = rows.len() as u64;
        let rows: Vec<Row> = rows
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|mut row| {
                if options.select_columns.is_empty() {
                    row
                } else {
                    let mut projected = Row::new();
                    for col in &options.select_columns {
                        projected.insert(col.clone(), row.remove(col).unwrap_or(Value::Null));
                    }
                    projected
                }
            })
            .collect();

        let columns = if options.select_columns.is_empty() {
            info.columns
        } else {
            options
                .select_columns
                .iter()
                .map(|name| {
                    info.column(name)
                        .cloned()
                        .unwrap_or_else(|| ColumnInfo::new(name.clone(), "TEXT"))
                })
                .collect()
        };

        Ok(QueryResult {
            columns,
            rows,
            total,
        })
    }

    fn insert(&self, _ctx: &QueryContext, _table: &str, _rows: &mut [Row]) -> MeshResult<u64> {
        Err(self.read_only())
    }

    fn update(
        &self,
        _ctx: &QueryContext,
        _table: &str,
        _filters: &[Filter],
        _updates: &Row,
    ) -> MeshResult<u64> {
        Err(self.read_only())
    }

    fn delete(&self, _ctx: &QueryContext, _table: &str, _filters: &[Filter]) -> MeshResult<u64> {
        Err(self.read_only())
    }

    fn create_table(
        &self,
        _info: &TableInfo,
        _config: &crate::types::TableConfig,
    ) -> MeshResult<()> {
        Err(self.read_only())
    }

    fn drop_table(&self, _table: &str) -> MeshResult<()> {
        Err(self.read_only())
    }

    fn truncate_table(&self, _table: &str) -> MeshResult<()> {
        Err(self.read_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_statements() {
        assert_eq!(parse_show("SHOW TABLES"), Some(ShowStatement::Tables));
        assert_eq!(parse_show("show databases;"), Some(ShowStatement::Databases));
        assert_eq!(
            parse_show("SHOW COLUMNS FROM users"),
            Some(ShowStatement::Columns {
                table: "users".to_string()
            })
        );
        assert_eq!(
            parse_show("SHOW VARIABLES LIKE 'max%'"),
            Some(ShowStatement::Variables {
                like: Some("max%".to_string())
            })
        );
        assert_eq!(
            parse_show("USE analytics"),
            Some(ShowStatement::Use {
                database: "analytics".to_string()
            })
        );
        assert_eq!(parse_show("SELECT 1"), None);
    }

    #[test]
    fn rewrites_into_information_schema() {
        let sql = rewrite_to_sql(&ShowStatement::Tables).unwrap();
        assert!(sql.contains("information_schema.tables"));
        let sql = rewrite_to_sql(&ShowStatement::Columns {
            table: "users".to_string(),
        })
        .unwrap();
        assert!(sql.contains("information_schema.columns"));
        assert!(sql.contains("'users'"));
        assert!(rewrite_to_sql(&ShowStatement::Processlist).is_none());
    }

    #[test]
    fn variables_like_filter_is_case_insensitive() {
        let all = show_variables(None, None);
        assert!(all.rows.len() >= COMPAT_VARIABLES.len());
        let filtered = show_variables(None, Some("VERSION%"));
        assert_eq!(filtered.rows.len(), 2);
    }

    #[test]
    fn status_list_is_fixed() {
        let status = show_status(None);
        assert_eq!(status.rows.len(), COMPAT_STATUS.len());
        let filtered = show_status(Some("Threads%"));
        assert_eq!(filtered.rows.len(), 2);
    }

    #[test]
    fn info_schema_serves_catalog() {
        let manager = Arc::new(Manager::new());
        let source = InformationSchemaSource::new(Arc::downgrade(&manager));
        // default source starts empty
        let ctx = QueryContext::new();
        let result = source
            .query(&ctx, "information_schema.schemata", &QueryOptions::default())
            .unwrap();
        let names: Vec<&str> = result
            .rows
            .iter()
            .map(|r| r.get("schema_name").unwrap().as_str().unwrap())
            .collect();
        assert!(names.contains(&"default"));
        assert!(names.contains(&"information_schema"));

        // create a table on default, it appears in tables and columns
        let default = manager.get("default").unwrap();
        default
            .create_table(
                &TableInfo::new(
                    "users",
                    vec![ColumnInfo::primary("id", "INT")],
                ),
                &crate::types::TableConfig::default(),
            )
            .unwrap();
        let result = source
            .query(&ctx, "tables", &QueryOptions::default())
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.rows[0].get("table_name"),
            Some(&Value::Str("users".to_string()))
        );

        let result = source
            .query(
                &ctx,
                "columns",
                &QueryOptions::with_filters(vec![Filter::eq("table_name", "users")]),
            )
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.rows[0].get("column_key"),
            Some(&Value::Str("PRI".to_string()))
        );
    }

    #[test]
    fn info_schema_rejects_writes() {
        let manager = Arc::new(Manager::new());
        let source = InformationSchemaSource::new(Arc::downgrade(&manager));
        let ctx = QueryContext::new();
        assert!(source.insert(&ctx, "tables", &mut []).is_err());
        assert!(source.drop_table("tables").is_err());
    }
}
