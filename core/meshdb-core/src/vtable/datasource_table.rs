//! The writable `datasource` virtual table.
//!
//! Backed by `datasources.json`. Insert registers and connects the new
//! source; update reconnects it; delete unregisters. The password column
//! is always returned as `****`.

use crate::datasource::{DataSource, KvDataSource, Manager, MemoryDataSource};
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{
    ColumnInfo, Filter, QueryOptions, QueryResult, Row, TableConfig, TableInfo, Value,
    row_from_pairs,
};
use crate::vtable::JsonFileStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

pub const TABLE_NAME: &str = "datasource";
const MASKED: &str = "****";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub status: String,
}

impl DatasourceRecord {
    fn to_row(&self, mask_password: bool) -> Row {
        row_from_pairs([
            ("name", Value::Str(self.name.clone())),
            ("type", Value::Str(self.source_type.clone())),
            ("host", Value::Str(self.host.clone())),
            ("port", Value::Int64(i64::from(self.port))),
            ("username", Value::Str(self.username.clone())),
            (
                "password",
                Value::Str(if mask_password {
                    MASKED.to_string()
                } else {
                    self.password.clone()
                }),
            ),
            ("database_name", Value::Str(self.database_name.clone())),
            ("writable", Value::Bool(self.writable)),
            ("options", Value::Str(self.options.clone())),
            ("status", Value::Str(self.status.clone())),
        ])
    }

    fn from_row(row: &Row) -> MeshResult<Self> {
        let get_str = |key: &str| -> String {
            row.get(key)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        let name = get_str("name");
        if name.is_empty() {
            return Err(MeshError::InvalidArgument(
                "datasource requires a name".to_string(),
            ));
        }
        Ok(Self {
            name,
            source_type: get_str("type"),
            host: get_str("host"),
            port: row
                .get("port")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .clamp(0, i64::from(u16::MAX)) as u16,
            username: get_str("username"),
            password: get_str("password"),
            database_name: get_str("database_name"),
            writable: matches!(row.get("writable"), Some(Value::Bool(true))),
            options: get_str("options"),
            status: "registered".to_string(),
        })
    }
}

pub struct DatasourceTable {
    store: JsonFileStore<DatasourceRecord>,
    manager: Weak<Manager>,
}

impl DatasourceTable {
    pub fn new(path: impl AsRef<Path>, manager: Weak<Manager>) -> Self {
        Self {
            store: JsonFileStore::new(path.as_ref()),
            manager,
        }
    }

    fn manager(&self) -> MeshResult<Arc<Manager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| MeshError::SourceUnavailable {
                name: TABLE_NAME.to_string(),
                reason: "manager dropped".to_string(),
            })
    }

    /// Instantiate a backend from a record. Remote protocol adapters are
    /// wired in by the embedding process; the built-ins cover memory and
    /// sled-backed sources.
    fn build_source(record: &DatasourceRecord) -> MeshResult<Arc<dyn DataSource>> {
        match record.source_type.as_str() {
            "memory" => Ok(Arc::new(MemoryDataSource::new(record.name.clone()))),
            "kv" | "sled" => {
                if record.database_name.is_empty() {
                    Ok(Arc::new(KvDataSource::temporary(record.name.clone())))
                } else {
                    Ok(Arc::new(KvDataSource::new(
                        record.name.clone(),
                        record.database_name.clone(),
                    )))
                }
            }
            other => Err(MeshError::InvalidArgument(format!(
                "unknown datasource type '{other}'"
            ))),
        }
    }

    /// Register and connect the source described by `record`.
    fn register(&self, record: &DatasourceRecord) -> MeshResult<()> {
        let manager = self.manager()?;
        let source = Self::build_source(record)?;
        source.connect()?;
        manager.register(record.name.clone(), source)?;
        info!(source = %record.name, kind = %record.source_type, "datasource registered via virtual table");
        Ok(())
    }

    fn reconnect(&self, record: &DatasourceRecord) -> MeshResult<()> {
        let manager = self.manager()?;
        if manager.contains(&record.name) {
            if let Err(e) = manager.unregister(&record.name) {
                warn!(source = %record.name, error = %e, "unregister before reconnect failed");
            }
        }
        self.register(record)
    }

    fn schema() -> TableInfo {
        TableInfo::new(
            TABLE_NAME,
            vec![
                ColumnInfo::primary("name", "VARCHAR(64)"),
                ColumnInfo::new("type", "VARCHAR(32)"),
                ColumnInfo::new("host", "VARCHAR(255)"),
                ColumnInfo::new("port", "INT"),
                ColumnInfo::new("username", "VARCHAR(64)"),
                ColumnInfo::new("password", "VARCHAR(255)"),
                ColumnInfo::new("database_name", "VARCHAR(255)"),
                ColumnInfo::new("writable", "BOOLEAN"),
                ColumnInfo::new("options", "TEXT"),
                ColumnInfo::new("status", "VARCHAR(32)"),
            ],
        )
    }
}

impl DataSource for DatasourceTable {
    fn name(&self) -> &str {
        "datasource_config"
    }

    fn connect(&self) -> MeshResult<()> {
        Ok(())
    }

    fn close(&self) -> MeshResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn get_tables(&self) -> MeshResult<Vec<String>> {
        Ok(vec![TABLE_NAME.to_string()])
    }

    fn get_table_info(&self, table: &str) -> MeshResult<TableInfo> {
        if table != TABLE_NAME {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        Ok(Self::schema())
    }

    fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult> {
        ctx.check()?;
        if table != TABLE_NAME {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        let rows = self.store.read_records(|records| {
            records
                .iter()
                .map(|r| r.to_row(true))
                .filter(|row| options.filters.iter().all(|f| f.matches(row)))
                .collect::<Vec<Row>>()
        })?;
        let total = rows.len() as u64;
        let rows: Vec<Row> = rows
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(QueryResult {
            columns: Self::schema().columns,
            rows,
            total,
        })
    }

    fn insert(&self, ctx: &QueryContext, table: &str, rows: &mut [Row]) -> MeshResult<u64> {
        ctx.check()?;
        if table != TABLE_NAME {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        let mut inserted = 0u64;
        for row in rows.iter() {
            let record = DatasourceRecord::from_row(row)?;
            // the file mutex covers the registration so readers never see
            // a source the file does not know about
            self.store.with_records(|records| {
                if records.iter().any(|r| r.name == record.name) {
                    return Err(MeshError::AlreadyExists(record.name.clone()));
                }
                self.register(&record)?;
                records.push(record.clone());
                Ok(((), true))
            })?;
            inserted += 1;
        }
        Ok(inserted)
    }

    fn update(
        &self,
        ctx: &QueryContext,
        table: &str,
        filters: &[Filter],
        updates: &Row,
    ) -> MeshResult<u64> {
        ctx.check()?;
        if table != TABLE_NAME {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        self.store.with_records(|records| {
            let mut affected = 0u64;
            for record in records.iter_mut() {
                let row = record.to_row(false);
                if !filters.iter().all(|f| f.matches(&row)) {
                    continue;
                }
                let mut merged = row.clone();
                for (col, value) in updates {
                    if col == "name" {
                        return Err(MeshError::InvalidArgument(
                            "cannot rename a datasource".to_string(),
                        ));
                    }
                    merged.insert(col.clone(), value.clone());
                }
                let mut updated = DatasourceRecord::from_row(&merged)?;
                // a masked password means "keep the stored one"
                if updated.password == MASKED {
                    updated.password = record.password.clone();
                }
                self.reconnect(&updated)?;
                updated.status = "connected".to_string();
                *record = updated;
                affected += 1;
            }
            Ok((affected, affected > 0))
        })
    }

    fn delete(&self, ctx: &QueryContext, table: &str, filters: &[Filter]) -> MeshResult<u64> {
        ctx.check()?;
        if table != TABLE_NAME {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        let manager = self.manager()?;
        self.store.with_records(|records| {
            let before = records.len();
            let mut removed_names = Vec::new();
            records.retain(|record| {
                let row = record.to_row(false);
                let matches = filters.iter().all(|f| f.matches(&row));
                if matches {
                    removed_names.push(record.name.clone());
                }
                !matches
            });
            for name in &removed_names {
                if let Err(e) = manager.unregister(name) {
                    warn!(source = %name, error = %e, "unregister on delete failed");
                }
            }
            let affected = (before - records.len()) as u64;
            Ok((affected, affected > 0))
        })
    }

    fn create_table(&self, _info: &TableInfo, _config: &TableConfig) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "datasource is a fixed virtual table".to_string(),
        ))
    }

    fn drop_table(&self, _table: &str) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "datasource is a fixed virtual table".to_string(),
        ))
    }

    fn truncate_table(&self, _table: &str) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "datasource is a fixed virtual table".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (DatasourceTable, Arc<Manager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(Manager::new());
        let table = DatasourceTable::new(
            dir.path().join("datasources.json"),
            Arc::downgrade(&manager),
        );
        (table, manager, dir)
    }

    fn memory_row(name: &str) -> Row {
        row_from_pairs([
            ("name", Value::from(name)),
            ("type", Value::from("memory")),
            ("password", Value::from("secret")),
            ("writable", Value::Bool(true)),
        ])
    }

    #[test]
    fn insert_registers_and_connects() {
        let (table, manager, _dir) = table();
        let ctx = QueryContext::new();
        let mut rows = vec![memory_row("extra")];
        assert_eq!(table.insert(&ctx, TABLE_NAME, &mut rows).unwrap(), 1);
        assert!(manager.contains("extra"));
        assert!(manager.get("extra").unwrap().is_connected());
    }

    #[test]
    fn password_is_always_masked() {
        let (table, _manager, _dir) = table();
        let ctx = QueryContext::new();
        let mut rows = vec![memory_row("extra")];
        table.insert(&ctx, TABLE_NAME, &mut rows).unwrap();
        let result = table.query(&ctx, TABLE_NAME, &QueryOptions::default()).unwrap();
        assert_eq!(result.rows[0].get("password"), Some(&Value::from("****")));
    }

    #[test]
    fn duplicate_name_rejected() {
        let (table, _manager, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [memory_row("dup")])
            .unwrap();
        assert!(matches!(
            table.insert(&ctx, TABLE_NAME, &mut [memory_row("dup")]),
            Err(MeshError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_unregisters() {
        let (table, manager, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [memory_row("gone")])
            .unwrap();
        let affected = table
            .delete(&ctx, TABLE_NAME, &[Filter::eq("name", "gone")])
            .unwrap();
        assert_eq!(affected, 1);
        assert!(!manager.contains("gone"));
    }

    #[test]
    fn update_reconnects_and_preserves_masked_password() {
        let (table, manager, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [memory_row("upd")])
            .unwrap();
        let updates = row_from_pairs([
            ("host", Value::from("db.internal")),
            ("password", Value::from("****")),
        ]);
        let affected = table
            .update(&ctx, TABLE_NAME, &[Filter::eq("name", "upd")], &updates)
            .unwrap();
        assert_eq!(affected, 1);
        assert!(manager.get("upd").unwrap().is_connected());
        // stored password survived the masked update
        let stored = table
            .store
            .read_records(|r| r[0].password.clone())
            .unwrap();
        assert_eq!(stored, "secret");
    }

    #[test]
    fn unknown_type_rejected() {
        let (table, _manager, _dir) = table();
        let ctx = QueryContext::new();
        let mut rows = vec![row_from_pairs([
            ("name", Value::from("x")),
            ("type", Value::from("oracle")),
        ])];
        assert!(matches!(
            table.insert(&ctx, TABLE_NAME, &mut rows),
            Err(MeshError::InvalidArgument(_))
        ));
    }
}
