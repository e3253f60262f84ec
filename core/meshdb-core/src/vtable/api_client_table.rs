//! The writable `api_client` virtual table.
//!
//! Backed by `api_clients.json`. Insert generates the credentials:
//! `api_key` is a UUIDv4, `api_secret` is 32 random bytes hex-encoded.
//! The secret is returned masked.

use crate::datasource::DataSource;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{
    ColumnInfo, Filter, QueryOptions, QueryResult, Row, TableConfig, TableInfo, Value,
    row_from_pairs,
};
use crate::vtable::JsonFileStore;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const TABLE_NAME: &str = "api_client";
const MASKED: &str = "****";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiClientRecord {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub permissions: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiClientRecord {
    fn to_row(&self, mask_secret: bool) -> Row {
        row_from_pairs([
            ("name", Value::Str(self.name.clone())),
            ("api_key", Value::Str(self.api_key.clone())),
            (
                "api_secret",
                Value::Str(if mask_secret {
                    MASKED.to_string()
                } else {
                    self.api_secret.clone()
                }),
            ),
            ("enabled", Value::Bool(self.enabled)),
            ("permissions", Value::Str(self.permissions.clone())),
            ("created_at", Value::Timestamp(self.created_at)),
            ("updated_at", Value::Timestamp(self.updated_at)),
        ])
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Random UUIDv4 from the process RNG.
fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40; // version 4
    bytes[8] = (bytes[8] & 0x3f) | 0x80; // RFC 4122 variant
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let hex = hex.join("");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// 32 random bytes, hex-encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct ApiClientTable {
    store: JsonFileStore<ApiClientRecord>,
}

impl ApiClientTable {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store: JsonFileStore::new(path.as_ref()),
        }
    }

    /// The unmasked secret, available once through the admin surface.
    pub fn reveal_secret(&self, name: &str) -> MeshResult<String> {
        self.store.read_records(|records| {
            records
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.api_secret.clone())
        })?
        .ok_or_else(|| MeshError::InvalidArgument(format!("unknown api client '{name}'")))
    }

    fn schema() -> TableInfo {
        TableInfo::new(
            TABLE_NAME,
            vec![
                ColumnInfo::primary("name", "VARCHAR(64)"),
                ColumnInfo::new("api_key", "VARCHAR(36)"),
                ColumnInfo::new("api_secret", "VARCHAR(64)"),
                ColumnInfo::new("enabled", "BOOLEAN"),
                ColumnInfo::new("permissions", "TEXT"),
                ColumnInfo::new("created_at", "TIMESTAMP"),
                ColumnInfo::new("updated_at", "TIMESTAMP"),
            ],
        )
    }
}

impl DataSource for ApiClientTable {
    fn name(&self) -> &str {
        "api_client_config"
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
        for row in rows.iter_mut() {
            let name = row
                .get("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    MeshError::InvalidArgument("api_client requires a name".to_string())
                })?;
            let now = now_ms();
            let record = ApiClientRecord {
                name: name.clone(),
                api_key: generate_uuid(),
                api_secret: generate_secret(),
                enabled: !matches!(row.get("enabled"), Some(Value::Bool(false))),
                permissions: row
                    .get("permissions")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                created_at: now,
                updated_at: now,
            };
            self.store.with_records(|records| {
                if records.iter().any(|r| r.name == record.name) {
                    return Err(MeshError::AlreadyExists(record.name.clone()));
                }
                records.push(record.clone());
                Ok(((), true))
            })?;
            // hand the generated key back; the secret stays masked
            row.insert("api_key".to_string(), Value::Str(record.api_key.clone()));
            row.insert("api_secret".to_string(), Value::Str(MASKED.to_string()));
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
                for (col, value) in updates {
                    match col.as_str() {
                        "enabled" => {
                            record.enabled = matches!(value, Value::Bool(true));
                        }
                        "permissions" => {
                            record.permissions = value.to_string();
                        }
                        "name" | "api_key" | "api_secret" | "created_at" | "updated_at" => {
                            return Err(MeshError::InvalidArgument(format!(
                                "column '{col}' is not updatable"
                            )));
                        }
                        other => {
                            return Err(MeshError::InvalidArgument(format!(
                                "unknown column '{other}'"
                            )));
                        }
                    }
                }
                record.updated_at = now_ms();
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
        self.store.with_records(|records| {
            let before = records.len();
            records.retain(|record| {
                let row = record.to_row(false);
                !filters.iter().all(|f| f.matches(&row))
            });
            let affected = (before - records.len()) as u64;
            Ok((affected, affected > 0))
        })
    }

    fn create_table(&self, _info: &TableInfo, _config: &TableConfig) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "api_client is a fixed virtual table".to_string(),
        ))
    }

    fn drop_table(&self, _table: &str) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "api_client is a fixed virtual table".to_string(),
        ))
    }

    fn truncate_table(&self, _table: &str) -> MeshResult<()> {
        Err(MeshError::InvalidArgument(
            "api_client is a fixed virtual table".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (ApiClientTable, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let table = ApiClientTable::new(dir.path().join("api_clients.json"));
        (table, dir)
    }

    #[test]
    fn insert_generates_credentials() {
        let (table, _dir) = table();
        let ctx = QueryContext::new();
        let mut rows = vec![row_from_pairs([("name", Value::from("svc"))])];
        table.insert(&ctx, TABLE_NAME, &mut rows).unwrap();

        // key is a well-formed UUIDv4, written back to the caller's row
        let key = rows[0].get("api_key").unwrap().as_str().unwrap().to_string();
        assert_eq!(key.len(), 36);
        assert_eq!(key.split('-').count(), 5);
        assert_eq!(&key[14..15], "4");
        // the caller's view of the secret is masked
        assert_eq!(rows[0].get("api_secret"), Some(&Value::from("****")));
        // the stored secret is 32 bytes hex
        let secret = table.reveal_secret("svc").unwrap();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn query_masks_secret() {
        let (table, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [row_from_pairs([("name", Value::from("svc"))])])
            .unwrap();
        let result = table.query(&ctx, TABLE_NAME, &QueryOptions::default()).unwrap();
        assert_eq!(result.rows[0].get("api_secret"), Some(&Value::from("****")));
        assert_eq!(result.rows[0].get("enabled"), Some(&Value::Bool(true)));
    }

    #[test]
    fn update_touches_updated_at_only_where_allowed() {
        let (table, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [row_from_pairs([("name", Value::from("svc"))])])
            .unwrap();

        let updates = row_from_pairs([("enabled", Value::Bool(false))]);
        let affected = table
            .update(&ctx, TABLE_NAME, &[Filter::eq("name", "svc")], &updates)
            .unwrap();
        assert_eq!(affected, 1);
        let result = table.query(&ctx, TABLE_NAME, &QueryOptions::default()).unwrap();
        assert_eq!(result.rows[0].get("enabled"), Some(&Value::Bool(false)));

        let bad = row_from_pairs([("api_secret", Value::from("mine"))]);
        assert!(matches!(
            table.update(&ctx, TABLE_NAME, &[Filter::eq("name", "svc")], &bad),
            Err(MeshError::InvalidArgument(_))
        ));
    }

    #[test]
    fn delete_removes_record() {
        let (table, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [row_from_pairs([("name", Value::from("svc"))])])
            .unwrap();
        assert_eq!(
            table
                .delete(&ctx, TABLE_NAME, &[Filter::eq("name", "svc")])
                .unwrap(),
            1
        );
        let result = table.query(&ctx, TABLE_NAME, &QueryOptions::default()).unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn duplicate_name_rejected() {
        let (table, _dir) = table();
        let ctx = QueryContext::new();
        table
            .insert(&ctx, TABLE_NAME, &mut [row_from_pairs([("name", Value::from("svc"))])])
            .unwrap();
        assert!(matches!(
            table.insert(&ctx, TABLE_NAME, &mut [row_from_pairs([("name", Value::from("svc"))])]),
            Err(MeshError::AlreadyExists(_))
        ));
    }
}
