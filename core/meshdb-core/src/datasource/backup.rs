//! Named backups over any data source.
//!
//! A backup captures whatever `DataSource::backup` emits for the source
//! (a KV snapshot for the sled backend, a JSON export for the in-memory
//! backend) together with a byte-sum checksum verified on restore.

use crate::datasource::DataSource;
use crate::error::{MeshError, MeshResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::info;

struct BackupArchive {
    source: String,
    created_at: SystemTime,
    payload: Vec<u8>,
    checksum: String,
}

fn payload_checksum(payload: &[u8]) -> String {
    let mut sum: u64 = 0;
    for b in payload {
        sum = sum.wrapping_add(u64::from(*b));
    }
    format!("{sum:016x}")
}

/// Description of a stored backup.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub name: String,
    pub source: String,
    pub created_at: SystemTime,
    pub size: usize,
    pub checksum: String,
}

#[derive(Default)]
pub struct BackupManager {
    archives: Mutex<HashMap<String, BackupArchive>>,
}

impl BackupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `source` under `name`. Fails with `AlreadyExists` when the
    /// name is taken.
    pub fn create(&self, name: impl Into<String>, source: &dyn DataSource) -> MeshResult<()> {
        let name = name.into();
        let mut archives = self.archives.lock();
        if archives.contains_key(&name) {
            return Err(MeshError::AlreadyExists(name));
        }
        let payload = source.backup()?;
        let checksum = payload_checksum(&payload);
        info!(backup = %name, source = source.name(), size = payload.len(), "backup created");
        archives.insert(
            name,
            BackupArchive {
                source: source.name().to_string(),
                created_at: SystemTime::now(),
                payload,
                checksum,
            },
        );
        Ok(())
    }

    /// Restore `name` into `target`. A checksum mismatch is fatal for the
    /// operation and leaves the target untouched.
    pub fn restore(&self, name: &str, target: &dyn DataSource) -> MeshResult<()> {
        let archives = self.archives.lock();
        let archive = archives
            .get(name)
            .ok_or_else(|| MeshError::BackupNotFound(name.to_string()))?;
        if payload_checksum(&archive.payload) != archive.checksum {
            return Err(MeshError::Integrity(format!(
                "backup '{name}' failed checksum verification"
            )));
        }
        target.restore(&archive.payload)
    }

    pub fn delete(&self, name: &str) -> MeshResult<()> {
        self.archives
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| MeshError::BackupNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<BackupInfo> {
        let archives = self.archives.lock();
        let mut out: Vec<BackupInfo> = archives
            .iter()
            .map(|(name, a)| BackupInfo {
                name: name.clone(),
                source: a.source.clone(),
                created_at: a.created_at,
                size: a.payload.len(),
                checksum: a.checksum.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemoryDataSource;
    use crate::runtime::QueryContext;
    use crate::types::{ColumnInfo, QueryOptions, TableConfig, TableInfo, Value, row_from_pairs};

    fn seeded_source(name: &str) -> MemoryDataSource {
        let ds = MemoryDataSource::new(name);
        ds.connect().unwrap();
        ds.create_table(
            &TableInfo::new("t", vec![ColumnInfo::primary("id", "INT")]),
            &TableConfig::default(),
        )
        .unwrap();
        let ctx = QueryContext::new();
        let mut rows = vec![row_from_pairs([("id", Value::Int64(1))])];
        crate::datasource::DataSource::insert(&ds, &ctx, "t", &mut rows).unwrap();
        ds
    }

    #[test]
    fn create_restore_cycle() {
        let manager = BackupManager::new();
        let source = seeded_source("src");
        manager.create("nightly", &source).unwrap();

        let target = MemoryDataSource::new("dst");
        target.connect().unwrap();
        manager.restore("nightly", &target).unwrap();

        let ctx = QueryContext::new();
        let result = crate::datasource::DataSource::query(
            &target,
            &ctx,
            "t",
            &QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn duplicate_name_rejected() {
        let manager = BackupManager::new();
        let source = seeded_source("src");
        manager.create("b1", &source).unwrap();
        assert!(matches!(
            manager.create("b1", &source),
            Err(MeshError::AlreadyExists(_))
        ));
    }

    #[test]
    fn unknown_backup_not_found() {
        let manager = BackupManager::new();
        let target = seeded_source("dst");
        assert!(matches!(
            manager.restore("nope", &target),
            Err(MeshError::BackupNotFound(_))
        ));
        assert!(matches!(
            manager.delete("nope"),
            Err(MeshError::BackupNotFound(_))
        ));
    }

    #[test]
    fn list_describes_archives() {
        let manager = BackupManager::new();
        let source = seeded_source("src");
        manager.create("b1", &source).unwrap();
        let list = manager.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "b1");
        assert_eq!(list[0].source, "src");
        assert!(list[0].size > 0);
    }
}
