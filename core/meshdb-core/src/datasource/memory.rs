//! MVCC in-memory data source.
//!
//! Rows are append-only version chains keyed by the primary value; a
//! monotonic transaction timestamp selects the visible version. Writes
//! take a per-table write lock, readers walk the skip map without it.
//! Auto-increment uses a per-table 64-bit counter — monotonic, never
//! reused, gaps permitted after rollback.

use crate::datasource::DataSource;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{
    ColumnInfo, Filter, QueryOptions, QueryResult, Row, SortDirection, TableConfig, TableInfo,
    Value, hash_key, is_integer_type,
};
use ahash::AHashMap;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tracing::debug;

/// Monotonic logical clock for MVCC visibility and commit ordering.
#[derive(Debug)]
pub struct TimestampOracle {
    next_ts: AtomicU64,
}

impl Default for TimestampOracle {
    fn default() -> Self {
        Self {
            next_ts: AtomicU64::new(1),
        }
    }
}

impl TimestampOracle {
    /// Allocate and return the next timestamp.
    pub fn next(&self) -> u64 {
        self.next_ts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read the current timestamp without incrementing.
    pub fn read(&self) -> u64 {
        self.next_ts.load(Ordering::SeqCst)
    }
}

/// One version in a chain. `None` is a delete tombstone.
type Version = (u64, Option<Row>);

/// Versions kept newest-first.
type VersionChain = RwLock<Vec<Version>>;

struct MemTable {
    info: TableInfo,
    config: TableConfig,
    /// primary hash key → version chain
    rows: SkipMap<String, VersionChain>,
    /// Serialises writers; readers never take it
    write_lock: Mutex<()>,
    /// Doubles as the hidden rowid source for tables without a primary
    auto_inc: AtomicI64,
    /// column → value hash key → set of primary hash keys
    indexes: RwLock<AHashMap<String, AHashMap<String, BTreeSet<String>>>>,
}

impl MemTable {
    fn new(info: TableInfo, config: TableConfig) -> Self {
        let mut indexes = AHashMap::new();
        for cols in &config.indexes {
            // the in-memory backend maintains single-column indexes;
            // composites are a KV-backend concern
            if let [col] = cols.as_slice() {
                indexes.insert(col.clone(), AHashMap::new());
            }
        }
        Self {
            info,
            config,
            rows: SkipMap::new(),
            write_lock: Mutex::new(()),
            auto_inc: AtomicI64::new(0),
            indexes: RwLock::new(indexes),
        }
    }

    /// Visible row of a chain at `read_ts`, if any.
    fn visible(chain: &VersionChain, read_ts: u64) -> Option<Row> {
        let versions = chain.read();
        for (commit_ts, row) in versions.iter() {
            if *commit_ts <= read_ts {
                return row.clone();
            }
        }
        None
    }

    fn index_insert(&self, row: &Row, pk_key: &str) {
        let mut indexes = self.indexes.write();
        for (col, entries) in indexes.iter_mut() {
            if let Some(value) = row.get(col) {
                entries
                    .entry(hash_key(value))
                    .or_default()
                    .insert(pk_key.to_string());
            }
        }
    }

    fn index_remove(&self, row: &Row, pk_key: &str) {
        let mut indexes = self.indexes.write();
        for (col, entries) in indexes.iter_mut() {
            if let Some(value) = row.get(col) {
                let key = hash_key(value);
                if let Some(set) = entries.get_mut(&key) {
                    set.remove(pk_key);
                    if set.is_empty() {
                        entries.remove(&key);
                    }
                }
            }
        }
    }

    /// Rebuild every index from the rows visible at `read_ts`. Used after
    /// rollback truncation.
    fn rebuild_indexes(&self, read_ts: u64) {
        let mut indexes = self.indexes.write();
        for entries in indexes.values_mut() {
            entries.clear();
        }
        for entry in self.rows.iter() {
            if let Some(row) = Self::visible(entry.value(), read_ts) {
                for (col, entries) in indexes.iter_mut() {
                    if let Some(value) = row.get(col) {
                        entries
                            .entry(hash_key(value))
                            .or_default()
                            .insert(entry.key().clone());
                    }
                }
            }
        }
    }
}

/// Serialised form of one table for the JSON export.
#[derive(Serialize, Deserialize)]
struct TableExport {
    info: TableInfo,
    config: TableConfig,
    auto_inc: i64,
    rows: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct MemoryExport {
    tables: Vec<TableExport>,
}

/// The MVCC in-memory backend.
pub struct MemoryDataSource {
    name: String,
    connected: AtomicBool,
    oracle: TimestampOracle,
    tables: DashMap<String, Arc<MemTable>>,
    /// tx id → begin timestamp
    active_txs: DashMap<u64, u64>,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(false),
            oracle: TimestampOracle::default(),
            tables: DashMap::new(),
            active_txs: DashMap::new(),
        }
    }

    fn ensure_connected(&self) -> MeshResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MeshError::SourceUnavailable {
                name: self.name.clone(),
                reason: "not connected".to_string(),
            })
        }
    }

    fn table(&self, name: &str) -> MeshResult<Arc<MemTable>> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| MeshError::TableNotFound(name.to_string()))
    }

    /// Primary hash key for a row, assigning auto-increment / rowid values
    /// as needed. Returns the key and whether an id was assigned.
    fn primary_key_for(&self, table: &MemTable, row: &mut Row) -> MeshResult<String> {
        match table.info.primary_column() {
            Some(pk) => {
                let current = row.get(&pk.name).cloned().unwrap_or(Value::Null);
                if current.is_null() {
                    if is_integer_type(&pk.col_type) {
                        let id = table.auto_inc.fetch_add(1, Ordering::SeqCst) + 1;
                        row.insert(pk.name.clone(), Value::Int64(id));
                        Ok(hash_key(&Value::Int64(id)))
                    } else {
                        Err(MeshError::InvalidArgument(format!(
                            "primary column '{}' requires a value",
                            pk.name
                        )))
                    }
                } else {
                    // keep the counter ahead of user-supplied ids so the
                    // sequence stays monotonic and never reuses a value
                    if let Value::Int64(supplied) = current {
                        table.auto_inc.fetch_max(supplied, Ordering::SeqCst);
                    }
                    Ok(hash_key(&current))
                }
            }
            None => {
                let rowid = table.auto_inc.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("r:{rowid}"))
            }
        }
    }

    fn validate_row(&self, table: &MemTable, row: &Row) -> MeshResult<()> {
        for (name, value) in row {
            let col = table.info.column(name).ok_or_else(|| {
                MeshError::InvalidArgument(format!(
                    "unknown column '{}' in table '{}'",
                    name, table.info.name
                ))
            })?;
            if let Some(dim) = col.vector_dim {
                if let Value::Vector(v) = value {
                    if v.len() != dim {
                        return Err(MeshError::InvalidArgument(format!(
                            "vector column '{}' expects dimension {}, got {}",
                            name,
                            dim,
                            v.len()
                        )));
                    }
                } else if !value.is_null() {
                    return Err(MeshError::TypeMismatch {
                        expected: "vector".to_string(),
                        actual: value.type_name().to_string(),
                    });
                }
            }
            if !col.nullable && !col.primary && value.is_null() {
                return Err(MeshError::InvalidArgument(format!(
                    "column '{}' is not nullable",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Rows visible at `read_ts` matching all filters. Uses an index when
    /// a single equality filter targets an indexed column.
    fn visible_rows(
        &self,
        ctx: &QueryContext,
        table: &MemTable,
        filters: &[Filter],
        read_ts: u64,
    ) -> MeshResult<Vec<(String, Row)>> {
        let candidates: Option<Vec<String>> = self.index_candidates(table, filters);
        let mut out = Vec::new();
        let mut scanned = 0usize;

        let mut check_row = |pk_key: &str, chain: &VersionChain| -> MeshResult<()> {
            if let Some(row) = MemTable::visible(chain, read_ts) {
                if filters.iter().all(|f| f.matches(&row)) {
                    out.push((pk_key.to_string(), row));
                }
            }
            Ok(())
        };

        match candidates {
            Some(pk_keys) => {
                for pk_key in pk_keys {
                    ctx.check()?;
                    if let Some(entry) = table.rows.get(&pk_key) {
                        check_row(&pk_key, entry.value())?;
                    }
                }
            }
            None => {
                for entry in table.rows.iter() {
                    scanned += 1;
                    if scanned % 1024 == 0 {
                        ctx.check()?;
                    }
                    check_row(entry.key(), entry.value())?;
                }
            }
        }
        Ok(out)
    }

    /// Primary keys from a secondary index when exactly one equality
    /// filter hits an indexed column.
    fn index_candidates(&self, table: &MemTable, filters: &[Filter]) -> Option<Vec<String>> {
        if filters.len() != 1 {
            return None;
        }
        let Filter::Compare {
            field,
            op: crate::types::CompareOp::Eq,
            value,
        } = &filters[0]
        else {
            return None;
        };
        // primary-key point lookups bypass the scan entirely
        if let Some(pk) = table.info.primary_column() {
            if &pk.name == field {
                return Some(vec![hash_key(value)]);
            }
        }
        let indexes = table.indexes.read();
        let entries = indexes.get(field)?;
        Some(
            entries
                .get(&hash_key(value))
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default(),
        )
    }

    /// Drop every version newer than `begin_ts` across all tables, then
    /// rebuild the affected indexes.
    fn truncate_after(&self, begin_ts: u64) {
        let read_ts = self.oracle.read();
        for table in self.tables.iter() {
            let table = table.value();
            let _guard = table.write_lock.lock();
            let mut emptied = Vec::new();
            for entry in table.rows.iter() {
                let mut versions = entry.value().write();
                versions.retain(|(ts, _)| *ts <= begin_ts);
                if versions.is_empty() {
                    emptied.push(entry.key().clone());
                }
            }
            for key in emptied {
                table.rows.remove(&key);
            }
            table.rebuild_indexes(read_ts);
        }
    }

    /// Drop non-latest versions older than the watermark. Returns how many
    /// versions were removed.
    pub fn collect_garbage(&self, min_active_ts: u64) -> usize {
        let mut removed = 0;
        for table in self.tables.iter() {
            let table = table.value();
            let _guard = table.write_lock.lock();
            for entry in table.rows.iter() {
                let mut versions = entry.value().write();
                if versions.len() <= 1 {
                    continue;
                }
                let before = versions.len();
                let mut kept = 0usize;
                versions.retain(|(ts, _)| {
                    kept += 1;
                    kept == 1 || *ts >= min_active_ts
                });
                removed += before - versions.len();
            }
        }
        removed
    }

    fn project(columns: &[ColumnInfo], select: &[String]) -> Vec<ColumnInfo> {
        if select.is_empty() {
            return columns.to_vec();
        }
        select
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .unwrap_or_else(|| ColumnInfo::new(name.clone(), "TEXT"))
            })
            .collect()
    }
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> MeshResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> MeshResult<()> {
        // open transactions roll back; in-memory state itself lives until
        // the source is dropped so a reconnect sees the same data
        let open: Vec<(u64, u64)> = self
            .active_txs
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        for (tx_id, begin_ts) in open {
            self.truncate_after(begin_ts);
            self.active_txs.remove(&tx_id);
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_tables(&self) -> MeshResult<Vec<String>> {
        self.ensure_connected()?;
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn get_table_info(&self, table: &str) -> MeshResult<TableInfo> {
        self.ensure_connected()?;
        Ok(self.table(table)?.info.clone())
    }

    fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult> {
        self.ensure_connected()?;
        ctx.check()?;
        let table = self.table(table)?;
        let read_ts = self.oracle.read();

        let mut rows: Vec<Row> = self
            .visible_rows(ctx, &table, &options.filters, read_ts)?
            .into_iter()
            .map(|(_, row)| row)
            .collect();

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
                        projected.insert(
                            col.clone(),
                            row.remove(col).unwrap_or(Value::Null),
                        );
                    }
                    projected
                }
            })
            .collect();

        Ok(QueryResult {
            columns: Self::project(&table.info.columns, &options.select_columns),
            rows,
            total,
        })
    }

    fn insert(&self, ctx: &QueryContext, table: &str, rows: &mut [Row]) -> MeshResult<u64> {
        self.ensure_connected()?;
        let table = self.table(table)?;
        let mut inserted = 0u64;
        for row in rows.iter_mut() {
            ctx.check().map_err(|e| partial(inserted, e))?;
            let _guard = table.write_lock.lock();
            self.validate_row(&table, row)
                .map_err(|e| partial(inserted, e))?;
            let pk_key = self
                .primary_key_for(&table, row)
                .map_err(|e| partial(inserted, e))?;
            let read_ts = self.oracle.read();
            if let Some(entry) = table.rows.get(&pk_key) {
                if MemTable::visible(entry.value(), read_ts).is_some() {
                    return Err(partial(
                        inserted,
                        MeshError::Conflict(format!(
                            "duplicate primary key in table '{}'",
                            table.info.name
                        )),
                    ));
                }
            }
            let commit_ts = self.oracle.next();
            match table.rows.get(&pk_key) {
                Some(entry) => entry.value().write().insert(0, (commit_ts, Some(row.clone()))),
                None => {
                    table
                        .rows
                        .insert(pk_key.clone(), RwLock::new(vec![(commit_ts, Some(row.clone()))]));
                }
            }
            table.index_insert(row, &pk_key);
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
        self.ensure_connected()?;
        let table = self.table(table)?;
        let _guard = table.write_lock.lock();
        if let Some(pk) = table.info.primary_column() {
            if updates.contains_key(&pk.name) {
                return Err(MeshError::InvalidArgument(format!(
                    "cannot update primary column '{}'",
                    pk.name
                )));
            }
        }
        let read_ts = self.oracle.read();
        let matches = self.visible_rows(ctx, &table, filters, read_ts)?;
        let commit_ts = self.oracle.next();
        let mut affected = 0u64;
        for (pk_key, old_row) in matches {
            let mut new_row = old_row.clone();
            for (col, value) in updates {
                new_row.insert(col.clone(), value.clone());
            }
            self.validate_row(&table, &new_row)?;
            if let Some(entry) = table.rows.get(&pk_key) {
                entry.value().write().insert(0, (commit_ts, Some(new_row.clone())));
            }
            table.index_remove(&old_row, &pk_key);
            table.index_insert(&new_row, &pk_key);
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&self, ctx: &QueryContext, table: &str, filters: &[Filter]) -> MeshResult<u64> {
        self.ensure_connected()?;
        let table = self.table(table)?;
        let _guard = table.write_lock.lock();
        let read_ts = self.oracle.read();
        let matches = self.visible_rows(ctx, &table, filters, read_ts)?;
        let commit_ts = self.oracle.next();
        let mut affected = 0u64;
        for (pk_key, old_row) in matches {
            if let Some(entry) = table.rows.get(&pk_key) {
                entry.value().write().insert(0, (commit_ts, None));
            }
            table.index_remove(&old_row, &pk_key);
            affected += 1;
        }
        Ok(affected)
    }

    fn create_table(&self, info: &TableInfo, config: &TableConfig) -> MeshResult<()> {
        self.ensure_connected()?;
        info.validate()?;
        if self.tables.contains_key(&info.name) {
            return Err(MeshError::AlreadyExists(info.name.clone()));
        }
        debug!(table = %info.name, source = %self.name, "create table");
        self.tables.insert(
            info.name.clone(),
            Arc::new(MemTable::new(info.clone(), config.clone())),
        );
        Ok(())
    }

    fn drop_table(&self, table: &str) -> MeshResult<()> {
        self.ensure_connected()?;
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| MeshError::TableNotFound(table.to_string()))
    }

    fn truncate_table(&self, table: &str) -> MeshResult<()> {
        self.ensure_connected()?;
        let table = self.table(table)?;
        let _guard = table.write_lock.lock();
        let keys: Vec<String> = table.rows.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            table.rows.remove(&key);
        }
        let mut indexes = table.indexes.write();
        for entries in indexes.values_mut() {
            entries.clear();
        }
        table.auto_inc.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn begin(&self) -> MeshResult<u64> {
        self.ensure_connected()?;
        let begin_ts = self.oracle.next();
        self.active_txs.insert(begin_ts, begin_ts);
        Ok(begin_ts)
    }

    fn commit(&self, tx_id: u64) -> MeshResult<()> {
        self.active_txs
            .remove(&tx_id)
            .map(|_| ())
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown transaction {tx_id}")))
    }

    fn rollback(&self, tx_id: u64) -> MeshResult<()> {
        let (_, begin_ts) = self
            .active_txs
            .remove(&tx_id)
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown transaction {tx_id}")))?;
        self.truncate_after(begin_ts);
        Ok(())
    }

    fn backup(&self) -> MeshResult<Vec<u8>> {
        self.ensure_connected()?;
        let read_ts = self.oracle.read();
        let mut tables = Vec::new();
        for entry in self.tables.iter() {
            let table = entry.value();
            let mut rows = Vec::new();
            for chain in table.rows.iter() {
                if let Some(row) = MemTable::visible(chain.value(), read_ts) {
                    let mut obj = serde_json::Map::new();
                    for (k, v) in &row {
                        obj.insert(k.clone(), v.to_json());
                    }
                    rows.push(serde_json::Value::Object(obj));
                }
            }
            tables.push(TableExport {
                info: table.info.clone(),
                config: table.config.clone(),
                auto_inc: table.auto_inc.load(Ordering::SeqCst),
                rows,
            });
        }
        Ok(serde_json::to_vec(&MemoryExport { tables })?)
    }

    fn restore(&self, data: &[u8]) -> MeshResult<()> {
        self.ensure_connected()?;
        let export: MemoryExport = serde_json::from_slice(data)?;
        self.tables.clear();
        for table_export in export.tables {
            let table = Arc::new(MemTable::new(table_export.info, table_export.config));
            for json in &table_export.rows {
                let obj = json.as_object().ok_or_else(|| {
                    MeshError::Integrity("row in backup is not an object".to_string())
                })?;
                let mut row = Row::new();
                for (k, v) in obj {
                    row.insert(k.clone(), Value::from_json(v)?);
                }
                let pk_key = match table.info.primary_column() {
                    Some(pk) => hash_key(row.get(&pk.name).unwrap_or(&Value::Null)),
                    None => format!("r:{}", table.rows.len() as i64 + 1),
                };
                let commit_ts = self.oracle.next();
                table
                    .rows
                    .insert(pk_key.clone(), RwLock::new(vec![(commit_ts, Some(row.clone()))]));
                table.index_insert(&row, &pk_key);
            }
            table
                .auto_inc
                .store(table_export.auto_inc, Ordering::SeqCst);
            self.tables.insert(table.info.name.clone(), table);
        }
        Ok(())
    }
}

fn partial(inserted: u64, err: MeshError) -> MeshError {
    // cancellation propagates untouched
    if inserted == 0 || matches!(err, MeshError::Canceled) {
        return err;
    }
    MeshError::SqlExecution {
        message: err.to_string(),
        context: format!("{inserted} rows inserted before failure"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;

    fn users_source() -> MemoryDataSource {
        let ds = MemoryDataSource::new("mem");
        ds.connect().unwrap();
        ds.create_table(
            &TableInfo::new(
                "users",
                vec![
                    ColumnInfo::primary("id", "INT"),
                    ColumnInfo::new("name", "VARCHAR(255)"),
                ],
            ),
            &TableConfig::default(),
        )
        .unwrap();
        ds
    }

    fn insert_user(ds: &MemoryDataSource, id: Option<i64>, name: &str) -> Row {
        let ctx = QueryContext::new();
        let mut rows = vec![match id {
            Some(id) => row_from_pairs([("id", Value::Int64(id)), ("name", Value::from(name))]),
            None => row_from_pairs([("name", Value::from(name))]),
        }];
        ds.insert(&ctx, "users", &mut rows).unwrap();
        rows.pop().unwrap()
    }

    #[test]
    fn insert_then_point_select_returns_row() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, Some(1), "Alice");
        let result = ds
            .query(
                &ctx,
                "users",
                &QueryOptions::with_filters(vec![Filter::eq("id", 1i64)]),
            )
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn auto_increment_assigns_and_writes_back() {
        let ds = users_source();
        let row = insert_user(&ds, None, "Alice");
        assert_eq!(row.get("id"), Some(&Value::Int64(1)));
        let row = insert_user(&ds, None, "Bob");
        assert_eq!(row.get("id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn auto_increment_skips_past_explicit_ids() {
        let ds = users_source();
        insert_user(&ds, Some(10), "Alice");
        let row = insert_user(&ds, None, "Bob");
        assert_eq!(row.get("id"), Some(&Value::Int64(11)));
    }

    #[test]
    fn duplicate_primary_key_conflicts() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, Some(1), "Alice");
        let mut rows = vec![row_from_pairs([
            ("id", Value::Int64(1)),
            ("name", Value::from("Imposter")),
        ])];
        assert!(matches!(
            ds.insert(&ctx, "users", &mut rows),
            Err(MeshError::Conflict(_))
        ));
    }

    #[test]
    fn update_and_delete_round_trip() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, Some(1), "Alice");
        insert_user(&ds, Some(2), "Bob");

        let updates = row_from_pairs([("name", Value::from("Alicia"))]);
        let affected = ds
            .update(&ctx, "users", &[Filter::eq("id", 1i64)], &updates)
            .unwrap();
        assert_eq!(affected, 1);

        let result = ds
            .query(
                &ctx,
                "users",
                &QueryOptions::with_filters(vec![Filter::eq("id", 1i64)]),
            )
            .unwrap();
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Alicia")));

        let affected = ds
            .delete(&ctx, "users", &[Filter::eq("id", 2i64)])
            .unwrap();
        assert_eq!(affected, 1);
        let result = ds.query(&ctx, "users", &QueryOptions::default()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.total, 1);
    }

    #[test]
    fn delete_is_a_tombstone_not_a_reuse() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, None, "Alice");
        ds.delete(&ctx, "users", &[Filter::eq("id", 1i64)]).unwrap();
        // the counter does not reuse 1
        let row = insert_user(&ds, None, "Bob");
        assert_eq!(row.get("id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn offset_limit_and_total() {
        let ds = users_source();
        let ctx = QueryContext::new();
        for i in 1..=5 {
            insert_user(&ds, Some(i), &format!("u{i}"));
        }
        let options = QueryOptions {
            offset: 1,
            limit: Some(2),
            order_by: Some("id".to_string()),
            ..QueryOptions::default()
        };
        let result = ds.query(&ctx, "users", &options).unwrap();
        assert_eq!(result.total, 5); // pre-LIMIT cardinality
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn order_by_desc() {
        let ds = users_source();
        let ctx = QueryContext::new();
        for i in [3i64, 1, 2] {
            insert_user(&ds, Some(i), &format!("u{i}"));
        }
        let options = QueryOptions {
            order_by: Some("id".to_string()),
            order_direction: SortDirection::Desc,
            ..QueryOptions::default()
        };
        let result = ds.query(&ctx, "users", &options).unwrap();
        let ids: Vec<i64> = result
            .rows
            .iter()
            .map(|r| r.get("id").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn rollback_truncates_versions_and_keeps_gap() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, None, "Alice");
        let tx = ds.begin().unwrap();
        insert_user(&ds, None, "Bob");
        ds.rollback(tx).unwrap();
        let result = ds.query(&ctx, "users", &QueryOptions::default()).unwrap();
        assert_eq!(result.rows.len(), 1);
        // the id Bob consumed is gone for good
        let row = insert_user(&ds, None, "Carol");
        assert_eq!(row.get("id"), Some(&Value::Int64(3)));
    }

    #[test]
    fn secondary_index_lookup_matches_scan() {
        let ds = MemoryDataSource::new("mem");
        ds.connect().unwrap();
        ds.create_table(
            &TableInfo::new(
                "orders",
                vec![
                    ColumnInfo::primary("id", "INT"),
                    ColumnInfo::new("user_id", "INT"),
                ],
            ),
            &TableConfig {
                indexes: vec![vec!["user_id".to_string()]],
                ..TableConfig::default()
            },
        )
        .unwrap();
        let ctx = QueryContext::new();
        let mut rows = vec![
            row_from_pairs([("user_id", Value::Int64(1))]),
            row_from_pairs([("user_id", Value::Int64(1))]),
            row_from_pairs([("user_id", Value::Int64(2))]),
        ];
        ds.insert(&ctx, "orders", &mut rows).unwrap();
        let result = ds
            .query(
                &ctx,
                "orders",
                &QueryOptions::with_filters(vec![Filter::eq("user_id", 1i64)]),
            )
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn vector_dimension_validated_on_insert() {
        let ds = MemoryDataSource::new("mem");
        ds.connect().unwrap();
        ds.create_table(
            &TableInfo::new(
                "docs",
                vec![
                    ColumnInfo::primary("id", "INT"),
                    ColumnInfo::vector("embedding", 3),
                ],
            ),
            &TableConfig::default(),
        )
        .unwrap();
        let ctx = QueryContext::new();
        let mut bad = vec![row_from_pairs([
            ("id", Value::Int64(1)),
            ("embedding", Value::Vector(vec![1.0, 2.0])),
        ])];
        assert!(matches!(
            ds.insert(&ctx, "docs", &mut bad),
            Err(MeshError::InvalidArgument(_))
        ));
    }

    #[test]
    fn backup_restore_round_trip() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, Some(1), "Alice");
        insert_user(&ds, Some(2), "Bob");
        let snapshot = ds.backup().unwrap();

        let restored = MemoryDataSource::new("mem2");
        restored.connect().unwrap();
        restored.restore(&snapshot).unwrap();
        let result = restored
            .query(&ctx, "users", &QueryOptions::default())
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn gc_keeps_latest_version() {
        let ds = users_source();
        let ctx = QueryContext::new();
        insert_user(&ds, Some(1), "Alice");
        for name in ["a", "b", "c"] {
            let updates = row_from_pairs([("name", Value::from(name))]);
            ds.update(&ctx, "users", &[Filter::eq("id", 1i64)], &updates)
                .unwrap();
        }
        let removed = ds.collect_garbage(u64::MAX);
        assert_eq!(removed, 3);
        let result = ds
            .query(
                &ctx,
                "users",
                &QueryOptions::with_filters(vec![Filter::eq("id", 1i64)]),
            )
            .unwrap();
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("c")));
    }

    #[test]
    fn canceled_context_aborts_query() {
        let ds = users_source();
        let ctx = QueryContext::new();
        ctx.cancel();
        assert!(matches!(
            ds.query(&ctx, "users", &QueryOptions::default()),
            Err(MeshError::Canceled)
        ));
    }

    #[test]
    fn disconnected_source_is_unavailable() {
        let ds = MemoryDataSource::new("mem");
        assert!(matches!(
            ds.get_tables(),
            Err(MeshError::SourceUnavailable { .. })
        ));
    }
}
