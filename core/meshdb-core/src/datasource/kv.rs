//! Key-value-backed data source on sled.
//!
//! All durable state lives under five byte-string prefixes:
//!
//! - `table:<name>`            → serialised TableInfo (JSON)
//! - `row:<table>:<primary>`   → serialised Row (JSON)
//! - `idx:<table>:<col>:<val>` → JSON list of primary keys
//!   (composite: `idx:<t>:<c1_c2>:<v1|v2>`)
//! - `seq:<table>:<col>`       → 64-bit big-endian counter
//! - `config:<table>`          → serialised TableConfig (JSON)
//!
//! Multi-key operations run inside a single sled transaction; sled
//! re-runs the closure on conflict, so the retry loop the contract asks
//! for lives in the storage engine itself. Aborts carry a `MeshError`
//! back out unchanged.

use crate::datasource::DataSource;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{
    ColumnInfo, Filter, QueryOptions, QueryResult, Row, SortDirection, TableConfig, TableInfo,
    Value, decode_row, encode_row, is_integer_type,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Snapshot archive written by `backup`. The checksum is the wrapping
/// byte sum of every key and value, hex-encoded.
#[derive(Serialize, Deserialize)]
struct KvSnapshot {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    checksum: String,
}

fn byte_sum_hex(entries: &[(Vec<u8>, Vec<u8>)]) -> String {
    let mut sum: u64 = 0;
    for (k, v) in entries {
        for b in k.iter().chain(v.iter()) {
            sum = sum.wrapping_add(u64::from(*b));
        }
    }
    format!("{sum:016x}")
}

fn table_key(table: &str) -> Vec<u8> {
    format!("table:{table}").into_bytes()
}

fn config_key(table: &str) -> Vec<u8> {
    format!("config:{table}").into_bytes()
}

fn row_key(table: &str, pk: &str) -> Vec<u8> {
    format!("row:{table}:{pk}").into_bytes()
}

fn row_prefix(table: &str) -> Vec<u8> {
    format!("row:{table}:").into_bytes()
}

fn seq_key(table: &str, col: &str) -> Vec<u8> {
    format!("seq:{table}:{col}").into_bytes()
}

/// Composite indexes concatenate column names with `_` and values with `|`.
fn idx_key(table: &str, cols: &[String], values: &[String]) -> Vec<u8> {
    format!("idx:{table}:{}:{}", cols.join("_"), values.join("|")).into_bytes()
}

fn idx_prefix(table: &str) -> Vec<u8> {
    format!("idx:{table}:").into_bytes()
}

/// The sled-backed backend.
pub struct KvDataSource {
    name: String,
    /// None opens a temporary database (tests, scratch sources)
    path: Option<PathBuf>,
    db: RwLock<Option<sled::Db>>,
    /// tx id → pre-transaction snapshot for rollback
    active_txs: DashMap<u64, Vec<(Vec<u8>, Vec<u8>)>>,
    next_tx_id: std::sync::atomic::AtomicU64,
}

impl KvDataSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            db: RwLock::new(None),
            active_txs: DashMap::new(),
            next_tx_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Temporary on-disk database that is removed on drop.
    pub fn temporary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            db: RwLock::new(None),
            active_txs: DashMap::new(),
            next_tx_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn db(&self) -> MeshResult<sled::Db> {
        self.db
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| MeshError::SourceUnavailable {
                name: self.name.clone(),
                reason: "not connected".to_string(),
            })
    }

    fn load_table_info(&self, db: &sled::Db, table: &str) -> MeshResult<TableInfo> {
        let bytes = db
            .get(table_key(table))?
            .ok_or_else(|| MeshError::TableNotFound(table.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn load_table_config(&self, db: &sled::Db, table: &str) -> MeshResult<TableConfig> {
        match db.get(config_key(table))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(TableConfig::default()),
        }
    }

    /// Primary-key display string for a row. Tables without a primary use
    /// the row sequence as a hidden rowid.
    fn pk_string(info: &TableInfo, row: &Row) -> Option<String> {
        let pk = info.primary_column()?;
        row.get(&pk.name).filter(|v| !v.is_null()).map(Value::to_string)
    }

    /// All `(pk, row)` pairs visible for a table, using an index when a
    /// single equality filter targets an indexed column set.
    fn scan_rows(
        &self,
        ctx: &QueryContext,
        db: &sled::Db,
        table: &str,
        config: &TableConfig,
        filters: &[Filter],
    ) -> MeshResult<Vec<(String, Row)>> {
        if let Some(pks) = self.index_candidates(db, table, config, filters)? {
            let mut out = Vec::with_capacity(pks.len());
            for pk in pks {
                ctx.check()?;
                if let Some(bytes) = db.get(row_key(table, &pk))? {
                    let row = decode_row(&bytes)?;
                    if filters.iter().all(|f| f.matches(&row)) {
                        out.push((pk, row));
                    }
                }
            }
            return Ok(out);
        }

        let prefix = row_prefix(table);
        let mut out = Vec::new();
        for (i, entry) in db.scan_prefix(&prefix).enumerate() {
            if i % 1024 == 0 {
                ctx.check()?;
            }
            let (key, bytes) = entry?;
            let row = decode_row(&bytes)?;
            if filters.iter().all(|f| f.matches(&row)) {
                let pk = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
                out.push((pk, row));
            }
        }
        Ok(out)
    }

    fn index_candidates(
        &self,
        db: &sled::Db,
        table: &str,
        config: &TableConfig,
        filters: &[Filter],
    ) -> MeshResult<Option<Vec<String>>> {
        if filters.len() != 1 {
            return Ok(None);
        }
        let Filter::Compare {
            field,
            op: crate::types::CompareOp::Eq,
            value,
        } = &filters[0]
        else {
            return Ok(None);
        };
        let indexed = config
            .indexes
            .iter()
            .any(|cols| cols.len() == 1 && &cols[0] == field);
        if !indexed {
            return Ok(None);
        }
        let key = idx_key(table, std::slice::from_ref(field), &[value.to_string()]);
        match db.get(key)? {
            Some(bytes) => {
                let pks: Vec<String> = serde_json::from_slice(&bytes)?;
                Ok(Some(pks))
            }
            None => Ok(Some(Vec::new())),
        }
    }

    /// Walk every row prefix and confirm each value decodes. Returns the
    /// number of rows checked.
    pub fn verify_integrity(&self) -> MeshResult<usize> {
        let db = self.db()?;
        let mut checked = 0usize;
        for entry in db.scan_prefix(b"row:") {
            let (key, bytes) = entry?;
            decode_row(&bytes).map_err(|e| {
                MeshError::Integrity(format!(
                    "undecodable row at '{}': {e}",
                    String::from_utf8_lossy(&key)
                ))
            })?;
            checked += 1;
        }
        Ok(checked)
    }
}

type TxResult<T> = Result<T, ConflictableTransactionError<MeshError>>;

fn abort<T>(err: MeshError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn unwrap_txn<T>(result: Result<T, TransactionError<MeshError>>) -> MeshResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(MeshError::Sled { source: e }),
    }
}

/// Add `pk` to the JSON posting list at `key` inside a transaction.
fn tx_index_add(tx: &sled::transaction::TransactionalTree, key: Vec<u8>, pk: &str) -> TxResult<()> {
    let mut pks: Vec<String> = match tx.get(&key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ConflictableTransactionError::Abort(MeshError::from(e)))?,
        None => Vec::new(),
    };
    if !pks.iter().any(|p| p == pk) {
        pks.push(pk.to_string());
    }
    let encoded = serde_json::to_vec(&pks)
        .map_err(|e| ConflictableTransactionError::Abort(MeshError::from(e)))?;
    tx.insert(key, encoded)?;
    Ok(())
}

/// Remove `pk` from the posting list at `key`, deleting empty lists.
fn tx_index_remove(
    tx: &sled::transaction::TransactionalTree,
    key: Vec<u8>,
    pk: &str,
) -> TxResult<()> {
    let Some(bytes) = tx.get(&key)? else {
        return Ok(());
    };
    let mut pks: Vec<String> = serde_json::from_slice(&bytes)
        .map_err(|e| ConflictableTransactionError::Abort(MeshError::from(e)))?;
    pks.retain(|p| p != pk);
    if pks.is_empty() {
        tx.remove(key)?;
    } else {
        let encoded = serde_json::to_vec(&pks)
            .map_err(|e| ConflictableTransactionError::Abort(MeshError::from(e)))?;
        tx.insert(key, encoded)?;
    }
    Ok(())
}

/// Index keys a row participates in, per the table's index definitions.
fn index_keys_for(table: &str, config: &TableConfig, row: &Row) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    for cols in &config.indexes {
        let values: Option<Vec<String>> = cols
            .iter()
            .map(|c| row.get(c).filter(|v| !v.is_null()).map(Value::to_string))
            .collect();
        if let Some(values) = values {
            keys.push(idx_key(table, cols, &values));
        }
    }
    keys
}

impl DataSource for KvDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> MeshResult<()> {
        let mut db = self.db.write();
        if db.is_some() {
            return Ok(()); // idempotent
        }
        let opened = match &self.path {
            Some(path) => sled::Config::new().path(path).open()?,
            None => sled::Config::new().temporary(true).open()?,
        };
        *db = Some(opened);
        Ok(())
    }

    fn close(&self) -> MeshResult<()> {
        // open transactions roll back before the handle is released
        let tx_ids: Vec<u64> = self.active_txs.iter().map(|e| *e.key()).collect();
        for tx_id in tx_ids {
            if let Err(e) = self.rollback(tx_id) {
                warn!(source = %self.name, tx_id, error = %e, "rollback on close failed");
            }
        }
        let mut db = self.db.write();
        if let Some(handle) = db.take() {
            handle.flush()?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.db.read().is_some()
    }

    fn get_tables(&self) -> MeshResult<Vec<String>> {
        let db = self.db()?;
        let mut names = Vec::new();
        for entry in db.scan_prefix(b"table:") {
            let (key, _) = entry?;
            names.push(String::from_utf8_lossy(&key[b"table:".len()..]).to_string());
        }
        names.sort();
        Ok(names)
    }

    fn get_table_info(&self, table: &str) -> MeshResult<TableInfo> {
        let db = self.db()?;
        self.load_table_info(&db, table)
    }

    fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult> {
        let db = self.db()?;
        ctx.check()?;
        let info = self.load_table_info(&db, table)?;
        let config = self.load_table_config(&db, table)?;

        let mut rows: Vec<Row> = self
            .scan_rows(ctx, &db, table, &config, &options.filters)?
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
                        projected.insert(col.clone(), row.remove(col).unwrap_or(Value::Null));
                    }
                    projected
                }
            })
            .collect();

        let columns = if options.select_columns.is_empty() {
            info.columns.clone()
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

    fn insert(&self, ctx: &QueryContext, table: &str, rows: &mut [Row]) -> MeshResult<u64> {
        let db = self.db()?;
        let info = self.load_table_info(&db, table)?;
        let config = self.load_table_config(&db, table)?;
        let auto_col = config.auto_increment_column.clone().or_else(|| {
            info.primary_column()
                .filter(|c| is_integer_type(&c.col_type))
                .map(|c| c.name.clone())
        });

        let mut inserted = 0u64;
        for row in rows.iter_mut() {
            ctx.check().map_err(|e| partial(inserted, e))?;

            // validate vector dimensions before touching the store
            for col in &info.columns {
                if let (Some(dim), Some(Value::Vector(v))) = (col.vector_dim, row.get(&col.name)) {
                    if v.len() != dim {
                        return Err(partial(
                            inserted,
                            MeshError::InvalidArgument(format!(
                                "vector column '{}' expects dimension {}, got {}",
                                col.name,
                                dim,
                                v.len()
                            )),
                        ));
                    }
                }
            }

            // assign the next sequence value when the caller supplied none
            if let Some(auto_col) = &auto_col {
                let missing = row.get(auto_col).is_none_or(Value::is_null);
                if missing {
                    let key = seq_key(table, auto_col);
                    let next = unwrap_txn(db.transaction(|tx| {
                        let current = match tx.get(&key)? {
                            Some(bytes) => {
                                let mut buf = [0u8; 8];
                                buf.copy_from_slice(&bytes);
                                i64::from_be_bytes(buf)
                            }
                            None => 0,
                        };
                        let next = current + 1;
                        tx.insert(key.clone(), next.to_be_bytes().to_vec())?;
                        Ok(next)
                    }))
                    .map_err(|e| partial(inserted, e))?;
                    row.insert(auto_col.clone(), Value::Int64(next));
                } else if let Some(Value::Int64(supplied)) = row.get(auto_col) {
                    // keep the sequence monotonic past explicit ids
                    let supplied = *supplied;
                    let key = seq_key(table, auto_col);
                    unwrap_txn(db.transaction(|tx| {
                        let current = match tx.get(&key)? {
                            Some(bytes) => {
                                let mut buf = [0u8; 8];
                                buf.copy_from_slice(&bytes);
                                i64::from_be_bytes(buf)
                            }
                            None => 0,
                        };
                        if supplied > current {
                            tx.insert(key.clone(), supplied.to_be_bytes().to_vec())?;
                        }
                        Ok(())
                    }))
                    .map_err(|e| partial(inserted, e))?;
                }
            }

            let pk = Self::pk_string(&info, row).ok_or_else(|| {
                partial(
                    inserted,
                    MeshError::InvalidArgument(format!(
                        "insert into '{table}' requires a primary key value"
                    )),
                )
            })?;

            let encoded = encode_row(row).map_err(|e| partial(inserted, e))?;
            let rkey = row_key(table, &pk);
            let ikeys = index_keys_for(table, &config, row);

            unwrap_txn(db.transaction(|tx| {
                if tx.get(&rkey)?.is_some() {
                    return abort(MeshError::Conflict(format!(
                        "duplicate primary key '{pk}' in table '{table}'"
                    )));
                }
                tx.insert(rkey.clone(), encoded.clone())?;
                for ikey in &ikeys {
                    tx_index_add(tx, ikey.clone(), &pk)?;
                }
                Ok(())
            }))
            .map_err(|e| partial(inserted, e))?;
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
        let db = self.db()?;
        let info = self.load_table_info(&db, table)?;
        let config = self.load_table_config(&db, table)?;
        if let Some(pk) = info.primary_column() {
            if updates.contains_key(&pk.name) {
                return Err(MeshError::InvalidArgument(format!(
                    "cannot update primary column '{}'",
                    pk.name
                )));
            }
        }
        let matches = self.scan_rows(ctx, &db, table, &config, filters)?;
        if matches.is_empty() {
            return Ok(0);
        }

        // one transaction for the whole statement: all-or-nothing
        let mut writes = Vec::with_capacity(matches.len());
        for (pk, old_row) in &matches {
            let mut new_row = old_row.clone();
            for (col, value) in updates {
                new_row.insert(col.clone(), value.clone());
            }
            let encoded = encode_row(&new_row)?;
            let old_ikeys = index_keys_for(table, &config, old_row);
            let new_ikeys = index_keys_for(table, &config, &new_row);
            writes.push((row_key(table, pk), pk.clone(), encoded, old_ikeys, new_ikeys));
        }

        unwrap_txn(db.transaction(|tx| {
            for (rkey, pk, encoded, old_ikeys, new_ikeys) in &writes {
                tx.insert(rkey.clone(), encoded.clone())?;
                for ikey in old_ikeys {
                    tx_index_remove(tx, ikey.clone(), pk)?;
                }
                for ikey in new_ikeys {
                    tx_index_add(tx, ikey.clone(), pk)?;
                }
            }
            Ok(())
        }))?;
        Ok(matches.len() as u64)
    }

    fn delete(&self, ctx: &QueryContext, table: &str, filters: &[Filter]) -> MeshResult<u64> {
        let db = self.db()?;
        let _info = self.load_table_info(&db, table)?;
        let config = self.load_table_config(&db, table)?;
        let matches = self.scan_rows(ctx, &db, table, &config, filters)?;
        if matches.is_empty() {
            return Ok(0);
        }

        let mut removals = Vec::with_capacity(matches.len());
        for (pk, row) in &matches {
            removals.push((row_key(table, pk), pk.clone(), index_keys_for(table, &config, row)));
        }

        unwrap_txn(db.transaction(|tx| {
            for (rkey, pk, ikeys) in &removals {
                tx.remove(rkey.clone())?;
                for ikey in ikeys {
                    tx_index_remove(tx, ikey.clone(), pk)?;
                }
            }
            Ok(())
        }))?;
        Ok(matches.len() as u64)
    }

    fn create_table(&self, info: &TableInfo, config: &TableConfig) -> MeshResult<()> {
        let db = self.db()?;
        info.validate()?;
        if db.get(table_key(&info.name))?.is_some() {
            return Err(MeshError::AlreadyExists(info.name.clone()));
        }
        let mut config = config.clone();
        if config.auto_increment_column.is_none() {
            config.auto_increment_column = info
                .primary_column()
                .filter(|c| is_integer_type(&c.col_type))
                .map(|c| c.name.clone());
        }
        db.insert(table_key(&info.name), serde_json::to_vec(info)?)?;
        db.insert(config_key(&info.name), serde_json::to_vec(&config)?)?;
        if let Some(auto_col) = &config.auto_increment_column {
            db.insert(seq_key(&info.name, auto_col), 0i64.to_be_bytes().to_vec())?;
        }
        debug!(table = %info.name, source = %self.name, "create table");
        Ok(())
    }

    fn drop_table(&self, table: &str) -> MeshResult<()> {
        let db = self.db()?;
        if db.remove(table_key(table))?.is_none() {
            return Err(MeshError::TableNotFound(table.to_string()));
        }
        db.remove(config_key(table))?;
        for prefix in [row_prefix(table), idx_prefix(table), format!("seq:{table}:").into_bytes()] {
            let keys: Vec<sled::IVec> = db
                .scan_prefix(&prefix)
                .filter_map(|e| e.ok().map(|(k, _)| k))
                .collect();
            for key in keys {
                db.remove(key)?;
            }
        }
        Ok(())
    }

    fn truncate_table(&self, table: &str) -> MeshResult<()> {
        let db = self.db()?;
        let _info = self.load_table_info(&db, table)?;
        let config = self.load_table_config(&db, table)?;
        for prefix in [row_prefix(table), idx_prefix(table)] {
            let keys: Vec<sled::IVec> = db
                .scan_prefix(&prefix)
                .filter_map(|e| e.ok().map(|(k, _)| k))
                .collect();
            for key in keys {
                db.remove(key)?;
            }
        }
        if let Some(auto_col) = &config.auto_increment_column {
            db.insert(seq_key(table, auto_col), 0i64.to_be_bytes().to_vec())?;
        }
        Ok(())
    }

    fn begin(&self) -> MeshResult<u64> {
        let db = self.db()?;
        let mut snapshot = Vec::new();
        for entry in db.iter() {
            let (k, v) = entry?;
            snapshot.push((k.to_vec(), v.to_vec()));
        }
        let tx_id = self
            .next_tx_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        self.active_txs.insert(tx_id, snapshot);
        Ok(tx_id)
    }

    fn commit(&self, tx_id: u64) -> MeshResult<()> {
        self.active_txs
            .remove(&tx_id)
            .map(|_| ())
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown transaction {tx_id}")))
    }

    fn rollback(&self, tx_id: u64) -> MeshResult<()> {
        let (_, snapshot) = self
            .active_txs
            .remove(&tx_id)
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown transaction {tx_id}")))?;
        let db = self.db()?;
        db.clear()?;
        for (k, v) in snapshot {
            db.insert(k, v)?;
        }
        Ok(())
    }

    fn backup(&self) -> MeshResult<Vec<u8>> {
        let db = self.db()?;
        let mut entries = Vec::new();
        for entry in db.iter() {
            let (k, v) = entry?;
            entries.push((k.to_vec(), v.to_vec()));
        }
        let checksum = byte_sum_hex(&entries);
        let snapshot = KvSnapshot { entries, checksum };
        bincode::serialize(&snapshot).map_err(|e| MeshError::Serialization(e.to_string()))
    }

    fn restore(&self, data: &[u8]) -> MeshResult<()> {
        let snapshot: KvSnapshot =
            bincode::deserialize(data).map_err(|e| MeshError::Serialization(e.to_string()))?;
        let expected = byte_sum_hex(&snapshot.entries);
        if expected != snapshot.checksum {
            return Err(MeshError::Integrity(format!(
                "backup checksum mismatch: expected {expected}, got {}",
                snapshot.checksum
            )));
        }
        let db = self.db()?;
        db.clear()?;
        for (k, v) in snapshot.entries {
            db.insert(k, v)?;
        }
        Ok(())
    }
}

fn partial(inserted: u64, err: MeshError) -> MeshError {
    if inserted == 0 || matches!(err, MeshError::Canceled) {
        return err;
    }
    MeshError::SqlExecution {
        message: err.to_string(),
        context: format!("{inserted} rows inserted before failure"),
    }
}
