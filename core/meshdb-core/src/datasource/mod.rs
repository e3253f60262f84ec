//! Data sources: the storage contract, the built-in backends, and the
//! registry/routing layer the executor goes through.
//!
//! Every backend implements [`DataSource`]; operators never talk to a
//! backend directly — they resolve one through the [`Router`] on every
//! call so re-routing a table mid-session takes effect immediately.

mod backup;
mod kv;
mod manager;
mod memory;
mod router;
mod service;

pub use backup::BackupManager;
pub use kv::KvDataSource;
pub use manager::{DEFAULT_SOURCE, HealthReport, Manager};
pub use memory::MemoryDataSource;
pub use router::Router;
pub use service::Service;

use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{Filter, QueryOptions, QueryResult, Row, TableConfig, TableInfo};

/// The storage contract every backend implements.
///
/// Sources are shared as `Arc<dyn DataSource>`; all methods take `&self`
/// and synchronise internally. `connect` is idempotent; `close` releases
/// all resources deterministically and rolls back open transactions.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn connect(&self) -> MeshResult<()>;
    fn close(&self) -> MeshResult<()>;
    fn is_connected(&self) -> bool;

    /// Ordered sequence of table names.
    fn get_tables(&self) -> MeshResult<Vec<String>>;
    fn get_table_info(&self, table: &str) -> MeshResult<TableInfo>;

    /// The source MAY honour any subset of the options; the caller checks
    /// the returned columns and re-applies what was ignored.
    fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult>;

    /// Inserts rows, assigning the next sequence value to an integer
    /// primary column when the caller supplied none — the assigned id is
    /// written back into the row map. Stops at the first error; rows
    /// inserted before it stay.
    fn insert(&self, ctx: &QueryContext, table: &str, rows: &mut [Row]) -> MeshResult<u64>;

    fn update(
        &self,
        ctx: &QueryContext,
        table: &str,
        filters: &[Filter],
        updates: &Row,
    ) -> MeshResult<u64>;

    fn delete(&self, ctx: &QueryContext, table: &str, filters: &[Filter]) -> MeshResult<u64>;

    fn create_table(&self, info: &TableInfo, config: &TableConfig) -> MeshResult<()>;
    fn drop_table(&self, table: &str) -> MeshResult<()>;
    fn truncate_table(&self, table: &str) -> MeshResult<()>;

    /// Optional raw-SQL passthrough for sources that speak SQL natively.
    fn execute(&self, _ctx: &QueryContext, sql: &str) -> MeshResult<QueryResult> {
        let _ = sql;
        Err(MeshError::NotImplemented(format!(
            "raw SQL passthrough on source '{}'",
            self.name()
        )))
    }

    /// Begin an explicit transaction; returns its id.
    fn begin(&self) -> MeshResult<u64> {
        Err(MeshError::NotImplemented(format!(
            "transactions on source '{}'",
            self.name()
        )))
    }

    fn commit(&self, _tx_id: u64) -> MeshResult<()> {
        Err(MeshError::NotImplemented(format!(
            "transactions on source '{}'",
            self.name()
        )))
    }

    fn rollback(&self, _tx_id: u64) -> MeshResult<()> {
        Err(MeshError::NotImplemented(format!(
            "transactions on source '{}'",
            self.name()
        )))
    }

    /// Serialise the source's full state for backup.
    fn backup(&self) -> MeshResult<Vec<u8>> {
        Err(MeshError::NotImplemented(format!(
            "backup on source '{}'",
            self.name()
        )))
    }

    /// Restore state produced by [`DataSource::backup`].
    fn restore(&self, _data: &[u8]) -> MeshResult<()> {
        Err(MeshError::NotImplemented(format!(
            "restore on source '{}'",
            self.name()
        )))
    }

    fn supports_filter_pushdown(&self) -> bool {
        true
    }

    fn supports_order_pushdown(&self) -> bool {
        false
    }
}
