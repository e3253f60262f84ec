//! CRUD facade used by the physical operators.
//!
//! Every operation resolves its target source through the [`Router`] at
//! call time — never through a cached primary — so re-routing a table
//! mid-session takes effect immediately.

use crate::datasource::Router;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::types::{Filter, QueryOptions, QueryResult, Row, TableConfig, TableInfo, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Service {
    router: Arc<Router>,
}

impl Service {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn table_info(&self, table: &str) -> MeshResult<TableInfo> {
        self.router.route(table)?.get_table_info(table)
    }

    pub fn query(
        &self,
        ctx: &QueryContext,
        table: &str,
        options: &QueryOptions,
    ) -> MeshResult<QueryResult> {
        let source = self.router.route(table)?;
        debug!(table, source = source.name(), "query routed");
        source.query(ctx, table, options)
    }

    /// Insert rows and return `(rows_affected, last_insert_id)`.
    ///
    /// The source writes assigned sequence values back into the row maps;
    /// the last-insert-id is read from the last row's primary column after
    /// the write.
    pub fn insert(
        &self,
        ctx: &QueryContext,
        table: &str,
        rows: &mut [Row],
    ) -> MeshResult<(u64, Option<i64>)> {
        let source = self.router.route(table)?;
        let affected = source.insert(ctx, table, rows)?;
        let last_insert_id = source
            .get_table_info(table)
            .ok()
            .and_then(|info| info.primary_column().map(|c| c.name.clone()))
            .and_then(|pk| rows.last().and_then(|row| row.get(&pk).cloned()))
            .and_then(|value| match value {
                Value::Int64(id) => Some(id),
                _ => None,
            });
        Ok((affected, last_insert_id))
    }

    pub fn update(
        &self,
        ctx: &QueryContext,
        table: &str,
        filters: &[Filter],
        updates: &Row,
    ) -> MeshResult<u64> {
        self.router.route(table)?.update(ctx, table, filters, updates)
    }

    pub fn delete(&self, ctx: &QueryContext, table: &str, filters: &[Filter]) -> MeshResult<u64> {
        self.router.route(table)?.delete(ctx, table, filters)
    }

    pub fn create_table(&self, info: &TableInfo, config: &TableConfig) -> MeshResult<()> {
        self.router.route(&info.name)?.create_table(info, config)
    }

    pub fn drop_table(&self, table: &str) -> MeshResult<()> {
        self.router.route(table)?.drop_table(table)
    }

    pub fn truncate_table(&self, table: &str) -> MeshResult<()> {
        self.router.route(table)?.truncate_table(table)
    }

    /// True when the routed source advertises filter pushdown.
    pub fn supports_filter_pushdown(&self, table: &str) -> bool {
        self.router
            .route(table)
            .map(|s| s.supports_filter_pushdown())
            .unwrap_or(false)
    }

    /// Tables visible across all routed sources would require a full
    /// registry walk; this resolves one table's existence cheaply.
    pub fn table_exists(&self, table: &str) -> bool {
        self.router
            .route(table)
            .and_then(|s| s.get_table_info(table))
            .is_ok()
    }

    /// Raw passthrough for sources that speak SQL natively.
    pub fn execute_raw(&self, ctx: &QueryContext, table: &str, sql: &str) -> MeshResult<QueryResult> {
        match self.router.route(table)?.execute(ctx, sql) {
            Err(MeshError::NotImplemented(_)) => Err(MeshError::SqlNotSupported {
                feature: "raw SQL passthrough".to_string(),
                hint: "route the table to a SQL-speaking source".to_string(),
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DataSource, Manager, MemoryDataSource};
    use crate::types::{ColumnInfo, row_from_pairs};

    fn service_with_users() -> Service {
        let manager = Arc::new(Manager::new());
        let router = Arc::new(Router::with_manager(manager));
        let service = Service::new(router);
        service
            .create_table(
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
        service
    }

    #[test]
    fn insert_returns_last_insert_id() {
        let service = service_with_users();
        let ctx = QueryContext::new();
        let mut rows = vec![
            row_from_pairs([("name", Value::from("Alice"))]),
            row_from_pairs([("name", Value::from("Bob"))]),
        ];
        let (affected, last_id) = service.insert(&ctx, "users", &mut rows).unwrap();
        assert_eq!(affected, 2);
        assert_eq!(last_id, Some(2));
    }

    #[test]
    fn rerouting_takes_effect_immediately() {
        let manager = Arc::new(Manager::new());
        let other: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new("other"));
        other.connect().unwrap();
        manager.register("other", Arc::clone(&other)).unwrap();

        let router = Arc::new(Router::with_manager(manager));
        let service = Service::new(Arc::clone(&router));

        let info = TableInfo::new(
            "events",
            vec![ColumnInfo::primary("id", "INT")],
        );
        // create on default, then re-route to "other" and create there too
        service.create_table(&info, &TableConfig::default()).unwrap();
        router.add_route("events", "other").unwrap();
        service.create_table(&info, &TableConfig::default()).unwrap();

        let ctx = QueryContext::new();
        let mut rows = vec![row_from_pairs([("id", Value::Int64(1))])];
        service.insert(&ctx, "events", &mut rows).unwrap();

        // the write landed on "other", not on default
        let on_other = other
            .query(&ctx, "events", &QueryOptions::default())
            .unwrap();
        assert_eq!(on_other.rows.len(), 1);

        router.remove_route("events").unwrap();
        let on_default = service
            .query(&ctx, "events", &QueryOptions::default())
            .unwrap();
        assert!(on_default.rows.is_empty());
    }
}
