//! TableScan — routed source read with pushdown.

use crate::datasource::Service;
use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::ScanConfig;
use crate::types::{ColumnInfo, QueryOptions, QueryResult, Row, Value};

/// Resolves its source through the router on every execution and
/// delegates filters, offset and limit when the source supports them;
/// whatever the source ignored is re-applied locally.
pub struct TableScanOperator {
    service: Service,
    config: ScanConfig,
    schema: Vec<ColumnInfo>,
}

impl TableScanOperator {
    pub fn new(service: Service, config: ScanConfig, schema: Vec<ColumnInfo>) -> Self {
        Self {
            service,
            config,
            schema,
        }
    }
}

impl PhysicalOperator for TableScanOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        ctx.check()?;
        let pushdown = self.service.supports_filter_pushdown(&self.config.table);

        let options = if pushdown {
            QueryOptions {
                select_columns: self.config.select_columns.clone(),
                filters: self.config.filters.clone(),
                offset: self.config.offset,
                limit: self.config.limit,
                order_by: self.config.order_by.clone(),
                order_direction: self.config.order_direction,
            }
        } else {
            // the source can't filter; pull everything and apply the
            // whole window locally
            QueryOptions {
                select_columns: self.config.select_columns.clone(),
                ..QueryOptions::default()
            }
        };

        let mut result = self.service.query(ctx, &self.config.table, &options)?;

        if !pushdown {
            result.rows.retain(|row| {
                self.config.filters.iter().all(|f| f.matches(row))
            });
            result.total = result.rows.len() as u64;
            if self.config.offset > 0 {
                result.rows.drain(..self.config.offset.min(result.rows.len()));
            }
            if let Some(limit) = self.config.limit {
                result.rows.truncate(limit);
            }
        }

        // re-project when a projection was requested and the source
        // returned extra columns anyway
        if !self.config.select_columns.is_empty() {
            let wanted = &self.config.select_columns;
            let needs_reproject = result
                .rows
                .iter()
                .any(|row| row.len() != wanted.len() || wanted.iter().any(|c| !row.contains_key(c)));
            if needs_reproject {
                for row in &mut result.rows {
                    let mut projected = Row::new();
                    for col in wanted {
                        projected.insert(col.clone(), row.remove(col).unwrap_or(Value::Null));
                    }
                    *row = projected;
                }
                result.columns = self.schema.clone();
            }
        }

        Ok(result)
    }
}
