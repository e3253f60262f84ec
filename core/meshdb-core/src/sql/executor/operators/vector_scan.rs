//! VectorScan — ANN search with row hydration.
//!
//! Delegates to the vector index manager, fetches the matching rows
//! through the routed Service, and attaches a synthesised `_distance`
//! column to each result row.

use crate::datasource::Service;
use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::{VectorScanConfig, distance_column};
use crate::types::{ColumnInfo, Filter, QueryOptions, QueryResult, Value};
use crate::vector::IndexManager;
use std::sync::Arc;

pub struct VectorScanOperator {
    service: Service,
    vectors: Arc<IndexManager>,
    config: VectorScanConfig,
    schema: Vec<ColumnInfo>,
}

impl VectorScanOperator {
    pub fn new(
        service: Service,
        vectors: Arc<IndexManager>,
        config: VectorScanConfig,
        schema: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            service,
            vectors,
            config,
            schema,
        }
    }
}

impl PhysicalOperator for VectorScanOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        ctx.check()?;

        // over-fetch when row filters may reject candidates
        let fetch = if self.config.filters.is_empty() {
            self.config.k
        } else {
            self.config.k * 4
        };
        let found = self.vectors.search(
            &self.config.table,
            &self.config.column,
            &self.config.query_vector,
            fetch,
            None,
        )?;

        let info = self.service.table_info(&self.config.table)?;
        let pk = info
            .primary_column()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "id".to_string());

        let mut columns = info.columns.clone();
        columns.push(distance_column());

        let mut rows = Vec::with_capacity(self.config.k);
        for (id, distance) in found.ids.iter().zip(found.distances.iter()) {
            ctx.check()?;
            let options = QueryOptions::with_filters(vec![Filter::eq(
                pk.clone(),
                Value::Int64(*id as i64),
            )]);
            let result = self.service.query(ctx, &self.config.table, &options)?;
            let Some(mut row) = result.rows.into_iter().next() else {
                continue; // index entry without a backing row
            };
            if !self.config.filters.iter().all(|f| f.matches(&row)) {
                continue;
            }
            row.insert("_distance".to_string(), Value::Float64(f64::from(*distance)));
            rows.push(row);
            if rows.len() == self.config.k {
                break;
            }
        }

        Ok(QueryResult {
            columns,
            total: rows.len() as u64,
            rows,
        })
    }
}
