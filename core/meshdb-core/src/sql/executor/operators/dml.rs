//! Insert / Update / Delete operators.
//!
//! All three resolve their target source through the router-backed
//! Service on every call; none of them touch a cached primary source.

use crate::datasource::Service;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::sql::executor::expr::evaluate;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::{DeleteConfig, InsertConfig, UpdateConfig};
use crate::types::{ColumnInfo, Filter, QueryResult, Row, Value};
use tracing::debug;

fn affected_schema() -> Vec<ColumnInfo> {
    vec![ColumnInfo::new("rows_affected", "BIGINT")]
}

/// INSERT ... VALUES, INSERT ... SELECT, and ON DUPLICATE KEY UPDATE.
pub struct InsertOperator {
    service: Service,
    config: InsertConfig,
    /// Child plan feeding INSERT ... SELECT
    source: Option<Box<dyn PhysicalOperator>>,
    schema: Vec<ColumnInfo>,
}

impl InsertOperator {
    pub fn new(
        service: Service,
        config: InsertConfig,
        source: Option<Box<dyn PhysicalOperator>>,
    ) -> Self {
        Self {
            service,
            config,
            source,
            schema: affected_schema(),
        }
    }

    /// Rows to insert, either from VALUES expressions or the child plan.
    fn build_rows(&mut self, ctx: &QueryContext) -> MeshResult<Vec<Row>> {
        if let Some(source) = &mut self.source {
            let result = source.execute(ctx)?;
            let child_cols: Vec<String> =
                result.columns.iter().map(|c| c.name.clone()).collect();
            let mut rows = Vec::with_capacity(result.rows.len());
            for child_row in result.rows {
                if self.config.columns.is_empty() {
                    rows.push(child_row);
                } else {
                    if self.config.columns.len() != child_cols.len() {
                        return Err(MeshError::InvalidArgument(format!(
                            "INSERT specifies {} columns but SELECT produces {}",
                            self.config.columns.len(),
                            child_cols.len()
                        )));
                    }
                    let mut row = Row::new();
                    for (target, source_col) in self.config.columns.iter().zip(&child_cols) {
                        row.insert(
                            target.clone(),
                            child_row.get(source_col).cloned().unwrap_or(Value::Null),
                        );
                    }
                    rows.push(row);
                }
            }
            return Ok(rows);
        }

        let columns: Vec<String> = if self.config.columns.is_empty() {
            self.service
                .table_info(&self.config.table)?
                .columns
                .iter()
                .map(|c| c.name.clone())
                .collect()
        } else {
            self.config.columns.clone()
        };

        let empty = Row::new();
        let mut rows = Vec::with_capacity(self.config.values.len());
        for value_exprs in &self.config.values {
            if value_exprs.len() != columns.len() {
                return Err(MeshError::InvalidArgument(format!(
                    "INSERT row has {} values for {} columns",
                    value_exprs.len(),
                    columns.len()
                )));
            }
            let mut row = Row::new();
            for (col, expr) in columns.iter().zip(value_exprs) {
                row.insert(col.clone(), evaluate(expr, &empty)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// ON DUPLICATE KEY UPDATE: build a filter from the conflicting row's
    /// data and run an update in the same source.
    fn upsert_row(&self, ctx: &QueryContext, row: &Row) -> MeshResult<u64> {
        let info = self.service.table_info(&self.config.table)?;
        let filter = match info.primary_column() {
            Some(pk) => match row.get(&pk.name) {
                Some(value) if !value.is_null() => Filter::eq(pk.name.clone(), value.clone()),
                _ => {
                    return Err(MeshError::Conflict(
                        "duplicate key without a usable primary value".to_string(),
                    ));
                }
            },
            None => Filter::And(
                row.iter()
                    .map(|(col, value)| Filter::eq(col.clone(), value.clone()))
                    .collect(),
            ),
        };

        let mut updates = Row::new();
        for (col, expr) in &self.config.on_duplicate {
            updates.insert(col.clone(), evaluate(expr, row)?);
        }
        self.service
            .update(ctx, &self.config.table, &[filter], &updates)
    }
}

impl PhysicalOperator for InsertOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        ctx.check()?;
        let mut rows = self.build_rows(ctx)?;

        if self.config.on_duplicate.is_empty() {
            let (affected, _) = self.service.insert(ctx, &self.config.table, &mut rows)?;
            return Ok(QueryResult::affected(affected));
        }

        // upsert path: insert row by row so each conflict can fall back
        // to its update
        let mut affected = 0u64;
        for row in &mut rows {
            ctx.check()?;
            let single = std::slice::from_mut(row);
            match self.service.insert(ctx, &self.config.table, single) {
                Ok((n, _)) => affected += n,
                Err(MeshError::Conflict(_)) => {
                    debug!(table = %self.config.table, "duplicate key, running update");
                    affected += self.upsert_row(ctx, row)?;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(QueryResult::affected(affected))
    }
}

/// UPDATE with constant assignments.
pub struct UpdateOperator {
    service: Service,
    config: UpdateConfig,
    schema: Vec<ColumnInfo>,
}

impl UpdateOperator {
    pub fn new(service: Service, config: UpdateConfig) -> Self {
        Self {
            service,
            config,
            schema: affected_schema(),
        }
    }
}

impl PhysicalOperator for UpdateOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        ctx.check()?;
        let empty = Row::new();
        let mut updates = Row::new();
        for (col, expr) in &self.config.assignments {
            if !expr.referenced_columns().is_empty() {
                return Err(MeshError::SqlNotSupported {
                    feature: format!("computed assignment for '{col}'"),
                    hint: "SET values must be constants".to_string(),
                });
            }
            updates.insert(col.clone(), evaluate(expr, &empty)?);
        }
        let affected = self
            .service
            .update(ctx, &self.config.table, &self.config.filters, &updates)?;
        Ok(QueryResult::affected(affected))
    }
}

/// DELETE with filters.
pub struct DeleteOperator {
    service: Service,
    config: DeleteConfig,
    schema: Vec<ColumnInfo>,
}

impl DeleteOperator {
    pub fn new(service: Service, config: DeleteConfig) -> Self {
        Self {
            service,
            config,
            schema: affected_schema(),
        }
    }
}

impl PhysicalOperator for DeleteOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        ctx.check()?;
        let affected = self
            .service
            .delete(ctx, &self.config.table, &self.config.filters)?;
        Ok(QueryResult::affected(affected))
    }
}
