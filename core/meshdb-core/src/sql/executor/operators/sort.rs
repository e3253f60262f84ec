//! Sort — stable multi-key sort; nulls compare less than non-nulls.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::expr::evaluate;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::SortConfig;
use crate::types::{ColumnInfo, QueryResult, Value};
use std::cmp::Ordering;

pub struct SortOperator {
    child: Box<dyn PhysicalOperator>,
    config: SortConfig,
}

impl SortOperator {
    pub fn new(child: Box<dyn PhysicalOperator>, config: SortConfig) -> Self {
        Self { child, config }
    }
}

impl PhysicalOperator for SortOperator {
    fn schema(&self) -> &[ColumnInfo] {
        self.child.schema()
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let mut result = self.child.execute(ctx)?;
        ctx.check()?;

        // evaluate all keys up front so the comparator stays infallible
        let mut keyed: Vec<(Vec<Value>, crate::types::Row)> = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let mut keys = Vec::with_capacity(self.config.items.len());
            for item in &self.config.items {
                keys.push(evaluate(&item.expr, &row)?);
            }
            keyed.push((keys, row));
        }

        let directions: Vec<bool> = self.config.items.iter().map(|i| i.asc).collect();
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), asc) in a.iter().zip(b.iter()).zip(&directions) {
                let ord = x.compare(y);
                let ord = if *asc { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        result.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(result)
    }
}
