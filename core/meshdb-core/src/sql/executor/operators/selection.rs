//! Selection — row-at-a-time predicate evaluation.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::expr::{evaluate, truthy};
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::planner::Expr;
use crate::types::{ColumnInfo, QueryResult};

pub struct SelectionOperator {
    child: Box<dyn PhysicalOperator>,
    predicate: Expr,
}

impl SelectionOperator {
    pub fn new(child: Box<dyn PhysicalOperator>, predicate: Expr) -> Self {
        Self { child, predicate }
    }
}

impl PhysicalOperator for SelectionOperator {
    fn schema(&self) -> &[ColumnInfo] {
        self.child.schema()
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let mut result = self.child.execute(ctx)?;
        ctx.check()?;
        let mut kept = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            if truthy(&evaluate(&self.predicate, &row)?) {
                kept.push(row);
            }
        }
        result.total = kept.len() as u64;
        result.rows = kept;
        Ok(result)
    }
}
