//! Projection — per-row expression evaluation with aliases.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::expr::evaluate;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::planner::Expr;
use crate::types::{ColumnInfo, QueryResult, Row};

pub struct ProjectionOperator {
    child: Box<dyn PhysicalOperator>,
    exprs: Vec<(Expr, Option<String>)>,
    schema: Vec<ColumnInfo>,
}

impl ProjectionOperator {
    pub fn new(
        child: Box<dyn PhysicalOperator>,
        exprs: Vec<(Expr, Option<String>)>,
        schema: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            child,
            exprs,
            schema,
        }
    }

    fn output_names(&self) -> Vec<String> {
        self.exprs
            .iter()
            .map(|(expr, alias)| {
                alias
                    .clone()
                    .unwrap_or_else(|| expr.default_name())
            })
            .collect()
    }
}

impl PhysicalOperator for ProjectionOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let child_result = self.child.execute(ctx)?;
        ctx.check()?;

        // SELECT *: pass the child through untouched
        if self.exprs.is_empty() {
            return Ok(child_result);
        }

        let names = self.output_names();
        let mut rows = Vec::with_capacity(child_result.rows.len());
        for row in &child_result.rows {
            let mut projected = Row::new();
            for ((expr, _), name) in self.exprs.iter().zip(&names) {
                projected.insert(name.clone(), evaluate(expr, row)?);
            }
            rows.push(projected);
        }

        Ok(QueryResult {
            columns: self.schema.clone(),
            total: rows.len() as u64,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::executor::operators::tests_support::ValuesOperator;
    use crate::sql::planner::BinaryOperator;
    use crate::types::{Value, row_from_pairs};

    #[test]
    fn evaluates_exprs_with_aliases() {
        let child = ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT")],
            vec![row_from_pairs([("x", Value::Int64(4))])],
        );
        let exprs = vec![
            (Expr::column("x"), None),
            (
                Expr::BinaryOp {
                    left: Box::new(Expr::column("x")),
                    op: BinaryOperator::Multiply,
                    right: Box::new(Expr::literal(2i64)),
                },
                Some("doubled".to_string()),
            ),
        ];
        let schema = vec![
            ColumnInfo::new("x", "INT"),
            ColumnInfo::new("doubled", "INT"),
        ];
        let mut op = ProjectionOperator::new(Box::new(child), exprs, schema);
        let result = op.execute(&QueryContext::new()).unwrap();
        assert_eq!(result.rows[0].get("x"), Some(&Value::Int64(4)));
        assert_eq!(result.rows[0].get("doubled"), Some(&Value::Int64(8)));
    }

    #[test]
    fn empty_projection_is_passthrough() {
        let child = ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT")],
            vec![row_from_pairs([("x", Value::Int64(1))])],
        );
        let mut op = ProjectionOperator::new(Box::new(child), vec![], vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.columns.len(), 1);
    }
}
