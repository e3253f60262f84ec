//! Rule 1: predicate pushdown.
//!
//! Filters move as close to the scan as possible so sources can reject
//! rows before returning them.

use crate::error::MeshResult;
use crate::sql::optimizer::map_children;
use crate::sql::planner::{BinaryOperator, Expr, LogicalPlan};

use super::OptimizationRule;

pub struct PredicatePushdownRule;

impl OptimizationRule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        self.push_down(plan)
    }
}

impl PredicatePushdownRule {
    fn push_down(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        match plan {
            LogicalPlan::Filter { input, predicate } => {
                let optimized_input = self.push_down(*input)?;
                match optimized_input {
                    // pushing through a projection is safe when the
                    // predicate only touches pass-through columns
                    LogicalPlan::Project {
                        input: project_input,
                        projections,
                    } if is_column_predicate(&predicate) => {
                        let pushed = self.push_down(LogicalPlan::Filter {
                            input: project_input,
                            predicate,
                        })?;
                        Ok(LogicalPlan::Project {
                            input: Box::new(pushed),
                            projections,
                        })
                    }
                    LogicalPlan::Scan {
                        table,
                        columns,
                        filter,
                    } => {
                        let merged = match filter {
                            Some(existing) => Expr::BinaryOp {
                                left: Box::new(existing),
                                op: BinaryOperator::And,
                                right: Box::new(predicate),
                            },
                            None => predicate,
                        };
                        Ok(LogicalPlan::Scan {
                            table,
                            columns,
                            filter: Some(merged),
                        })
                    }
                    other => Ok(LogicalPlan::Filter {
                        input: Box::new(other),
                        predicate,
                    }),
                }
            }
            other => map_children(other, &|child| self.push_down(child)),
        }
    }
}

/// True when the expression references only columns and literals (no
/// computed projections that would change its meaning).
fn is_column_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::Column(_) | Expr::Literal(_) => true,
        Expr::BinaryOp { left, right, .. } => {
            is_column_predicate(left) && is_column_predicate(right)
        }
        Expr::Like { expr, pattern, .. } => {
            is_column_predicate(expr) && is_column_predicate(pattern)
        }
        Expr::InList { expr, list, .. } => {
            is_column_predicate(expr) && list.iter().all(is_column_predicate)
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => is_column_predicate(inner),
        Expr::Function { .. } | Expr::ScalarFunc { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(table: &str) -> LogicalPlan {
        LogicalPlan::Scan {
            table: table.to_string(),
            columns: vec![],
            filter: None,
        }
    }

    fn eq_predicate(col: &str, v: i64) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::column(col)),
            op: BinaryOperator::Eq,
            right: Box::new(Expr::literal(v)),
        }
    }

    #[test]
    fn filter_merges_into_scan() {
        let plan = LogicalPlan::Filter {
            input: Box::new(scan("t")),
            predicate: eq_predicate("a", 1),
        };
        let pushed = PredicatePushdownRule.apply(plan).unwrap();
        let LogicalPlan::Scan { filter, .. } = pushed else {
            panic!("expected Scan");
        };
        assert!(filter.is_some());
    }

    #[test]
    fn stacked_filters_and_together() {
        let plan = LogicalPlan::Filter {
            input: Box::new(LogicalPlan::Filter {
                input: Box::new(scan("t")),
                predicate: eq_predicate("a", 1),
            }),
            predicate: eq_predicate("b", 2),
        };
        let pushed = PredicatePushdownRule.apply(plan).unwrap();
        let LogicalPlan::Scan { filter: Some(f), .. } = pushed else {
            panic!("expected filtered Scan");
        };
        assert!(matches!(
            f,
            Expr::BinaryOp {
                op: BinaryOperator::And,
                ..
            }
        ));
    }

    #[test]
    fn filter_stays_above_join() {
        let plan = LogicalPlan::Filter {
            input: Box::new(LogicalPlan::Join {
                left: Box::new(scan("a")),
                right: Box::new(scan("b")),
                join_type: crate::sql::planner::JoinType::Inner,
                on: Expr::literal(true),
            }),
            predicate: eq_predicate("x", 1),
        };
        let pushed = PredicatePushdownRule.apply(plan).unwrap();
        assert!(matches!(pushed, LogicalPlan::Filter { .. }));
    }
}
