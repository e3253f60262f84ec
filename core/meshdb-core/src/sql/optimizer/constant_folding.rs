//! Rule 3: constant folding.
//!
//! Evaluates constant expressions at plan time (1 + 2 → 3); a predicate
//! folding to TRUE removes its filter, one folding to FALSE leaves the
//! filter in place for the executor's empty-result path.

use crate::error::MeshResult;
use crate::sql::optimizer::map_children;
use crate::sql::planner::{BinaryOperator, Expr, LogicalPlan};
use crate::types::Value;

use super::OptimizationRule;

pub struct ConstantFoldingRule;

impl OptimizationRule for ConstantFoldingRule {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn apply(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        self.fold(plan)
    }
}

impl ConstantFoldingRule {
    fn fold(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        match plan {
            LogicalPlan::Filter { input, predicate } => {
                let folded = fold_expr(predicate);
                if let Expr::Literal(Value::Bool(true)) = &folded {
                    return self.fold(*input);
                }
                Ok(LogicalPlan::Filter {
                    input: Box::new(self.fold(*input)?),
                    predicate: folded,
                })
            }
            LogicalPlan::Project { input, projections } => Ok(LogicalPlan::Project {
                input: Box::new(self.fold(*input)?),
                projections: projections
                    .into_iter()
                    .map(|(e, a)| (fold_expr(e), a))
                    .collect(),
            }),
            LogicalPlan::Scan {
                table,
                columns,
                filter,
            } => {
                let filter = filter.map(fold_expr);
                // a scan filter folded to TRUE is no filter at all
                let filter = match filter {
                    Some(Expr::Literal(Value::Bool(true))) => None,
                    other => other,
                };
                Ok(LogicalPlan::Scan {
                    table,
                    columns,
                    filter,
                })
            }
            other => map_children(other, &|child| self.fold(child)),
        }
    }
}

/// Recursively fold constant subexpressions.
pub fn fold_expr(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp { left, op, right } => {
            let left = fold_expr(*left);
            let right = fold_expr(*right);
            if let (Expr::Literal(l), Expr::Literal(r)) = (&left, &right) {
                if let Some(folded) = eval_const(l, op, r) {
                    return Expr::Literal(folded);
                }
            }
            Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            }
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(fold_expr(*expr)),
            list: list.into_iter().map(fold_expr).collect(),
            negated,
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => Expr::Like {
            expr: Box::new(fold_expr(*expr)),
            pattern: Box::new(fold_expr(*pattern)),
            negated,
        },
        Expr::IsNull(inner) => Expr::IsNull(Box::new(fold_expr(*inner))),
        Expr::IsNotNull(inner) => Expr::IsNotNull(Box::new(fold_expr(*inner))),
        Expr::ScalarFunc { func, args } => Expr::ScalarFunc {
            func,
            args: args.into_iter().map(fold_expr).collect(),
        },
        Expr::Function { name, args } => Expr::Function {
            name,
            args: args.into_iter().map(fold_expr).collect(),
        },
        leaf => leaf,
    }
}

fn eval_const(left: &Value, op: BinaryOperator, right: &Value) -> Option<Value> {
    use BinaryOperator::*;
    match op {
        Plus | Minus | Multiply | Divide | Modulo => {
            match (left, right) {
                (Value::Int64(a), Value::Int64(b)) => match op {
                    Plus => a.checked_add(*b).map(Value::Int64),
                    Minus => a.checked_sub(*b).map(Value::Int64),
                    Multiply => a.checked_mul(*b).map(Value::Int64),
                    Divide if *b != 0 => Some(Value::Int64(a / b)),
                    Modulo if *b != 0 => Some(Value::Int64(a % b)),
                    _ => None,
                },
                _ => {
                    let a = left.as_f64()?;
                    let b = right.as_f64()?;
                    match op {
                        Plus => Some(Value::Float64(a + b)),
                        Minus => Some(Value::Float64(a - b)),
                        Multiply => Some(Value::Float64(a * b)),
                        Divide if b != 0.0 => Some(Value::Float64(a / b)),
                        Modulo if b != 0.0 => Some(Value::Float64(a % b)),
                        _ => None,
                    }
                }
            }
        }
        Eq => Some(Value::Bool(left.loosely_equals(right))),
        NotEq => Some(Value::Bool(!left.loosely_equals(right))),
        Lt | LtEq | Gt | GtEq => {
            if left.is_null() || right.is_null() {
                return Some(Value::Bool(false));
            }
            let ord = left.compare(right);
            Some(Value::Bool(match op {
                Lt => ord == std::cmp::Ordering::Less,
                LtEq => ord != std::cmp::Ordering::Greater,
                Gt => ord == std::cmp::Ordering::Greater,
                GtEq => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            }))
        }
        And | Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op {
                And => *a && *b,
                _ => *a || *b,
            })),
            _ => None,
        },
    }
}
