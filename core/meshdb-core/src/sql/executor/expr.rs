//! Row-at-a-time expression interpreter.

use crate::error::{MeshError, MeshResult};
use crate::sql::planner::{BinaryOperator, Expr, ScalarFunction};
use crate::types::{Row, Value, like_match};
use std::cmp::Ordering;

/// Evaluate an expression against one row.
pub fn evaluate(expr: &Expr, row: &Row) -> MeshResult<Value> {
    match expr {
        Expr::Column(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, row)?;
            let r = evaluate(right, row)?;
            eval_binary(&l, *op, &r)
        }
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let value = evaluate(expr, row)?;
            let pattern = evaluate(pattern, row)?;
            match (&value, &pattern) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Bool(false)),
                (Value::Str(s), Value::Str(p)) => Ok(Value::Bool(like_match(s, p) != *negated)),
                _ => Ok(Value::Bool(false)),
            }
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let value = evaluate(expr, row)?;
            if value.is_null() {
                return Ok(Value::Bool(false));
            }
            let mut found = false;
            for item in list {
                if value.loosely_equals(&evaluate(item, row)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
        Expr::IsNull(inner) => Ok(Value::Bool(evaluate(inner, row)?.is_null())),
        Expr::IsNotNull(inner) => Ok(Value::Bool(!evaluate(inner, row)?.is_null())),
        Expr::ScalarFunc { func, args } => eval_scalar(*func, args, row),
        Expr::Function { name, .. } => Err(MeshError::SqlExecution {
            message: format!("aggregate '{name}' outside an aggregation context"),
            context: "expression interpreter".to_string(),
        }),
    }
}

/// SQL truthiness: only Bool(true) passes a predicate.
pub fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn eval_binary(left: &Value, op: BinaryOperator, right: &Value) -> MeshResult<Value> {
    use BinaryOperator::*;
    match op {
        Plus | Minus | Multiply | Divide | Modulo => eval_arithmetic(left, op, right),
        Eq => Ok(Value::Bool(
            !left.is_null() && !right.is_null() && left.loosely_equals(right),
        )),
        NotEq => Ok(Value::Bool(
            !left.is_null() && !right.is_null() && !left.loosely_equals(right),
        )),
        Lt | LtEq | Gt | GtEq => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Bool(false));
            }
            let ord = left.compare(right);
            Ok(Value::Bool(match op {
                Lt => ord == Ordering::Less,
                LtEq => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                GtEq => ord != Ordering::Less,
                _ => unreachable!(),
            }))
        }
        And => Ok(Value::Bool(truthy(left) && truthy(right))),
        Or => Ok(Value::Bool(truthy(left) || truthy(right))),
    }
}

fn eval_arithmetic(left: &Value, op: BinaryOperator, right: &Value) -> MeshResult<Value> {
    use BinaryOperator::*;
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    // integer arithmetic stays integral; any float operand widens
    if let (Value::Int64(a), Value::Int64(b)) = (left, right) {
        return match op {
            Plus => Ok(Value::Int64(a.wrapping_add(*b))),
            Minus => Ok(Value::Int64(a.wrapping_sub(*b))),
            Multiply => Ok(Value::Int64(a.wrapping_mul(*b))),
            Divide => {
                if *b == 0 {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Int64(a / b))
                }
            }
            Modulo => {
                if *b == 0 {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Int64(a % b))
                }
            }
            _ => unreachable!(),
        };
    }
    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(MeshError::TypeMismatch {
                expected: "numeric operands".to_string(),
                actual: format!("{} {} {}", left.type_name(), op_symbol(op), right.type_name()),
            });
        }
    };
    match op {
        Plus => Ok(Value::Float64(a + b)),
        Minus => Ok(Value::Float64(a - b)),
        Multiply => Ok(Value::Float64(a * b)),
        Divide => {
            if b == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float64(a / b))
            }
        }
        Modulo => {
            if b == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float64(a % b))
            }
        }
        _ => unreachable!(),
    }
}

fn op_symbol(op: BinaryOperator) -> &'static str {
    use BinaryOperator::*;
    match op {
        Plus => "+",
        Minus => "-",
        Multiply => "*",
        Divide => "/",
        Modulo => "%",
        Eq => "=",
        NotEq => "!=",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
        And => "AND",
        Or => "OR",
    }
}

fn eval_scalar(func: ScalarFunction, args: &[Expr], row: &Row) -> MeshResult<Value> {
    let arg = |i: usize| -> MeshResult<Value> {
        args.get(i)
            .map(|e| evaluate(e, row))
            .transpose()?
            .ok_or_else(|| MeshError::InvalidArgument(format!("{func:?} missing argument {i}")))
    };
    match func {
        ScalarFunction::Upper => match arg(0)? {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            Value::Null => Ok(Value::Null),
            other => Ok(Value::Str(other.to_string().to_uppercase())),
        },
        ScalarFunction::Lower => match arg(0)? {
            Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
            Value::Null => Ok(Value::Null),
            other => Ok(Value::Str(other.to_string().to_lowercase())),
        },
        ScalarFunction::Length => match arg(0)? {
            Value::Str(s) => Ok(Value::Int64(s.chars().count() as i64)),
            Value::Null => Ok(Value::Null),
            other => Ok(Value::Int64(other.to_string().chars().count() as i64)),
        },
        ScalarFunction::Abs => match arg(0)? {
            Value::Int64(i) => Ok(Value::Int64(i.abs())),
            Value::Float64(f) => Ok(Value::Float64(f.abs())),
            Value::Null => Ok(Value::Null),
            other => Err(MeshError::TypeMismatch {
                expected: "numeric".to_string(),
                actual: other.type_name().to_string(),
            }),
        },
        ScalarFunction::Round => {
            let value = arg(0)?;
            let digits = match args.get(1) {
                Some(e) => evaluate(e, row)?.as_i64().unwrap_or(0),
                None => 0,
            };
            match value {
                Value::Int64(i) => Ok(Value::Int64(i)),
                Value::Float64(f) => {
                    let factor = 10f64.powi(digits as i32);
                    Ok(Value::Float64((f * factor).round() / factor))
                }
                Value::Null => Ok(Value::Null),
                other => Err(MeshError::TypeMismatch {
                    expected: "numeric".to_string(),
                    actual: other.type_name().to_string(),
                }),
            }
        }
    }
}
