//! Composable filter trees.
//!
//! Filters are pushed down to a source whenever it advertises support;
//! otherwise the selection operator evaluates them row by row with the
//! same `matches` implementation, so pushdown never changes results.

use crate::types::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operators for filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A filter tree node: either a leaf condition on one field, or an
/// AND/OR group of sub-filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// LIKE with `%` and `_`, case-insensitive
    Like { field: String, pattern: String },
    In { field: String, values: Vec<Value> },
    IsNull { field: String, negated: bool },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull {
            field: field.into(),
            negated: false,
        }
    }

    /// Evaluate against a row. Missing fields behave as NULL.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Compare { field, op, value } => {
                let cell = row.get(field).unwrap_or(&Value::Null);
                // SQL three-valued logic collapses to false here: a NULL
                // operand never satisfies a comparison
                if cell.is_null() || value.is_null() {
                    return false;
                }
                let ord = cell.compare(value);
                match op {
                    CompareOp::Eq => cell.loosely_equals(value),
                    CompareOp::Ne => !cell.loosely_equals(value),
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                }
            }
            Filter::Like { field, pattern } => match row.get(field) {
                Some(Value::Str(s)) => like_match(s, pattern),
                _ => false,
            },
            Filter::In { field, values } => {
                let cell = row.get(field).unwrap_or(&Value::Null);
                if cell.is_null() {
                    return false;
                }
                values.iter().any(|v| cell.loosely_equals(v))
            }
            Filter::IsNull { field, negated } => {
                let is_null = row.get(field).is_none_or(Value::is_null);
                is_null != *negated
            }
            Filter::And(subs) => subs.iter().all(|f| f.matches(row)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(row)),
        }
    }

    /// Fields referenced anywhere in the tree (index selection input).
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { field, .. }
            | Filter::Like { field, .. }
            | Filter::In { field, .. }
            | Filter::IsNull { field, .. } => out.push(field),
            Filter::And(subs) | Filter::Or(subs) => {
                for f in subs {
                    f.collect_fields(out);
                }
            }
        }
    }
}

/// SQL LIKE matching: `%` any run, `_` one character, case-insensitive.
pub fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.to_lowercase().chars().collect();
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    like_rec(&s, &p)
}

fn like_rec(s: &[char], p: &[char]) -> bool {
    match p.first() {
        None => s.is_empty(),
        Some('%') => {
            // greedy collapse of consecutive %, then try every split
            let rest = &p[1..];
            if rest.is_empty() {
                return true;
            }
            (0..=s.len()).any(|i| like_rec(&s[i..], rest))
        }
        Some('_') => !s.is_empty() && like_rec(&s[1..], &p[1..]),
        Some(c) => s.first() == Some(c) && like_rec(&s[1..], &p[1..]),
    }
}
