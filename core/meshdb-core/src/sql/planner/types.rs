//! Logical plan and expression types.
//!
//! The logical tree is what the rule optimizer rewrites; the physical
//! planner lowers it into the serialisable [`crate::sql::plan::Plan`] IR.

use crate::types::{ColumnInfo, Value};
use serde::{Deserialize, Serialize};

/// Logical plan — the pre-optimization shape of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Scan {
        table: String,
        /// Empty means all columns (pruned later)
        columns: Vec<String>,
        filter: Option<Expr>,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<LogicalPlan>,
        projections: Vec<(Expr, Option<String>)>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        on: Expr,
    },
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
    },
    Sort {
        input: Box<LogicalPlan>,
        order_by: Vec<SortExpr>,
    },
    Limit {
        input: Box<LogicalPlan>,
        count: usize,
        offset: usize,
    },
    Union {
        inputs: Vec<LogicalPlan>,
        distinct: bool,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        /// VALUES rows; empty when `source` drives the insert
        values: Vec<Vec<Expr>>,
        /// INSERT ... SELECT
        source: Option<Box<LogicalPlan>>,
        /// ON DUPLICATE KEY UPDATE assignments
        on_duplicate: Vec<(String, Expr)>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    CreateTable {
        info: crate::types::TableInfo,
        if_not_exists: bool,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    Truncate {
        table: String,
    },
}

impl LogicalPlan {
    /// Base tables referenced anywhere in the tree.
    pub fn tables(&self) -> Vec<String> {
        match self {
            LogicalPlan::Scan { table, .. } => vec![table.clone()],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => input.tables(),
            LogicalPlan::Join { left, right, .. } => {
                let mut v = left.tables();
                v.extend(right.tables());
                v
            }
            LogicalPlan::Union { inputs, .. } => {
                inputs.iter().flat_map(LogicalPlan::tables).collect()
            }
            LogicalPlan::Insert { table, source, .. } => {
                let mut v = vec![table.clone()];
                if let Some(source) = source {
                    v.extend(source.tables());
                }
                v
            }
            LogicalPlan::Update { table, .. }
            | LogicalPlan::Delete { table, .. }
            | LogicalPlan::DropTable { table, .. }
            | LogicalPlan::Truncate { table } => vec![table.clone()],
            LogicalPlan::CreateTable { info, .. } => vec![info.name.clone()],
        }
    }
}

/// Expression — columns, literals, operators, functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// Aggregate call kept by name until the aggregate node claims it
    Function { name: String, args: Vec<Expr> },
    ScalarFunc {
        func: ScalarFunction,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Columns referenced anywhere in the expression.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => out.push(name.clone()),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.collect_columns(out);
                pattern.collect_columns(out);
            }
            Expr::InList { expr, list, .. } => {
                expr.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => inner.collect_columns(out),
            Expr::Function { args, .. } | Expr::ScalarFunc { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Display name used when no alias is given.
    pub fn default_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::Function { name, .. } => name.to_lowercase(),
            Expr::ScalarFunc { func, .. } => format!("{func:?}").to_lowercase(),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    // arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // logic
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarFunction {
    Upper,
    Lower,
    Length,
    Abs,
    Round,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    pub expr: Expr,
    pub alias: Option<String>,
}

impl AggregateExpr {
    /// Output column name: the alias, else `fn(arg)` lowercased.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!(
                "{}({})",
                format!("{:?}", self.function).to_lowercase(),
                self.expr.default_name()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    AntiSemi,
}

impl JoinType {
    /// Parse the wire name; "HashJoin" is a synonym for Inner.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inner" | "hashjoin" => Some(JoinType::Inner),
            "left" | "left_outer" => Some(JoinType::Left),
            "right" | "right_outer" => Some(JoinType::Right),
            "full" | "full_outer" => Some(JoinType::Full),
            "cross" => Some(JoinType::Cross),
            "semi" => Some(JoinType::Semi),
            "anti" | "anti_semi" => Some(JoinType::AntiSemi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpr {
    pub expr: Expr,
    pub asc: bool,
}

/// Output column descriptor for an expression with unknown source type.
pub fn expr_column_info(expr: &Expr, alias: Option<&str>) -> ColumnInfo {
    let name = alias
        .map(str::to_string)
        .unwrap_or_else(|| expr.default_name());
    ColumnInfo::new(name, "TEXT")
}
