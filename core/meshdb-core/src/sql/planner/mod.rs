//! SQL planner: AST lowering and physical plan construction.

mod logical;
mod physical;
mod types;

pub use logical::LogicalPlanner;
pub use physical::{PhysicalPlanner, expr_to_filter};
pub use types::{
    AggregateExpr, AggregateFunction, BinaryOperator, Expr, JoinType, LogicalPlan, ScalarFunction,
    SortExpr, expr_column_info,
};
