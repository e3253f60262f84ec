//! Rule-based logical optimization plus the cost-based join phase.
//!
//! Four rewrite rules run in order: PredicatePushdown, ProjectionPruning,
//! ConstantFolding, LimitPushdown. Join reordering is a separate
//! cost-based pass driven by [`cost::CostModel`].

mod constant_folding;
pub mod cost;
pub mod join_graph;
pub mod join_reorder;
mod limit_pushdown;
mod predicate_pushdown;
mod projection_pruning;

use crate::error::MeshResult;
use crate::sql::planner::LogicalPlan;

pub use constant_folding::ConstantFoldingRule;
pub use limit_pushdown::LimitPushdownRule;
pub use predicate_pushdown::PredicatePushdownRule;
pub use projection_pruning::ProjectionPruningRule;

/// One rewrite over the logical tree.
pub trait OptimizationRule: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan>;
}

/// The rule pipeline.
pub struct QueryOptimizer {
    rules: Vec<Box<dyn OptimizationRule>>,
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryOptimizer {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(PredicatePushdownRule),
                Box::new(ProjectionPruningRule),
                Box::new(ConstantFoldingRule),
                Box::new(LimitPushdownRule),
            ],
        }
    }

    pub fn optimize(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        let mut optimized = plan;
        for rule in &self.rules {
            optimized = rule.apply(optimized)?;
        }
        Ok(optimized)
    }
}

/// Recurse a rewrite into every child of structural nodes, leaving the
/// node itself untouched. Shared by rules that only act on specific node
/// shapes.
pub(crate) fn map_children<F>(plan: LogicalPlan, f: &F) -> MeshResult<LogicalPlan>
where
    F: Fn(LogicalPlan) -> MeshResult<LogicalPlan>,
{
    Ok(match plan {
        LogicalPlan::Filter { input, predicate } => LogicalPlan::Filter {
            input: Box::new(f(*input)?),
            predicate,
        },
        LogicalPlan::Project { input, projections } => LogicalPlan::Project {
            input: Box::new(f(*input)?),
            projections,
        },
        LogicalPlan::Join {
            left,
            right,
            join_type,
            on,
        } => LogicalPlan::Join {
            left: Box::new(f(*left)?),
            right: Box::new(f(*right)?),
            join_type,
            on,
        },
        LogicalPlan::Aggregate {
            input,
            group_by,
            aggregates,
        } => LogicalPlan::Aggregate {
            input: Box::new(f(*input)?),
            group_by,
            aggregates,
        },
        LogicalPlan::Sort { input, order_by } => LogicalPlan::Sort {
            input: Box::new(f(*input)?),
            order_by,
        },
        LogicalPlan::Limit {
            input,
            count,
            offset,
        } => LogicalPlan::Limit {
            input: Box::new(f(*input)?),
            count,
            offset,
        },
        LogicalPlan::Union { inputs, distinct } => LogicalPlan::Union {
            inputs: inputs.into_iter().map(f).collect::<MeshResult<_>>()?,
            distinct,
        },
        LogicalPlan::Insert {
            table,
            columns,
            values,
            source,
            on_duplicate,
        } => LogicalPlan::Insert {
            table,
            columns,
            values,
            source: match source {
                Some(source) => Some(Box::new(f(*source)?)),
                None => None,
            },
            on_duplicate,
        },
        leaf => leaf,
    })
}
