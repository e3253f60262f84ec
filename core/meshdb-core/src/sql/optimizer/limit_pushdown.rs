//! Rule 4: limit pushdown.
//!
//! LIMIT moves below order-preserving nodes and merges with nested
//! limits so sources can stop early.

use crate::error::MeshResult;
use crate::sql::optimizer::map_children;
use crate::sql::planner::LogicalPlan;

use super::OptimizationRule;

pub struct LimitPushdownRule;

impl OptimizationRule for LimitPushdownRule {
    fn name(&self) -> &str {
        "LimitPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        self.push_down(plan)
    }
}

impl LimitPushdownRule {
    fn push_down(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        match plan {
            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => {
                let optimized_input = self.push_down(*input)?;
                match optimized_input {
                    // projection does not change row count; swap
                    LogicalPlan::Project {
                        input: project_input,
                        projections,
                    } if offset == 0 => {
                        let pushed = self.push_down(LogicalPlan::Limit {
                            input: project_input,
                            count,
                            offset: 0,
                        })?;
                        Ok(LogicalPlan::Project {
                            input: Box::new(pushed),
                            projections,
                        })
                    }
                    // nested limits merge: the outer window applies to
                    // the rows the inner one lets through
                    LogicalPlan::Limit {
                        input: inner_input,
                        count: inner_count,
                        offset: inner_offset,
                    } => {
                        let remaining = inner_count.saturating_sub(offset);
                        Ok(LogicalPlan::Limit {
                            input: inner_input,
                            count: count.min(remaining),
                            offset: inner_offset + offset,
                        })
                    }
                    other => Ok(LogicalPlan::Limit {
                        input: Box::new(other),
                        count,
                        offset,
                    }),
                }
            }
            other => map_children(other, &|child| self.push_down(child)),
        }
    }
}
