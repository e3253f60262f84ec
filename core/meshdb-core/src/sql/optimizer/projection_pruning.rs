//! Rule 2: projection pruning.
//!
//! Narrows scans to the columns the query actually uses.

use crate::error::MeshResult;
use crate::sql::optimizer::map_children;
use crate::sql::planner::{Expr, LogicalPlan};

use super::OptimizationRule;

pub struct ProjectionPruningRule;

impl OptimizationRule for ProjectionPruningRule {
    fn name(&self) -> &str {
        "ProjectionPruning"
    }

    fn apply(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        self.prune(plan)
    }
}

impl ProjectionPruningRule {
    fn prune(&self, plan: LogicalPlan) -> MeshResult<LogicalPlan> {
        match plan {
            LogicalPlan::Project { input, projections } => {
                let optimized_input = self.prune(*input)?;
                match optimized_input {
                    LogicalPlan::Scan {
                        table,
                        columns: scan_cols,
                        filter,
                    } if !projections.is_empty() => {
                        let mut needed = needed_columns(&projections);
                        // the scan filter's columns must survive pruning
                        if let Some(f) = &filter {
                            for col in f.referenced_columns() {
                                if !needed.contains(&col) {
                                    needed.push(col);
                                }
                            }
                        }
                        let final_cols = if scan_cols.is_empty() {
                            needed
                        } else {
                            scan_cols.into_iter().filter(|c| needed.contains(c)).collect()
                        };
                        Ok(LogicalPlan::Project {
                            input: Box::new(LogicalPlan::Scan {
                                table,
                                columns: final_cols,
                                filter,
                            }),
                            projections,
                        })
                    }
                    other => Ok(LogicalPlan::Project {
                        input: Box::new(other),
                        projections,
                    }),
                }
            }
            other => map_children(other, &|child| self.prune(child)),
        }
    }
}

fn needed_columns(projections: &[(Expr, Option<String>)]) -> Vec<String> {
    let mut out = Vec::new();
    for (expr, _) in projections {
        for col in expr.referenced_columns() {
            if !out.contains(&col) {
                out.push(col);
            }
        }
    }
    out
}
