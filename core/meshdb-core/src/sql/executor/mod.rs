//! Executor: builds a pull tree of physical operators from a plan and
//! runs it to a materialised `QueryResult`.

pub mod expr;
pub mod operators;

use crate::datasource::Service;
use crate::error::{MeshError, MeshResult};
use crate::runtime::QueryContext;
use crate::sql::plan::{Plan, PlanConfig};
use crate::types::QueryResult;
use crate::vector::IndexManager;
use operators::*;
use std::sync::Arc;

pub struct Executor {
    service: Service,
    vectors: Arc<IndexManager>,
}

impl Executor {
    pub fn new(service: Service, vectors: Arc<IndexManager>) -> Self {
        Self { service, vectors }
    }

    /// Execute a plan tree to completion.
    pub fn execute(&self, ctx: &QueryContext, plan: &Plan) -> MeshResult<QueryResult> {
        self.build(plan)?.execute(ctx)
    }

    /// Build the operator tree. Operators hold their children; the whole
    /// tree is dropped with the root.
    pub fn build(&self, plan: &Plan) -> MeshResult<Box<dyn PhysicalOperator>> {
        let mut children: Vec<Box<dyn PhysicalOperator>> = Vec::with_capacity(plan.children.len());
        for child in &plan.children {
            children.push(self.build(child)?);
        }
        fn take_child(
            children: &mut Vec<Box<dyn PhysicalOperator>>,
            what: &str,
            plan_id: u32,
        ) -> MeshResult<Box<dyn PhysicalOperator>> {
            if children.is_empty() {
                Err(MeshError::SqlExecution {
                    message: format!("{what} requires a child plan"),
                    context: format!("plan {plan_id}"),
                })
            } else {
                Ok(children.remove(0))
            }
        }

        Ok(match &plan.config {
            PlanConfig::TableScan(config) => Box::new(TableScanOperator::new(
                self.service.clone(),
                config.clone(),
                plan.output_schema.clone(),
            )),
            PlanConfig::Selection(config) => Box::new(SelectionOperator::new(
                take_child(&mut children, "Selection", plan.id)?,
                config.predicate.clone(),
            )),
            PlanConfig::Projection(config) => Box::new(ProjectionOperator::new(
                take_child(&mut children, "Projection", plan.id)?,
                config.exprs.clone(),
                plan.output_schema.clone(),
            )),
            PlanConfig::Limit(config) => {
                Box::new(LimitOperator::new(take_child(&mut children, "Limit", plan.id)?, *config))
            }
            PlanConfig::Sort(config) => {
                Box::new(SortOperator::new(take_child(&mut children, "Sort", plan.id)?, config.clone()))
            }
            PlanConfig::Aggregate(config) => Box::new(AggregateOperator::new(
                take_child(&mut children, "Aggregate", plan.id)?,
                config.clone(),
                plan.output_schema.clone(),
            )),
            PlanConfig::HashJoin(config) => {
                let left = take_child(&mut children, "HashJoin", plan.id)?;
                let right = take_child(&mut children, "HashJoin", plan.id)?;
                Box::new(HashJoinOperator::new(
                    left,
                    right,
                    config.clone(),
                    plan.output_schema.clone(),
                ))
            }
            PlanConfig::Union(config) => Box::new(UnionOperator::new(
                std::mem::take(&mut children),
                config.distinct,
                plan.output_schema.clone(),
            )),
            PlanConfig::Insert(config) => {
                let source = if plan.children.is_empty() {
                    None
                } else {
                    Some(take_child(&mut children, "Insert", plan.id)?)
                };
                Box::new(InsertOperator::new(
                    self.service.clone(),
                    config.clone(),
                    source,
                ))
            }
            PlanConfig::Update(config) => {
                Box::new(UpdateOperator::new(self.service.clone(), config.clone()))
            }
            PlanConfig::Delete(config) => {
                Box::new(DeleteOperator::new(self.service.clone(), config.clone()))
            }
            PlanConfig::VectorScan(config) => Box::new(VectorScanOperator::new(
                self.service.clone(),
                Arc::clone(&self.vectors),
                config.clone(),
                plan.output_schema.clone(),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{Manager, Router};
    use crate::sql::plan::{JoinConfig, ScanConfig};
    use crate::sql::planner::JoinType;
    use crate::types::{ColumnInfo, TableConfig, TableInfo, Value, row_from_pairs};

    fn executor() -> Executor {
        let manager = Arc::new(Manager::new());
        let router = Arc::new(Router::with_manager(manager));
        let service = Service::new(router);
        for (table, cols) in [
            (
                "users",
                vec![
                    ColumnInfo::primary("id", "INT"),
                    ColumnInfo::new("name", "TEXT"),
                ],
            ),
            (
                "orders",
                vec![
                    ColumnInfo::primary("oid", "INT"),
                    ColumnInfo::new("user_id", "INT"),
                ],
            ),
        ] {
            service
                .create_table(&TableInfo::new(table, cols), &TableConfig::default())
                .unwrap();
        }
        let ctx = QueryContext::new();
        let mut users = vec![
            row_from_pairs([("id", Value::Int64(1)), ("name", Value::from("Alice"))]),
            row_from_pairs([("id", Value::Int64(2)), ("name", Value::from("Bob"))]),
        ];
        service.insert(&ctx, "users", &mut users).unwrap();
        let mut orders = vec![row_from_pairs([("user_id", Value::Int64(1))])];
        service.insert(&ctx, "orders", &mut orders).unwrap();
        Executor::new(service, Arc::new(IndexManager::new()))
    }

    fn scan(id: u32, table: &str) -> Plan {
        Plan::new(
            id,
            PlanConfig::TableScan(ScanConfig {
                table: table.to_string(),
                ..ScanConfig::default()
            }),
            vec![],
            vec![],
        )
    }

    #[test]
    fn executes_scan_plan() {
        let executor = executor();
        let result = executor
            .execute(&QueryContext::new(), &scan(1, "users"))
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn executes_join_plan() {
        let executor = executor();
        let join = Plan::new(
            3,
            PlanConfig::HashJoin(JoinConfig {
                join_type: JoinType::Inner,
                conditions: vec![("id".to_string(), "user_id".to_string())],
            }),
            vec![],
            vec![scan(1, "users"), scan(2, "orders")],
        );
        let result = executor.execute(&QueryContext::new(), &join).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn missing_child_is_an_error() {
        let executor = executor();
        let bad = Plan::new(
            1,
            PlanConfig::Selection(crate::sql::plan::SelectionConfig {
                predicate: crate::sql::planner::Expr::literal(true),
            }),
            vec![],
            vec![],
        );
        assert!(executor.build(&bad).is_err());
    }
}
