//! Logical plan → physical Plan IR.
//!
//! Lowers the optimised logical tree into the serialisable plan,
//! converting pushdownable predicates into source filters, reordering
//! inner-join chains with the cost-based reorderer, and attaching cost
//! estimates to every node.

use crate::datasource::Service;
use crate::error::{MeshError, MeshResult};
use crate::sql::executor::operators::HashJoinOperator;
use crate::sql::optimizer::cost::{CardinalityEstimator, CostModel};
use crate::sql::optimizer::join_graph::JoinGraph;
use crate::sql::optimizer::join_reorder::JoinReorderer;
use crate::sql::plan::{
    AggregateConfig, DeleteConfig, InsertConfig, JoinConfig, LimitConfig, Plan, PlanConfig,
    ProjectionConfig, ScanConfig, SelectionConfig, SortConfig, UnionConfig, scan_output_schema,
};
use crate::sql::planner::{
    BinaryOperator, Expr, JoinType, LogicalPlan, expr_column_info,
};
use crate::types::{ColumnInfo, CompareOp, Filter, TableInfo, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Row-count guess for tables whose source offers no statistics.
const DEFAULT_TABLE_ROWS: f64 = 1000.0;

/// Convert a pushdownable predicate into a source [`Filter`]. Returns
/// `None` for expressions only the selection operator can evaluate.
pub fn expr_to_filter(expr: &Expr) -> Option<Filter> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Some(Filter::And(vec![
                expr_to_filter(left)?,
                expr_to_filter(right)?,
            ])),
            BinaryOperator::Or => Some(Filter::Or(vec![
                expr_to_filter(left)?,
                expr_to_filter(right)?,
            ])),
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => {
                let compare_op = |op: BinaryOperator| match op {
                    BinaryOperator::Eq => CompareOp::Eq,
                    BinaryOperator::NotEq => CompareOp::Ne,
                    BinaryOperator::Lt => CompareOp::Lt,
                    BinaryOperator::LtEq => CompareOp::Le,
                    BinaryOperator::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                let flipped = |op: CompareOp| match op {
                    CompareOp::Lt => CompareOp::Gt,
                    CompareOp::Le => CompareOp::Ge,
                    CompareOp::Gt => CompareOp::Lt,
                    CompareOp::Ge => CompareOp::Le,
                    other => other,
                };
                match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(field), Expr::Literal(value)) => Some(Filter::Compare {
                        field: field.clone(),
                        op: compare_op(*op),
                        value: value.clone(),
                    }),
                    (Expr::Literal(value), Expr::Column(field)) => Some(Filter::Compare {
                        field: field.clone(),
                        op: flipped(compare_op(*op)),
                        value: value.clone(),
                    }),
                    _ => None,
                }
            }
            _ => None,
        },
        Expr::Like {
            expr,
            pattern,
            negated: false,
        } => match (expr.as_ref(), pattern.as_ref()) {
            (Expr::Column(field), Expr::Literal(Value::Str(pattern))) => Some(Filter::Like {
                field: field.clone(),
                pattern: pattern.clone(),
            }),
            _ => None,
        },
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            let Expr::Column(field) = expr.as_ref() else {
                return None;
            };
            let values: Option<Vec<Value>> = list
                .iter()
                .map(|e| match e {
                    Expr::Literal(v) => Some(v.clone()),
                    _ => None,
                })
                .collect();
            Some(Filter::In {
                field: field.clone(),
                values: values?,
            })
        }
        Expr::IsNull(inner) => match inner.as_ref() {
            Expr::Column(field) => Some(Filter::IsNull {
                field: field.clone(),
                negated: false,
            }),
            _ => None,
        },
        Expr::IsNotNull(inner) => match inner.as_ref() {
            Expr::Column(field) => Some(Filter::IsNull {
                field: field.clone(),
                negated: true,
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Split a predicate's top-level AND conjuncts into source filters plus
/// a residual expression the selection operator keeps.
fn split_predicate(expr: &Expr) -> (Vec<Filter>, Option<Expr>) {
    let mut conjuncts = Vec::new();
    collect_conjuncts(expr, &mut conjuncts);
    let mut filters = Vec::new();
    let mut residual: Option<Expr> = None;
    for conjunct in conjuncts {
        match expr_to_filter(&conjunct) {
            Some(filter) => filters.push(filter),
            None => {
                residual = Some(match residual {
                    Some(existing) => Expr::BinaryOp {
                        left: Box::new(existing),
                        op: BinaryOperator::And,
                        right: Box::new(conjunct),
                    },
                    None => conjunct,
                });
            }
        }
    }
    (filters, residual)
}

fn collect_conjuncts(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

pub struct PhysicalPlanner {
    service: Service,
    cost: Arc<CostModel>,
    estimator: CardinalityEstimator,
    reorderer: Arc<JoinReorderer>,
    next_id: AtomicU32,
}

/// Lowered node plus its row estimate, threaded bottom-up for costing.
struct Lowered {
    plan: Plan,
    rows: f64,
}

impl PhysicalPlanner {
    pub fn new(service: Service, cost: Arc<CostModel>, reorderer: Arc<JoinReorderer>) -> Self {
        Self {
            service,
            cost,
            estimator: CardinalityEstimator::new(),
            reorderer,
            next_id: AtomicU32::new(0),
        }
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn table_info(&self, table: &str) -> Option<TableInfo> {
        self.service.table_info(table).ok()
    }

    /// Lower a logical tree into the plan IR. DDL never reaches this
    /// layer; the engine dispatches it directly.
    pub fn plan(&self, logical: &LogicalPlan) -> MeshResult<Plan> {
        Ok(self.lower(logical)?.plan)
    }

    fn lower(&self, logical: &LogicalPlan) -> MeshResult<Lowered> {
        match logical {
            LogicalPlan::Scan {
                table,
                columns,
                filter,
            } => self.lower_scan(table, columns, filter.as_ref()),
            LogicalPlan::Filter { input, predicate } => {
                let child = self.lower(input)?;
                Ok(self.wrap_selection(child, predicate.clone()))
            }
            LogicalPlan::Project { input, projections } => {
                let child = self.lower(input)?;
                // above an aggregate, aggregate calls in the projection
                // refer to the aggregate's output columns
                let projections: Vec<(Expr, Option<String>)> = match input.as_ref() {
                    LogicalPlan::Aggregate { aggregates, .. } => projections
                        .iter()
                        .map(|(e, a)| (resolve_aggregate_columns(e, aggregates), a.clone()))
                        .collect(),
                    _ => projections.clone(),
                };
                let projections = &projections;
                let schema = self.projection_schema(projections, child.plan.output_schema.as_slice());
                let rows = child.rows;
                let cost = child.plan.estimated_cost + rows * self.cost.factors().cpu;
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Projection(ProjectionConfig {
                        exprs: projections.clone(),
                    }),
                    schema,
                    vec![child.plan],
                )
                .with_cost(cost);
                Ok(Lowered { plan, rows })
            }
            LogicalPlan::Join { .. } => self.lower_join_region(logical),
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let child = self.lower(input)?;
                let mut schema: Vec<ColumnInfo> = group_by
                    .iter()
                    .map(|e| expr_column_info(e, None))
                    .collect();
                for agg in aggregates {
                    schema.push(ColumnInfo::new(agg.output_name(), "TEXT"));
                }
                let rows = if group_by.is_empty() {
                    1.0
                } else {
                    (child.rows * 0.1).max(1.0)
                };
                let cost = child.plan.estimated_cost
                    + self.cost.aggregate_cost(
                        child.rows,
                        group_by.len(),
                        aggregates.len(),
                        false,
                    );
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Aggregate(AggregateConfig {
                        group_by: group_by.clone(),
                        aggregates: aggregates.clone(),
                    }),
                    schema,
                    vec![child.plan],
                )
                .with_cost(cost);
                Ok(Lowered { plan, rows })
            }
            LogicalPlan::Sort { input, order_by } => {
                let child = self.lower(input)?;
                let rows = child.rows;
                let cost = child.plan.estimated_cost + self.cost.sort_cost(rows);
                let schema = child.plan.output_schema.clone();
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Sort(SortConfig {
                        items: order_by.clone(),
                    }),
                    schema,
                    vec![child.plan],
                )
                .with_cost(cost);
                Ok(Lowered { plan, rows })
            }
            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => {
                let child = self.lower(input)?;
                let rows = child.rows.min(*count as f64);
                let cost = child.plan.estimated_cost;
                let schema = child.plan.output_schema.clone();
                let limit = if *count == usize::MAX {
                    0 // unbounded
                } else {
                    *count as i64
                };
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Limit(LimitConfig {
                        offset: *offset as i64,
                        limit,
                    }),
                    schema,
                    vec![child.plan],
                )
                .with_cost(cost);
                Ok(Lowered { plan, rows })
            }
            LogicalPlan::Union { inputs, distinct } => {
                let mut children = Vec::with_capacity(inputs.len());
                let mut rows = 0.0;
                let mut cost = 0.0;
                for input in inputs {
                    let child = self.lower(input)?;
                    rows += child.rows;
                    cost += child.plan.estimated_cost;
                    children.push(child.plan);
                }
                let schema = children
                    .first()
                    .map(|c| c.output_schema.clone())
                    .unwrap_or_default();
                if *distinct {
                    cost += rows * self.cost.factors().cpu;
                }
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Union(UnionConfig {
                        distinct: *distinct,
                    }),
                    schema,
                    children,
                )
                .with_cost(cost);
                Ok(Lowered { plan, rows })
            }
            LogicalPlan::Insert {
                table,
                columns,
                values,
                source,
                on_duplicate,
            } => {
                let (children, rows) = match source {
                    Some(source) => {
                        let child = self.lower(source)?;
                        let rows = child.rows;
                        (vec![child.plan], rows)
                    }
                    None => (vec![], values.len() as f64),
                };
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Insert(InsertConfig {
                        table: table.clone(),
                        columns: columns.clone(),
                        values: values.clone(),
                        on_duplicate: on_duplicate.clone(),
                    }),
                    vec![ColumnInfo::new("rows_affected", "BIGINT")],
                    children,
                )
                .with_cost(rows * self.cost.factors().io);
                Ok(Lowered { plan, rows: 1.0 })
            }
            LogicalPlan::Update {
                table,
                assignments,
                filter,
            } => {
                let filters = self.mutation_filters(filter.as_ref())?;
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Update(crate::sql::plan::UpdateConfig {
                        table: table.clone(),
                        assignments: assignments.clone(),
                        filters,
                    }),
                    vec![ColumnInfo::new("rows_affected", "BIGINT")],
                    vec![],
                )
                .with_cost(DEFAULT_TABLE_ROWS * self.cost.factors().io);
                Ok(Lowered { plan, rows: 1.0 })
            }
            LogicalPlan::Delete { table, filter } => {
                let filters = self.mutation_filters(filter.as_ref())?;
                let plan = Plan::new(
                    self.next_id(),
                    PlanConfig::Delete(DeleteConfig {
                        table: table.clone(),
                        filters,
                    }),
                    vec![ColumnInfo::new("rows_affected", "BIGINT")],
                    vec![],
                )
                .with_cost(DEFAULT_TABLE_ROWS * self.cost.factors().io);
                Ok(Lowered { plan, rows: 1.0 })
            }
            LogicalPlan::CreateTable { .. }
            | LogicalPlan::DropTable { .. }
            | LogicalPlan::Truncate { .. } => Err(MeshError::SqlExecution {
                message: "DDL does not lower to a physical plan".to_string(),
                context: "engine dispatches DDL directly".to_string(),
            }),
        }
    }

    /// Mutation filters must be fully pushdownable; a residual means the
    /// statement used an expression the sources cannot evaluate.
    fn mutation_filters(&self, filter: Option<&Expr>) -> MeshResult<Vec<Filter>> {
        match filter {
            None => Ok(vec![]),
            Some(expr) => {
                let (filters, residual) = split_predicate(expr);
                match residual {
                    None => Ok(filters),
                    Some(residual) => Err(MeshError::SqlNotSupported {
                        feature: format!("mutation predicate {residual:?}"),
                        hint: "UPDATE/DELETE predicates must be simple column conditions"
                            .to_string(),
                    }),
                }
            }
        }
    }

    fn lower_scan(
        &self,
        table: &str,
        columns: &[String],
        filter: Option<&Expr>,
    ) -> MeshResult<Lowered> {
        let (filters, residual) = match filter {
            Some(expr) => split_predicate(expr),
            None => (vec![], None),
        };

        let info = self.table_info(table);
        let schema = match &info {
            Some(info) => scan_output_schema(info, columns),
            None => columns
                .iter()
                .map(|c| ColumnInfo::new(c.clone(), "TEXT"))
                .collect(),
        };

        let base_rows = DEFAULT_TABLE_ROWS;
        let mut rows = base_rows;
        for _ in &filters {
            rows = (rows * self.estimator.eq_selectivity.max(0.1)).max(1.0);
        }

        let plan = Plan::new(
            self.next_id(),
            PlanConfig::TableScan(ScanConfig {
                table: table.to_string(),
                select_columns: columns.to_vec(),
                filters,
                ..ScanConfig::default()
            }),
            schema,
            vec![],
        )
        .with_cost(self.cost.scan_cost(table, base_rows, false));

        let lowered = Lowered { plan, rows };
        Ok(match residual {
            Some(predicate) => self.wrap_selection(lowered, predicate),
            None => lowered,
        })
    }

    fn wrap_selection(&self, child: Lowered, predicate: Expr) -> Lowered {
        let rows = self.estimator.filtered_rows(child.rows, Some(&predicate));
        let cost = child.plan.estimated_cost + self.cost.filter_cost(child.rows, rows, 0);
        let schema = child.plan.output_schema.clone();
        let plan = Plan::new(
            self.next_id(),
            PlanConfig::Selection(SelectionConfig { predicate }),
            schema,
            vec![child.plan],
        )
        .with_cost(cost);
        Lowered { plan, rows }
    }

    fn projection_schema(
        &self,
        projections: &[(Expr, Option<String>)],
        child: &[ColumnInfo],
    ) -> Vec<ColumnInfo> {
        if projections.is_empty() {
            return child.to_vec();
        }
        projections
            .iter()
            .map(|(expr, alias)| {
                if let Expr::Column(name) = expr {
                    if let Some(col) = child.iter().find(|c| &c.name == name) {
                        let mut col = col.clone();
                        if let Some(alias) = alias {
                            col.name = alias.clone();
                        }
                        return col;
                    }
                }
                expr_column_info(expr, alias.as_deref())
            })
            .collect()
    }

    /// Lower a join subtree. Chains of inner equi-joins over base scans
    /// go through the cost-based reorderer; anything else lowers in the
    /// shape the query gave us.
    fn lower_join_region(&self, logical: &LogicalPlan) -> MeshResult<Lowered> {
        let lookup = |table: &str| -> Option<Vec<String>> {
            self.table_info(table)
                .map(|info| info.columns.iter().map(|c| c.name.clone()).collect())
        };
        if let Some(region) = flatten_inner_region(logical, &lookup) {
            if region.scans.len() >= 3 {
                return self.lower_reordered(region);
            }
        }
        let LogicalPlan::Join {
            left,
            right,
            join_type,
            on,
        } = logical
        else {
            return Err(MeshError::SqlExecution {
                message: "expected a join node".to_string(),
                context: format!("{logical:?}"),
            });
        };
        let left = self.lower(left)?;
        let right = self.lower(right)?;
        self.lower_single_join(left, right, *join_type, on)
    }

    fn lower_single_join(
        &self,
        left: Lowered,
        right: Lowered,
        join_type: JoinType,
        on: &Expr,
    ) -> MeshResult<Lowered> {
        let left_names: Vec<String> = left
            .plan
            .output_schema
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let right_names: Vec<String> = right
            .plan
            .output_schema
            .iter()
            .map(|c| c.name.clone())
            .collect();

        let (conditions, residual) = extract_join_conditions(on, &left_names, &right_names);

        let rows = self
            .estimator
            .join_rows(left.rows, right.rows, conditions.len());
        let cost = left.plan.estimated_cost
            + right.plan.estimated_cost
            + self
                .cost
                .join_cost(join_type, left.rows, right.rows, conditions.len());

        let schema = match join_type {
            JoinType::Semi | JoinType::AntiSemi => left.plan.output_schema.clone(),
            JoinType::Right => HashJoinOperator::merged_schema(
                &right.plan.output_schema,
                &left.plan.output_schema,
            ),
            _ => HashJoinOperator::merged_schema(
                &left.plan.output_schema,
                &right.plan.output_schema,
            ),
        };

        let plan = Plan::new(
            self.next_id(),
            PlanConfig::HashJoin(JoinConfig {
                join_type,
                conditions,
            }),
            schema,
            vec![left.plan, right.plan],
        )
        .with_cost(cost);

        let lowered = Lowered { plan, rows };
        Ok(match residual {
            Some(predicate) => self.wrap_selection(lowered, predicate),
            None => lowered,
        })
    }

    /// Reorder an inner-join chain and rebuild it left-deep.
    fn lower_reordered(&self, region: InnerRegion) -> MeshResult<Lowered> {
        let mut graph = JoinGraph::new();
        for scan in &region.scans {
            graph.add_node(scan.table.clone(), DEFAULT_TABLE_ROWS);
        }
        for condition in &region.conditions {
            // duplicate edges between the same pair are fine; they tighten
            // the estimate
            graph.add_edge(
                condition.left_table.clone(),
                condition.right_table.clone(),
                self.estimator.eq_selectivity,
            )?;
        }
        let order = self.reorderer.reorder(&graph, &self.cost)?;

        let mut remaining = region.scans;
        let position = |remaining: &Vec<ScanLeaf>, table: &str| {
            remaining.iter().position(|s| s.table == table)
        };

        let first = position(&remaining, &order.order[0]).ok_or_else(|| {
            MeshError::SqlExecution {
                message: "reordered table missing from region".to_string(),
                context: order.order[0].clone(),
            }
        })?;
        let first = remaining.remove(first);
        let mut joined_tables = vec![first.table.clone()];
        let mut current = self.lower_scan(&first.table, &first.columns, first.filter.as_ref())?;

        for table in &order.order[1..] {
            let idx = position(&remaining, table).ok_or_else(|| MeshError::SqlExecution {
                message: "reordered table missing from region".to_string(),
                context: table.clone(),
            })?;
            let leaf = remaining.remove(idx);
            let right = self.lower_scan(&leaf.table, &leaf.columns, leaf.filter.as_ref())?;

            let mut conditions = Vec::new();
            for condition in &region.conditions {
                if condition.right_table == leaf.table
                    && joined_tables.contains(&condition.left_table)
                {
                    conditions.push((condition.left_column.clone(), condition.right_column.clone()));
                } else if condition.left_table == leaf.table
                    && joined_tables.contains(&condition.right_table)
                {
                    conditions.push((condition.right_column.clone(), condition.left_column.clone()));
                }
            }

            let rows = self
                .estimator
                .join_rows(current.rows, right.rows, conditions.len());
            let cost = current.plan.estimated_cost
                + right.plan.estimated_cost
                + self
                    .cost
                    .join_cost(JoinType::Inner, current.rows, right.rows, conditions.len());
            let schema = HashJoinOperator::merged_schema(
                &current.plan.output_schema,
                &right.plan.output_schema,
            );
            let plan = Plan::new(
                self.next_id(),
                PlanConfig::HashJoin(JoinConfig {
                    join_type: JoinType::Inner,
                    conditions,
                }),
                schema,
                vec![current.plan, right.plan],
            )
            .with_cost(cost);
            current = Lowered { plan, rows };
            joined_tables.push(leaf.table);
        }

        Ok(current)
    }
}

/// One base-table leaf of an inner-join region.
struct ScanLeaf {
    table: String,
    columns: Vec<String>,
    filter: Option<Expr>,
}

/// One equi-join condition with both sides resolved to tables.
struct RegionCondition {
    left_table: String,
    left_column: String,
    right_table: String,
    right_column: String,
}

struct InnerRegion {
    scans: Vec<ScanLeaf>,
    conditions: Vec<RegionCondition>,
}

/// Flatten a chain of inner equi-joins over base scans. Returns `None`
/// when the subtree contains anything else (outer joins, derived
/// inputs, non-equi conditions), in which case the original shape is
/// kept. `lookup` resolves a table's full column list for scans that
/// carry no explicit projection.
fn flatten_inner_region(
    plan: &LogicalPlan,
    lookup: &dyn Fn(&str) -> Option<Vec<String>>,
) -> Option<InnerRegion> {
    let mut scans = Vec::new();
    let mut raw_conditions = Vec::new();
    collect_region(plan, &mut scans, &mut raw_conditions, lookup)?;

    // resolve each column to its table by name
    let mut conditions = Vec::with_capacity(raw_conditions.len());
    for (left_col, right_col) in raw_conditions {
        let left_scan = scans.iter().find(|s| s.owns_column(&left_col))?;
        let right_scan = scans.iter().find(|s| s.owns_column(&right_col))?;
        if left_scan.leaf.table == right_scan.leaf.table {
            return None;
        }
        conditions.push(RegionCondition {
            left_table: left_scan.leaf.table.clone(),
            left_column: left_col,
            right_table: right_scan.leaf.table.clone(),
            right_column: right_col,
        });
    }

    Some(InnerRegion {
        scans: scans.into_iter().map(|s| s.leaf).collect(),
        conditions,
    })
}

struct ResolvedScan {
    leaf: ScanLeaf,
    column_names: Vec<String>,
}

impl ResolvedScan {
    fn owns_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

fn collect_region(
    plan: &LogicalPlan,
    scans: &mut Vec<ResolvedScan>,
    conditions: &mut Vec<(String, String)>,
    lookup: &dyn Fn(&str) -> Option<Vec<String>>,
) -> Option<()> {
    match plan {
        LogicalPlan::Join {
            left,
            right,
            join_type: JoinType::Inner,
            on,
        } => {
            collect_region(left, scans, conditions, lookup)?;
            collect_region(right, scans, conditions, lookup)?;
            collect_equi_conjuncts(on, conditions)
        }
        LogicalPlan::Scan {
            table,
            columns,
            filter,
        } => {
            // column ownership comes from the explicit projection when
            // present, else from the catalog; filters add theirs
            let mut column_names = if columns.is_empty() {
                lookup(table).unwrap_or_default()
            } else {
                columns.clone()
            };
            if let Some(filter) = filter {
                for col in filter.referenced_columns() {
                    if !column_names.contains(&col) {
                        column_names.push(col);
                    }
                }
            }
            scans.push(ResolvedScan {
                leaf: ScanLeaf {
                    table: table.clone(),
                    columns: columns.clone(),
                    filter: filter.clone(),
                },
                column_names,
            });
            Some(())
        }
        _ => None,
    }
}

/// Replace aggregate calls with references to the aggregate node's
/// output columns.
fn resolve_aggregate_columns(
    expr: &Expr,
    aggregates: &[crate::sql::planner::AggregateExpr],
) -> Expr {
    match expr {
        Expr::Function { name, args } => {
            use crate::sql::planner::AggregateFunction::*;
            let arg = args.first().cloned().unwrap_or_else(|| Expr::literal(1i64));
            let function = match name.to_uppercase().as_str() {
                "COUNT" => Some(Count),
                "SUM" => Some(Sum),
                "AVG" => Some(Avg),
                "MIN" => Some(Min),
                "MAX" => Some(Max),
                "GROUP_CONCAT" => Some(GroupConcat),
                _ => None,
            };
            let matched = aggregates
                .iter()
                .find(|agg| Some(agg.function) == function && agg.expr == arg);
            match matched {
                Some(agg) => Expr::Column(agg.output_name()),
                None => Expr::Column(name.to_lowercase()),
            }
        }
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(resolve_aggregate_columns(left, aggregates)),
            op: *op,
            right: Box::new(resolve_aggregate_columns(right, aggregates)),
        },
        Expr::ScalarFunc { func, args } => Expr::ScalarFunc {
            func: *func,
            args: args
                .iter()
                .map(|a| resolve_aggregate_columns(a, aggregates))
                .collect(),
        },
        other => other.clone(),
    }
}

/// Require every conjunct to be column = column.
fn collect_equi_conjuncts(on: &Expr, out: &mut Vec<(String, String)>) -> Option<()> {
    match on {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_equi_conjuncts(left, out)?;
            collect_equi_conjuncts(right, out)
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(l), Expr::Column(r)) => {
                out.push((l.clone(), r.clone()));
                Some(())
            }
            _ => None,
        },
        _ => None,
    }
}

/// Pull equi-join pairs out of an ON expression, resolving sides by the
/// child schemas. Conjuncts that are not `col = col` become a residual
/// predicate evaluated above the join.
fn extract_join_conditions(
    on: &Expr,
    left_names: &[String],
    right_names: &[String],
) -> (Vec<(String, String)>, Option<Expr>) {
    let mut conjuncts = Vec::new();
    collect_conjuncts(on, &mut conjuncts);

    let mut conditions = Vec::new();
    let mut residual: Option<Expr> = None;
    for conjunct in conjuncts {
        let pair = match &conjunct {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(a), Expr::Column(b)) => {
                    let a_left = left_names.iter().any(|n| n == a) || !right_names.iter().any(|n| n == a);
                    if a_left {
                        Some((a.clone(), b.clone()))
                    } else {
                        Some((b.clone(), a.clone()))
                    }
                }
                _ => None,
            },
            // ON TRUE (cross-style) contributes nothing
            Expr::Literal(Value::Bool(true)) => continue,
            _ => None,
        };
        match pair {
            Some(pair) => conditions.push(pair),
            None => {
                residual = Some(match residual {
                    Some(existing) => Expr::BinaryOp {
                        left: Box::new(existing),
                        op: BinaryOperator::And,
                        right: Box::new(conjunct),
                    },
                    None => conjunct,
                });
            }
        }
    }
    (conditions, residual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{Manager, Router};
    use crate::sql::SqlParser;
    use crate::sql::optimizer::QueryOptimizer;
    use crate::sql::optimizer::cost::HardwareProfile;
    use crate::sql::plan::PlanType;
    use crate::sql::planner::LogicalPlanner;
    use crate::types::{TableConfig, row_from_pairs};

    fn planner() -> PhysicalPlanner {
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
                    ColumnInfo::new("amount", "INT"),
                ],
            ),
            (
                "items",
                vec![
                    ColumnInfo::primary("iid", "INT"),
                    ColumnInfo::new("order_id", "INT"),
                ],
            ),
        ] {
            service
                .create_table(&TableInfo::new(table, cols), &TableConfig::default())
                .unwrap();
        }
        let ctx = crate::runtime::QueryContext::new();
        let mut rows = vec![row_from_pairs([("name", Value::from("seed"))])];
        service.insert(&ctx, "users", &mut rows).unwrap();
        PhysicalPlanner::new(
            service,
            Arc::new(CostModel::new(&HardwareProfile::baseline())),
            Arc::new(JoinReorderer::default()),
        )
    }

    fn physical(sql: &str) -> Plan {
        let statement = SqlParser::new().parse_one(sql).unwrap();
        let logical = LogicalPlanner::new().plan(&statement).unwrap();
        let optimized = QueryOptimizer::new().optimize(logical).unwrap();
        planner().plan(&optimized).unwrap()
    }

    #[test]
    fn filter_converts_to_source_filters() {
        let plan = physical("SELECT id FROM users WHERE id = 1 AND name LIKE 'a%'");
        fn find_scan(plan: &Plan) -> Option<&ScanConfig> {
            if let PlanConfig::TableScan(c) = &plan.config {
                return Some(c);
            }
            plan.children.iter().find_map(find_scan)
        }
        let scan = find_scan(&plan).unwrap();
        assert_eq!(scan.filters.len(), 2);
    }

    #[test]
    fn scalar_predicate_stays_in_selection() {
        let plan = physical("SELECT id FROM users WHERE LENGTH(name) = 3");
        fn has_selection(plan: &Plan) -> bool {
            plan.plan_type == PlanType::Selection || plan.children.iter().any(has_selection)
        }
        assert!(has_selection(&plan));
    }

    #[test]
    fn join_conditions_resolved_by_schema() {
        let plan = physical("SELECT * FROM users JOIN orders ON users.id = orders.user_id");
        fn find_join(plan: &Plan) -> Option<&JoinConfig> {
            if let PlanConfig::HashJoin(c) = &plan.config {
                return Some(c);
            }
            plan.children.iter().find_map(find_join)
        }
        let join = find_join(&plan).unwrap();
        assert_eq!(
            join.conditions,
            vec![("id".to_string(), "user_id".to_string())]
        );
    }

    #[test]
    fn three_table_inner_chain_goes_through_the_reorderer() {
        let plan = physical(
            "SELECT name FROM users \
             JOIN orders ON users.id = orders.user_id \
             JOIN items ON orders.oid = items.order_id",
        );
        fn count(plan: &Plan, want: PlanType) -> usize {
            let here = usize::from(plan.plan_type == want);
            here + plan.children.iter().map(|c| count(c, want)).sum::<usize>()
        }
        // every base table is scanned exactly once and the joins stay
        // inner equi-joins regardless of the chosen order
        assert_eq!(count(&plan, PlanType::TableScan), 3);
        assert_eq!(count(&plan, PlanType::HashJoin), 2);
        fn joins_are_inner(plan: &Plan) -> bool {
            let ok = match &plan.config {
                PlanConfig::HashJoin(c) => c.join_type == JoinType::Inner,
                _ => true,
            };
            ok && plan.children.iter().all(joins_are_inner)
        }
        assert!(joins_are_inner(&plan));
    }

    #[test]
    fn costs_are_attached() {
        let plan = physical("SELECT * FROM users WHERE id = 1");
        assert!(plan.estimated_cost > 0.0);
    }

    #[test]
    fn ddl_is_rejected_here() {
        let statement = SqlParser::new().parse_one("DROP TABLE users").unwrap();
        let logical = LogicalPlanner::new().plan(&statement).unwrap();
        assert!(planner().plan(&logical).is_err());
    }

    #[test]
    fn expr_filter_conversion_flips_reversed_comparisons() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::literal(5i64)),
            op: BinaryOperator::Lt,
            right: Box::new(Expr::column("x")),
        };
        let filter = expr_to_filter(&expr).unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: "x".to_string(),
                op: CompareOp::Gt,
                value: Value::Int64(5),
            }
        );
    }

    #[test]
    fn update_with_residual_predicate_is_rejected() {
        let statement = SqlParser::new()
            .parse_one("UPDATE users SET name = 'x' WHERE LENGTH(name) = 2")
            .unwrap();
        let logical = LogicalPlanner::new().plan(&statement).unwrap();
        assert!(matches!(
            planner().plan(&logical),
            Err(MeshError::SqlNotSupported { .. })
        ));
    }
}
