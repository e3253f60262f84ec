//! Serialisable physical plan IR.
//!
//! Plans are value types: a directed tree with per-operator config
//! records and no back-references to executors. They are created per
//! statement, executed once, and discarded.

use crate::sql::planner::{AggregateExpr, Expr, JoinType, SortExpr};
use crate::types::{ColumnInfo, Filter, SortDirection, TableInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    TableScan,
    Selection,
    Projection,
    Limit,
    Sort,
    Aggregate,
    HashJoin,
    Union,
    Insert,
    Update,
    Delete,
    VectorScan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub table: String,
    #[serde(default)]
    pub select_columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub predicate: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub exprs: Vec<(Expr, Option<String>)>,
}

/// `limit <= 0` means unbounded; a negative offset clamps to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    pub items: Vec<SortExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub group_by: Vec<Expr>,
    pub aggregates: Vec<AggregateExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
    pub join_type: JoinType,
    /// Equi-join pairs `(left column, right column)`; order significant
    pub conditions: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionConfig {
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertConfig {
    pub table: String,
    pub columns: Vec<String>,
    /// VALUES rows; empty when a child plan feeds the insert
    pub values: Vec<Vec<Expr>>,
    /// ON DUPLICATE KEY UPDATE assignments
    #[serde(default)]
    pub on_duplicate: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteConfig {
    pub table: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorScanConfig {
    pub table: String,
    pub column: String,
    pub index_type: String,
    pub metric_type: String,
    pub query_vector: Vec<f32>,
    pub k: usize,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// Per-operator configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanConfig {
    TableScan(ScanConfig),
    Selection(SelectionConfig),
    Projection(ProjectionConfig),
    Limit(LimitConfig),
    Sort(SortConfig),
    Aggregate(AggregateConfig),
    HashJoin(JoinConfig),
    Union(UnionConfig),
    Insert(InsertConfig),
    Update(UpdateConfig),
    Delete(DeleteConfig),
    VectorScan(VectorScanConfig),
}

impl PlanConfig {
    pub fn plan_type(&self) -> PlanType {
        match self {
            PlanConfig::TableScan(_) => PlanType::TableScan,
            PlanConfig::Selection(_) => PlanType::Selection,
            PlanConfig::Projection(_) => PlanType::Projection,
            PlanConfig::Limit(_) => PlanType::Limit,
            PlanConfig::Sort(_) => PlanType::Sort,
            PlanConfig::Aggregate(_) => PlanType::Aggregate,
            PlanConfig::HashJoin(_) => PlanType::HashJoin,
            PlanConfig::Union(_) => PlanType::Union,
            PlanConfig::Insert(_) => PlanType::Insert,
            PlanConfig::Update(_) => PlanType::Update,
            PlanConfig::Delete(_) => PlanType::Delete,
            PlanConfig::VectorScan(_) => PlanType::VectorScan,
        }
    }
}

/// A physical plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: u32,
    pub plan_type: PlanType,
    pub output_schema: Vec<ColumnInfo>,
    pub children: Vec<Plan>,
    pub config: PlanConfig,
    pub estimated_cost: f64,
}

impl Plan {
    pub fn new(id: u32, config: PlanConfig, output_schema: Vec<ColumnInfo>, children: Vec<Plan>) -> Self {
        Self {
            id,
            plan_type: config.plan_type(),
            output_schema,
            children,
            config,
            estimated_cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = cost;
        self
    }

    /// Base tables touched by this plan.
    pub fn tables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_tables(&mut out);
        out
    }

    fn collect_tables(&self, out: &mut Vec<String>) {
        match &self.config {
            PlanConfig::TableScan(c) => out.push(c.table.clone()),
            PlanConfig::Insert(c) => out.push(c.table.clone()),
            PlanConfig::Update(c) => out.push(c.table.clone()),
            PlanConfig::Delete(c) => out.push(c.table.clone()),
            PlanConfig::VectorScan(c) => out.push(c.table.clone()),
            _ => {}
        }
        for child in &self.children {
            child.collect_tables(out);
        }
    }

    /// Total node count, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Plan::node_count).sum::<usize>()
    }
}

/// Helper building scan output schema from a table schema.
pub fn scan_output_schema(info: &TableInfo, select_columns: &[String]) -> Vec<ColumnInfo> {
    if select_columns.is_empty() {
        return info.columns.clone();
    }
    select_columns
        .iter()
        .map(|name| {
            info.column(name)
                .cloned()
                .unwrap_or_else(|| ColumnInfo::new(name.clone(), "TEXT"))
        })
        .collect()
}

/// The `_distance` column VectorScan appends to its source schema.
pub fn distance_column() -> ColumnInfo {
    ColumnInfo::new("_distance", "DOUBLE")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_plan(table: &str) -> Plan {
        Plan::new(
            1,
            PlanConfig::TableScan(ScanConfig {
                table: table.to_string(),
                ..ScanConfig::default()
            }),
            vec![ColumnInfo::new("id", "INT")],
            vec![],
        )
    }

    #[test]
    fn plan_type_follows_config() {
        let plan = scan_plan("users");
        assert_eq!(plan.plan_type, PlanType::TableScan);
        assert_eq!(plan.tables(), vec!["users"]);
    }

    #[test]
    fn serde_round_trip() {
        let join = Plan::new(
            3,
            PlanConfig::HashJoin(JoinConfig {
                join_type: JoinType::Left,
                conditions: vec![("id".to_string(), "user_id".to_string())],
            }),
            vec![],
            vec![scan_plan("users"), scan_plan("orders")],
        )
        .with_cost(42.5);
        let json = serde_json::to_string(&join).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, join);
        assert_eq!(back.estimated_cost, 42.5);
        assert_eq!(back.node_count(), 3);
    }
}
