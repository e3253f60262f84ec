//! Aggregate — hash grouping with SQL null semantics.
//!
//! Aggregates skip nulls except `count(*)`; with no group keys the
//! operator produces exactly one row, even over empty input.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::expr::evaluate;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::AggregateConfig;
use crate::sql::planner::{AggregateFunction, Expr};
use crate::types::{ColumnInfo, QueryResult, Row, Value};
use ahash::AHashMap;

pub struct AggregateOperator {
    child: Box<dyn PhysicalOperator>,
    config: AggregateConfig,
    schema: Vec<ColumnInfo>,
}

impl AggregateOperator {
    pub fn new(
        child: Box<dyn PhysicalOperator>,
        config: AggregateConfig,
        schema: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            child,
            config,
            schema,
        }
    }
}

/// Accumulator for one aggregate within one group.
#[derive(Debug, Clone)]
enum Accumulator {
    Count(u64),
    Sum { total: f64, integral: bool, seen: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    GroupConcat(Vec<String>),
}

impl Accumulator {
    fn new(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum => Accumulator::Sum {
                total: 0.0,
                integral: true,
                seen: false,
            },
            AggregateFunction::Avg => Accumulator::Avg {
                total: 0.0,
                count: 0,
            },
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
            AggregateFunction::GroupConcat => Accumulator::GroupConcat(Vec::new()),
        }
    }

    fn update(&mut self, value: &Value) {
        match self {
            Accumulator::Count(n) => {
                // COUNT skips nulls; COUNT(*) lowers to COUNT(1)
                if !value.is_null() {
                    *n += 1;
                }
            }
            Accumulator::Sum {
                total,
                integral,
                seen,
            } => {
                if let Some(v) = value.as_f64() {
                    *total += v;
                    *seen = true;
                    if !matches!(value, Value::Int64(_)) {
                        *integral = false;
                    }
                }
            }
            Accumulator::Avg { total, count } => {
                if let Some(v) = value.as_f64() {
                    *total += v;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .is_none_or(|c| value.compare(c) == std::cmp::Ordering::Less)
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Max(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .is_none_or(|c| value.compare(c) == std::cmp::Ordering::Greater)
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::GroupConcat(parts) => {
                if !value.is_null() {
                    parts.push(value.to_string());
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int64(n as i64),
            Accumulator::Sum {
                total,
                integral,
                seen,
            } => {
                if !seen {
                    Value::Null
                } else if integral {
                    Value::Int64(total as i64)
                } else {
                    Value::Float64(total)
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float64(total / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
            Accumulator::GroupConcat(parts) => {
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::Str(parts.join(","))
                }
            }
        }
    }
}

struct Group {
    key_values: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

impl PhysicalOperator for AggregateOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let child_result = self.child.execute(ctx)?;
        ctx.check()?;

        let mut groups: Vec<Group> = Vec::new();
        let mut index: AHashMap<String, usize> = AHashMap::new();

        for (i, row) in child_result.rows.iter().enumerate() {
            if i % 1024 == 1023 {
                ctx.check()?;
            }
            let key_values: Vec<Value> = self
                .config
                .group_by
                .iter()
                .map(|e| evaluate(e, row))
                .collect::<MeshResult<_>>()?;
            let key = {
                let refs: Vec<&Value> = key_values.iter().collect();
                crate::types::multi_hash_key(&refs)
            };
            let group_idx = match index.get(&key) {
                Some(idx) => *idx,
                None => {
                    groups.push(Group {
                        key_values: key_values.clone(),
                        accumulators: self
                            .config
                            .aggregates
                            .iter()
                            .map(|a| Accumulator::new(a.function))
                            .collect(),
                    });
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            for (acc, agg) in groups[group_idx]
                .accumulators
                .iter_mut()
                .zip(&self.config.aggregates)
            {
                let value = evaluate(&agg.expr, row)?;
                acc.update(&value);
            }
        }

        // no group keys: exactly one row, even for empty input
        if groups.is_empty() && self.config.group_by.is_empty() {
            groups.push(Group {
                key_values: vec![],
                accumulators: self
                    .config
                    .aggregates
                    .iter()
                    .map(|a| Accumulator::new(a.function))
                    .collect(),
            });
        }

        let group_names: Vec<String> = self
            .config
            .group_by
            .iter()
            .map(Expr::default_name)
            .collect();

        let mut rows = Vec::with_capacity(groups.len());
        for group in groups {
            let mut row = Row::new();
            for (name, value) in group_names.iter().zip(group.key_values) {
                row.insert(name.clone(), value);
            }
            for (agg, acc) in self.config.aggregates.iter().zip(group.accumulators) {
                row.insert(agg.output_name(), acc.finish());
            }
            rows.push(row);
        }

        Ok(QueryResult {
            columns: self.schema.clone(),
            total: rows.len() as u64,
            rows,
        })
    }
}
