//! Union — child concatenation with optional dedup.
//!
//! UNION ALL preserves child output order; after DISTINCT dedup the
//! order is undefined and callers must not rely on it.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::operators::PhysicalOperator;
use crate::types::{ColumnInfo, QueryResult, Row, hash_key};
use ahash::AHashSet;

pub struct UnionOperator {
    children: Vec<Box<dyn PhysicalOperator>>,
    distinct: bool,
    schema: Vec<ColumnInfo>,
}

impl UnionOperator {
    pub fn new(
        children: Vec<Box<dyn PhysicalOperator>>,
        distinct: bool,
        schema: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            children,
            distinct,
            schema,
        }
    }
}

/// Hash of the whole row tuple, column names included.
fn row_fingerprint(row: &Row) -> String {
    let mut out = String::new();
    for (name, value) in row {
        out.push_str(name);
        out.push('=');
        out.push_str(&hash_key(value));
        out.push(';');
    }
    out
}

impl PhysicalOperator for UnionOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let mut rows = Vec::new();
        let mut columns = self.schema.clone();
        for child in &mut self.children {
            ctx.check()?;
            let result = child.execute(ctx)?;
            if columns.is_empty() {
                columns = result.columns;
            }
            rows.extend(result.rows);
        }

        if self.distinct {
            let mut seen: AHashSet<String> = AHashSet::with_capacity(rows.len());
            rows.retain(|row| seen.insert(row_fingerprint(row)));
        }

        Ok(QueryResult {
            columns,
            total: rows.len() as u64,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::executor::operators::tests_support::ValuesOperator;
    use crate::types::{Value, row_from_pairs};

    fn values(xs: &[i64]) -> Box<dyn PhysicalOperator> {
        Box::new(ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT")],
            xs.iter()
                .map(|i| row_from_pairs([("x", Value::Int64(*i))]))
                .collect(),
        ))
    }

    #[test]
    fn union_all_preserves_order() {
        let mut op = UnionOperator::new(vec![values(&[3, 1]), values(&[2])], false, vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        let xs: Vec<i64> = result
            .rows
            .iter()
            .map(|r| r.get("x").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(xs, vec![3, 1, 2]);
    }

    #[test]
    fn distinct_deduplicates() {
        let mut op = UnionOperator::new(vec![values(&[1, 2, 1]), values(&[2, 3])], true, vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        let mut xs: Vec<i64> = result
            .rows
            .iter()
            .map(|r| r.get("x").unwrap().as_i64().unwrap())
            .collect();
        xs.sort_unstable();
        assert_eq!(xs, vec![1, 2, 3]);
    }

    #[test]
    fn distinct_is_type_aware() {
        let a = Box::new(ValuesOperator::new(
            vec![ColumnInfo::new("x", "TEXT")],
            vec![row_from_pairs([("x", Value::from("1"))])],
        ));
        let b = Box::new(ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT")],
            vec![row_from_pairs([("x", Value::Int64(1))])],
        ));
        let mut op = UnionOperator::new(vec![a, b], true, vec![]);
        // string "1" and integer 1 are different tuples
        assert_eq!(op.execute(&QueryContext::new()).unwrap().rows.len(), 2);
    }
}
