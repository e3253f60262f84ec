//! Limit — offset/limit window over the child's rows.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::LimitConfig;
use crate::types::{ColumnInfo, QueryResult};

/// `limit <= 0` means unbounded; a negative offset clamps to 0. `total`
/// keeps the child's pre-LIMIT cardinality.
pub struct LimitOperator {
    child: Box<dyn PhysicalOperator>,
    config: LimitConfig,
}

impl LimitOperator {
    pub fn new(child: Box<dyn PhysicalOperator>, config: LimitConfig) -> Self {
        Self { child, config }
    }
}

impl PhysicalOperator for LimitOperator {
    fn schema(&self) -> &[ColumnInfo] {
        self.child.schema()
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let mut result = self.child.execute(ctx)?;
        ctx.check()?;
        let offset = self.config.offset.max(0) as usize;
        let offset = offset.min(result.rows.len());
        result.rows.drain(..offset);
        if self.config.limit > 0 {
            result.rows.truncate(self.config.limit as usize);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::executor::operators::tests_support::ValuesOperator;
    use crate::types::{Value, row_from_pairs};

    fn numbered(n: i64) -> ValuesOperator {
        ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT")],
            (0..n)
                .map(|i| row_from_pairs([("x", Value::Int64(i))]))
                .collect(),
        )
    }

    #[test]
    fn window_applies() {
        let mut op = LimitOperator::new(
            Box::new(numbered(10)),
            LimitConfig {
                offset: 2,
                limit: 3,
            },
        );
        let result = op.execute(&QueryContext::new()).unwrap();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0].get("x"), Some(&Value::Int64(2)));
        // total keeps the pre-LIMIT count
        assert_eq!(result.total, 10);
    }

    #[test]
    fn non_positive_limit_is_unbounded() {
        let mut op = LimitOperator::new(
            Box::new(numbered(5)),
            LimitConfig {
                offset: 0,
                limit: 0,
            },
        );
        assert_eq!(op.execute(&QueryContext::new()).unwrap().rows.len(), 5);
        let mut op = LimitOperator::new(
            Box::new(numbered(5)),
            LimitConfig {
                offset: 0,
                limit: -7,
            },
        );
        assert_eq!(op.execute(&QueryContext::new()).unwrap().rows.len(), 5);
    }

    #[test]
    fn negative_offset_clamps_to_zero() {
        let mut op = LimitOperator::new(
            Box::new(numbered(3)),
            LimitConfig {
                offset: -4,
                limit: 2,
            },
        );
        let result = op.execute(&QueryContext::new()).unwrap();
        assert_eq!(result.rows[0].get("x"), Some(&Value::Int64(0)));
    }

    #[test]
    fn offset_past_end_yields_empty() {
        let mut op = LimitOperator::new(
            Box::new(numbered(3)),
            LimitConfig {
                offset: 10,
                limit: 2,
            },
        );
        assert!(op.execute(&QueryContext::new()).unwrap().rows.is_empty());
    }
}
