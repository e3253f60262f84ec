//! Physical operators.
//!
//! Batch-at-a-time pull tree: a parent calls `execute` on each child
//! once, receives the materialised result, and composes. Every operator
//! checks the cancellation context at least once per batch.

mod aggregate;
mod dml;
mod hash_join;
mod limit;
mod projection;
mod selection;
mod sort;
mod table_scan;
mod union;
mod vector_scan;

pub use aggregate::AggregateOperator;
pub use dml::{DeleteOperator, InsertOperator, UpdateOperator};
pub use hash_join::HashJoinOperator;
pub use limit::LimitOperator;
pub use projection::ProjectionOperator;
pub use selection::SelectionOperator;
pub use sort::SortOperator;
pub use table_scan::TableScanOperator;
pub use union::UnionOperator;
pub use vector_scan::VectorScanOperator;

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::types::{ColumnInfo, QueryResult};

/// The single operator contract.
pub trait PhysicalOperator: Send {
    fn schema(&self) -> &[ColumnInfo];

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult>;
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::types::Row;

    /// Fixed-row operator for operator unit tests.
    pub struct ValuesOperator {
        schema: Vec<ColumnInfo>,
        rows: Vec<Row>,
    }

    impl ValuesOperator {
        pub fn new(schema: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
            Self { schema, rows }
        }
    }

    impl PhysicalOperator for ValuesOperator {
        fn schema(&self) -> &[ColumnInfo] {
            &self.schema
        }

        fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
            ctx.check()?;
            Ok(QueryResult::new(self.schema.clone(), self.rows.clone()))
        }
    }
}
