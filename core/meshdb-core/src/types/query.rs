//! Query options and results exchanged with data sources.

use crate::types::{ColumnInfo, Filter, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Options a caller hands to `DataSource::query`. A source MAY honour any
/// subset; the caller checks the returned columns and re-applies what the
/// source ignored.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Empty means all columns
    pub select_columns: Vec<String>,
    /// Combined with AND
    pub filters: Vec<Filter>,
    pub offset: usize,
    /// None means unbounded
    pub limit: Option<usize>,
    pub order_by: Option<String>,
    pub order_direction: SortDirection,
}

impl QueryOptions {
    pub fn with_filters(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// All filters collapsed into a single AND node, if any.
    pub fn combined_filter(&self) -> Option<Filter> {
        match self.filters.len() {
            0 => None,
            1 => Some(self.filters[0].clone()),
            _ => Some(Filter::And(self.filters.clone())),
        }
    }
}

/// Materialised result set. `total` is the pre-LIMIT cardinality when the
/// source can supply it, else equals `rows.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    pub total: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let total = rows.len() as u64;
        Self {
            columns,
            rows,
            total,
        }
    }

    /// Result carrying only a rows-affected count (DML statements).
    pub fn affected(count: u64) -> Self {
        let columns = vec![ColumnInfo::new("rows_affected", "BIGINT")];
        let rows = vec![crate::types::row_from_pairs([(
            "rows_affected",
            crate::types::Value::Int64(count as i64),
        )])];
        Self {
            columns,
            rows,
            total: 1,
        }
    }

    /// Rows-affected count from a DML result, when present.
    pub fn affected_count(&self) -> Option<u64> {
        self.rows
            .first()
            .and_then(|r| r.get("rows_affected"))
            .and_then(|v| v.as_i64())
            .map(|i| i as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn combined_filter_shapes() {
        assert!(QueryOptions::default().combined_filter().is_none());
        let one = QueryOptions::with_filters(vec![Filter::eq("a", 1i64)]);
        assert!(matches!(
            one.combined_filter(),
            Some(Filter::Compare { .. })
        ));
        let two = QueryOptions::with_filters(vec![Filter::eq("a", 1i64), Filter::eq("b", 2i64)]);
        assert!(matches!(two.combined_filter(), Some(Filter::And(_))));
    }

    #[test]
    fn affected_round_trip() {
        let result = QueryResult::affected(3);
        assert_eq!(result.affected_count(), Some(3));
        assert_eq!(
            result.rows[0].get("rows_affected"),
            Some(&Value::Int64(3))
        );
    }
}
