//! HashJoin — build from the left child, probe from the right.
//!
//! Supports Inner, Left/Right/Full Outer, Cross, Semi and Anti-Semi
//! joins. Join keys are type-aware (`hash_key`): the string "1", the
//! integer 1 and the float 1.0 never collide, while integer widths
//! agree. When merged columns collide, the left side keeps its name and
//! the conflicting right column is renamed with a `right_` prefix; the
//! merged schema applies the same renaming to the right descriptors.

use crate::error::MeshResult;
use crate::runtime::QueryContext;
use crate::sql::executor::operators::PhysicalOperator;
use crate::sql::plan::JoinConfig;
use crate::sql::planner::JoinType;
use crate::types::{ColumnInfo, QueryResult, Row, Value, hash_key};
use ahash::AHashMap;
use smallvec::SmallVec;
use std::collections::BTreeSet;

const RIGHT_PREFIX: &str = "right_";

pub struct HashJoinOperator {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    config: JoinConfig,
    schema: Vec<ColumnInfo>,
}

impl HashJoinOperator {
    pub fn new(
        left: Box<dyn PhysicalOperator>,
        right: Box<dyn PhysicalOperator>,
        config: JoinConfig,
        schema: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            left,
            right,
            config,
            schema,
        }
    }

    /// Merged schema for `left ++ right` with conflict renaming.
    pub fn merged_schema(left: &[ColumnInfo], right: &[ColumnInfo]) -> Vec<ColumnInfo> {
        let left_names: BTreeSet<&str> = left.iter().map(|c| c.name.as_str()).collect();
        let mut out = left.to_vec();
        for col in right {
            let mut col = col.clone();
            if left_names.contains(col.name.as_str()) {
                col.name = format!("{RIGHT_PREFIX}{}", col.name);
            }
            out.push(col);
        }
        out
    }
}

/// Join key for one row over the given columns. Multi-column keys join
/// per-column keys with `|`; column order is significant.
fn join_key(row: &Row, columns: &[&str]) -> String {
    let parts: SmallVec<[String; 4]> = columns
        .iter()
        .map(|col| hash_key(row.get(*col).unwrap_or(&Value::Null)))
        .collect();
    parts.join("|")
}

/// Merge two rows: left keeps its names, conflicting right columns get
/// the `right_` prefix. `left_names` is the conflict domain — usually the
/// left row's own keys, but outer joins pass a wider layout.
fn merge_rows(left: &Row, right: &Row, left_names: &BTreeSet<String>) -> Row {
    let mut merged = left.clone();
    for (name, value) in right {
        if left_names.contains(name) {
            merged.insert(format!("{RIGHT_PREFIX}{name}"), value.clone());
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// A null row spanning `columns`.
fn null_row(columns: &[ColumnInfo]) -> Row {
    columns
        .iter()
        .map(|c| (c.name.clone(), Value::Null))
        .collect()
}

struct JoinSides {
    build_rows: Vec<Row>,
    probe_rows: Vec<Row>,
    build_cols: Vec<String>,
    probe_cols: Vec<String>,
}

impl PhysicalOperator for HashJoinOperator {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    fn execute(&mut self, ctx: &QueryContext) -> MeshResult<QueryResult> {
        let left_result = self.left.execute(ctx)?;
        let right_result = self.right.execute(ctx)?;
        ctx.check()?;

        let left_schema = left_result.columns.clone();
        let right_schema = right_result.columns.clone();

        // Right outer mirrors Left outer by swapping sides (including the
        // key columns), so only one outer implementation exists.
        let (join_type, sides, build_schema, probe_schema) = match self.config.join_type {
            JoinType::Right => (
                JoinType::Left,
                JoinSides {
                    build_rows: right_result.rows,
                    probe_rows: left_result.rows,
                    build_cols: self.config.conditions.iter().map(|(_, r)| r.clone()).collect(),
                    probe_cols: self.config.conditions.iter().map(|(l, _)| l.clone()).collect(),
                },
                right_schema,
                left_schema,
            ),
            _ => (
                self.config.join_type,
                JoinSides {
                    build_rows: left_result.rows,
                    probe_rows: right_result.rows,
                    build_cols: self.config.conditions.iter().map(|(l, _)| l.clone()).collect(),
                    probe_cols: self.config.conditions.iter().map(|(_, r)| r.clone()).collect(),
                },
                left_schema,
                right_schema,
            ),
        };

        let rows = join(ctx, join_type, sides, &build_schema, &probe_schema)?;
        let columns = match self.config.join_type {
            JoinType::Semi | JoinType::AntiSemi => build_schema,
            JoinType::Right => Self::merged_schema(&build_schema, &probe_schema),
            JoinType::Full => {
                // unmatched right rows surface under the renamed layout;
                // their descriptors join the schema as well
                let mut columns = Self::merged_schema(&build_schema, &probe_schema);
                let existing: BTreeSet<String> =
                    columns.iter().map(|c| c.name.clone()).collect();
                for col in &probe_schema {
                    let renamed = format!("{RIGHT_PREFIX}{}", col.name);
                    if !existing.contains(&renamed) {
                        let mut col = col.clone();
                        col.name = renamed;
                        columns.push(col);
                    }
                }
                columns
            }
            _ => Self::merged_schema(&build_schema, &probe_schema),
        };

        Ok(QueryResult {
            columns,
            total: rows.len() as u64,
            rows,
        })
    }
}

fn join(
    ctx: &QueryContext,
    join_type: JoinType,
    sides: JoinSides,
    build_schema: &[ColumnInfo],
    probe_schema: &[ColumnInfo],
) -> MeshResult<Vec<Row>> {
    let JoinSides {
        build_rows,
        probe_rows,
        build_cols,
        probe_cols,
    } = sides;

    let build_names: BTreeSet<String> = build_schema.iter().map(|c| c.name.clone()).collect();

    // Cross ignores keys entirely: plain Cartesian product
    if join_type == JoinType::Cross {
        let mut out = Vec::with_capacity(build_rows.len() * probe_rows.len());
        for (i, build_row) in build_rows.iter().enumerate() {
            if i % 256 == 255 {
                ctx.check()?;
            }
            for probe_row in &probe_rows {
                out.push(merge_rows(build_row, probe_row, &build_names));
            }
        }
        return Ok(out);
    }

    let build_col_refs: Vec<&str> = build_cols.iter().map(String::as_str).collect();
    let probe_col_refs: Vec<&str> = probe_cols.iter().map(String::as_str).collect();

    // build phase: key → build row indices
    let mut table: AHashMap<String, Vec<usize>> = AHashMap::with_capacity(build_rows.len());
    for (i, row) in build_rows.iter().enumerate() {
        if i % 1024 == 1023 {
            ctx.check()?;
        }
        table.entry(join_key(row, &build_col_refs)).or_default().push(i);
    }

    match join_type {
        JoinType::Semi | JoinType::AntiSemi => {
            // collect the set of matched build rows, emit build-side only
            let mut matched = vec![false; build_rows.len()];
            for (i, probe_row) in probe_rows.iter().enumerate() {
                if i % 1024 == 1023 {
                    ctx.check()?;
                }
                if let Some(indices) = table.get(&join_key(probe_row, &probe_col_refs)) {
                    for &idx in indices {
                        matched[idx] = true;
                    }
                }
            }
            let want_matched = join_type == JoinType::Semi;
            Ok(build_rows
                .into_iter()
                .zip(matched)
                .filter(|(_, m)| *m == want_matched)
                .map(|(row, _)| row)
                .collect())
        }
        _ => {
            let mut out = Vec::new();
            let mut matched = vec![false; build_rows.len()];
            for (i, probe_row) in probe_rows.iter().enumerate() {
                if i % 1024 == 1023 {
                    ctx.check()?;
                }
                if let Some(indices) = table.get(&join_key(probe_row, &probe_col_refs)) {
                    for &idx in indices {
                        matched[idx] = true;
                        out.push(merge_rows(&build_rows[idx], probe_row, &build_names));
                    }
                }
            }

            if matches!(join_type, JoinType::Left | JoinType::Full) {
                // unmatched build rows with probe columns null, under the
                // standard renamed layout
                let probe_nulls = null_row(probe_schema);
                for (row, was_matched) in build_rows.iter().zip(&matched) {
                    if !was_matched {
                        out.push(merge_rows(row, &probe_nulls, &build_names));
                    }
                }
            }

            if join_type == JoinType::Full {
                // unmatched probe rows merge against a null row spanning
                // the full merged layout, so every probe column conflicts
                // and lands under its `right_` name
                let merged_layout = HashJoinOperator::merged_schema(build_schema, probe_schema);
                let layout_names: BTreeSet<String> =
                    merged_layout.iter().map(|c| c.name.clone()).collect();
                let base = null_row(&merged_layout);
                let mut probe_matched = vec![false; probe_rows.len()];
                for (i, probe_row) in probe_rows.iter().enumerate() {
                    if table.contains_key(&join_key(probe_row, &probe_col_refs)) {
                        probe_matched[i] = true;
                    }
                }
                for (probe_row, was_matched) in probe_rows.iter().zip(probe_matched) {
                    if !was_matched {
                        out.push(merge_rows(&base, probe_row, &layout_names));
                    }
                }
            }

            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::executor::operators::tests_support::ValuesOperator;
    use crate::types::row_from_pairs;

    fn users() -> ValuesOperator {
        ValuesOperator::new(
            vec![
                ColumnInfo::primary("id", "INT"),
                ColumnInfo::new("name", "TEXT"),
            ],
            vec![
                row_from_pairs([("id", Value::Int64(1)), ("name", Value::from("Alice"))]),
                row_from_pairs([("id", Value::Int64(2)), ("name", Value::from("Bob"))]),
                row_from_pairs([("id", Value::Int64(3)), ("name", Value::from("Charlie"))]),
            ],
        )
    }

    fn orders() -> ValuesOperator {
        ValuesOperator::new(
            vec![
                ColumnInfo::new("user_id", "INT"),
                ColumnInfo::new("amount", "INT"),
            ],
            vec![
                row_from_pairs([("user_id", Value::Int64(1)), ("amount", Value::Int64(100))]),
                row_from_pairs([("user_id", Value::Int64(1)), ("amount", Value::Int64(200))]),
                row_from_pairs([("user_id", Value::Int64(3)), ("amount", Value::Int64(300))]),
                row_from_pairs([("user_id", Value::Int64(4)), ("amount", Value::Int64(400))]),
            ],
        )
    }

    fn run(join_type: JoinType) -> QueryResult {
        let config = JoinConfig {
            join_type,
            conditions: vec![("id".to_string(), "user_id".to_string())],
        };
        let mut op = HashJoinOperator::new(Box::new(users()), Box::new(orders()), config, vec![]);
        op.execute(&QueryContext::new()).unwrap()
    }

    fn amounts(result: &QueryResult) -> Vec<i64> {
        let mut out: Vec<i64> = result
            .rows
            .iter()
            .filter_map(|r| r.get("amount").and_then(Value::as_i64))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn inner_join_matches_scenario() {
        let result = run(JoinType::Inner);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(amounts(&result), vec![100, 200, 300]);
    }

    #[test]
    fn left_outer_keeps_bob_with_nulls() {
        let result = run(JoinType::Left);
        assert_eq!(result.rows.len(), 4);
        let bob = result
            .rows
            .iter()
            .find(|r| r.get("name") == Some(&Value::from("Bob")))
            .unwrap();
        assert_eq!(bob.get("user_id"), Some(&Value::Null));
        assert_eq!(bob.get("amount"), Some(&Value::Null));
    }

    #[test]
    fn full_outer_yields_five_rows_with_renamed_orphan() {
        let result = run(JoinType::Full);
        assert_eq!(result.rows.len(), 5);
        // the unmatched right row carries its values under the renamed
        // layout: user_id 4 appears as right_user_id
        let orphan = result
            .rows
            .iter()
            .find(|r| r.get("right_user_id") == Some(&Value::Int64(4)))
            .expect("right-unmatched row present");
        assert_eq!(orphan.get("id"), Some(&Value::Null));
        assert_eq!(orphan.get("name"), Some(&Value::Null));
        assert_eq!(orphan.get("right_amount"), Some(&Value::Int64(400)));
    }

    #[test]
    fn right_outer_mirrors_left() {
        let result = run(JoinType::Right);
        // 3 matched + order with user_id 4 unmatched
        assert_eq!(result.rows.len(), 4);
        let orphan = result
            .rows
            .iter()
            .find(|r| r.get("user_id") == Some(&Value::Int64(4)))
            .unwrap();
        assert_eq!(orphan.get("name"), Some(&Value::Null));
    }

    #[test]
    fn semi_join_left_schema_no_duplicates() {
        let result = run(JoinType::Semi);
        assert_eq!(result.rows.len(), 2);
        let mut names: Vec<&str> = result
            .rows
            .iter()
            .map(|r| r.get("name").unwrap().as_str().unwrap())
            .collect();
        names.sort_unstable();
        // Alice once despite two orders; left columns only
        assert_eq!(names, vec!["Alice", "Charlie"]);
        assert!(result.rows.iter().all(|r| !r.contains_key("amount")));
    }

    #[test]
    fn anti_semi_emits_unmatched_left() {
        let result = run(JoinType::AntiSemi);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn cross_join_is_cartesian() {
        let config = JoinConfig {
            join_type: JoinType::Cross,
            conditions: vec![],
        };
        let mut op = HashJoinOperator::new(Box::new(users()), Box::new(orders()), config, vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        assert_eq!(result.rows.len(), 12);
    }

    #[test]
    fn conflicting_columns_renamed_in_rows_and_schema() {
        let left = ValuesOperator::new(
            vec![ColumnInfo::new("id", "INT"), ColumnInfo::new("v", "INT")],
            vec![row_from_pairs([
                ("id", Value::Int64(1)),
                ("v", Value::Int64(10)),
            ])],
        );
        let right = ValuesOperator::new(
            vec![ColumnInfo::new("id", "INT"), ColumnInfo::new("v", "INT")],
            vec![row_from_pairs([
                ("id", Value::Int64(1)),
                ("v", Value::Int64(20)),
            ])],
        );
        let config = JoinConfig {
            join_type: JoinType::Inner,
            conditions: vec![("id".to_string(), "id".to_string())],
        };
        let mut op = HashJoinOperator::new(Box::new(left), Box::new(right), config, vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        let row = &result.rows[0];
        assert_eq!(row.get("v"), Some(&Value::Int64(10)));
        assert_eq!(row.get("right_v"), Some(&Value::Int64(20)));
        assert_eq!(row.get("right_id"), Some(&Value::Int64(1)));
        let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "v", "right_id", "right_v"]);
    }

    #[test]
    fn type_aware_keys_do_not_cross_match() {
        let left = ValuesOperator::new(
            vec![ColumnInfo::new("k", "TEXT")],
            vec![row_from_pairs([("k", Value::from("1"))])],
        );
        let right = ValuesOperator::new(
            vec![ColumnInfo::new("rk", "INT")],
            vec![row_from_pairs([("rk", Value::Int64(1))])],
        );
        let config = JoinConfig {
            join_type: JoinType::Inner,
            conditions: vec![("k".to_string(), "rk".to_string())],
        };
        let mut op = HashJoinOperator::new(Box::new(left), Box::new(right), config, vec![]);
        let result = op.execute(&QueryContext::new()).unwrap();
        // string "1" and integer 1 have distinct keys
        assert!(result.rows.is_empty());
    }

    #[test]
    fn multi_column_key_order_matters() {
        let left = ValuesOperator::new(
            vec![ColumnInfo::new("a", "INT"), ColumnInfo::new("b", "INT")],
            vec![row_from_pairs([
                ("a", Value::Int64(1)),
                ("b", Value::Int64(2)),
            ])],
        );
        let right = ValuesOperator::new(
            vec![ColumnInfo::new("x", "INT"), ColumnInfo::new("y", "INT")],
            vec![row_from_pairs([
                ("x", Value::Int64(2)),
                ("y", Value::Int64(1)),
            ])],
        );
        // (a,b) = (1,2) vs (x,y) = (2,1): matching (a=y, b=x) succeeds
        let config = JoinConfig {
            join_type: JoinType::Inner,
            conditions: vec![("a".to_string(), "y".to_string()), ("b".to_string(), "x".to_string())],
        };
        let mut op = HashJoinOperator::new(Box::new(left), Box::new(right), config, vec![]);
        assert_eq!(op.execute(&QueryContext::new()).unwrap().rows.len(), 1);
    }
}
