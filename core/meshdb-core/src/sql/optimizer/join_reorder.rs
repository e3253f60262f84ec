//! Cost-based join reordering.
//!
//! Up to `max_tables` inputs the reorderer runs an exact
//! dynamic-programming enumeration over bitmask subsets; beyond that it
//! falls back to a greedy left-deep builder. Results are memoised in an
//! LRU cache keyed by the *unordered* set of table names — the key sorts
//! the names so every permutation of the same set hits the same entry.

use crate::error::{MeshError, MeshResult};
use crate::sql::optimizer::cost::CostModel;
use crate::sql::optimizer::join_graph::JoinGraph;
use crate::sql::planner::JoinType;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::debug;

const MEMO_CAPACITY: usize = 256;

/// A join order with its estimated cost.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOrder {
    pub order: Vec<String>,
    pub estimated_cost: f64,
    pub estimated_rows: f64,
}

pub struct JoinReorderer {
    max_tables: usize,
    memo: Mutex<LruCache<String, JoinOrder>>,
}

impl Default for JoinReorderer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl JoinReorderer {
    pub fn new(max_tables: usize) -> Self {
        Self {
            max_tables: max_tables.max(2),
            memo: Mutex::new(LruCache::new(
                NonZeroUsize::new(MEMO_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Memo key for an unordered set of tables: sorted names, joined.
    /// Sorting is what makes `{a,b,c}` and every permutation of it share
    /// one entry.
    pub fn cache_key(tables: &[String]) -> String {
        let mut sorted: Vec<&str> = tables.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.join(",")
    }

    pub fn reorder(&self, graph: &JoinGraph, cost: &CostModel) -> MeshResult<JoinOrder> {
        let tables = graph.nodes();
        if tables.is_empty() {
            return Err(MeshError::InvalidArgument(
                "join reorder needs at least one table".to_string(),
            ));
        }
        if tables.len() == 1 {
            let rows = graph.cardinality(&tables[0]).unwrap_or(1.0);
            return Ok(JoinOrder {
                estimated_cost: cost.scan_cost(&tables[0], rows, false),
                estimated_rows: rows,
                order: tables,
            });
        }

        let key = Self::cache_key(&tables);
        if let Some(hit) = self.memo.lock().get(&key) {
            return Ok(hit.clone());
        }

        let result = if tables.len() <= self.max_tables {
            self.dp_reorder(graph, cost, &tables)
        } else {
            debug!(
                tables = tables.len(),
                max = self.max_tables,
                "falling back to greedy join order"
            );
            self.greedy_reorder(graph, cost, &tables)
        }?;

        self.memo.lock().put(key, result.clone());
        Ok(result)
    }

    /// Bushy-tree enumeration is not implemented; the builder returns the
    /// linear (left-deep) result, which is the documented guarantee.
    pub fn build_bushy_tree(&self, graph: &JoinGraph, cost: &CostModel) -> MeshResult<JoinOrder> {
        self.reorder(graph, cost)
    }

    /// Exact DP over subsets: `dp(S) = min over splits (A, S\A)` of
    /// `dp(A) + dp(B) + join_cost(A, B)`.
    fn dp_reorder(
        &self,
        graph: &JoinGraph,
        cost: &CostModel,
        tables: &[String],
    ) -> MeshResult<JoinOrder> {
        let n = tables.len();
        let full: usize = (1 << n) - 1;
        // dp[mask] = (cost, rows, order)
        let mut dp: Vec<Option<(f64, f64, Vec<String>)>> = vec![None; full + 1];

        for (i, table) in tables.iter().enumerate() {
            let rows = graph.cardinality(table).unwrap_or(1.0);
            dp[1 << i] = Some((
                cost.scan_cost(table, rows, false),
                rows,
                vec![table.clone()],
            ));
        }

        for mask in 1..=full {
            if dp[mask].is_some() {
                continue; // singleton
            }
            if mask.count_ones() < 2 {
                continue;
            }
            let mut best: Option<(f64, f64, Vec<String>)> = None;
            // enumerate proper non-empty subsets of mask
            let mut sub = (mask - 1) & mask;
            while sub > 0 {
                let rest = mask & !sub;
                if let (Some((cost_a, rows_a, order_a)), Some((cost_b, rows_b, order_b))) =
                    (&dp[sub], &dp[rest])
                {
                    let (conditions, selectivity) =
                        crossing_edges(graph, tables, sub, rest);
                    let join =
                        cost.join_cost(JoinType::Inner, *rows_a, *rows_b, conditions);
                    let total = cost_a + cost_b + join;
                    let rows = (rows_a * rows_b * selectivity).max(1.0);
                    if best.as_ref().is_none_or(|(c, _, _)| total < *c) {
                        let mut order = order_a.clone();
                        order.extend(order_b.iter().cloned());
                        best = Some((total, rows, order));
                    }
                }
                sub = (sub - 1) & mask;
            }
            dp[mask] = best;
        }

        let (estimated_cost, estimated_rows, order) = dp[full].clone().ok_or_else(|| {
            MeshError::SqlExecution {
                message: "join enumeration produced no plan".to_string(),
                context: format!("{n} tables"),
            }
        })?;
        Ok(JoinOrder {
            order,
            estimated_cost,
            estimated_rows,
        })
    }

    /// Greedy left-deep: start from the smallest table, then repeatedly
    /// take the table with the cheapest incremental join.
    fn greedy_reorder(
        &self,
        graph: &JoinGraph,
        cost: &CostModel,
        tables: &[String],
    ) -> MeshResult<JoinOrder> {
        let mut remaining: Vec<String> = tables.to_vec();
        remaining.sort_by(|a, b| {
            let ca = graph.cardinality(a).unwrap_or(1.0);
            let cb = graph.cardinality(b).unwrap_or(1.0);
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let first = remaining.remove(0);
        let mut rows = graph.cardinality(&first).unwrap_or(1.0);
        let mut total = cost.scan_cost(&first, rows, false);
        let mut order = vec![first];

        while !remaining.is_empty() {
            let mut best: Option<(usize, f64, f64)> = None; // (idx, incremental, out_rows)
            for (i, candidate) in remaining.iter().enumerate() {
                let cand_rows = graph.cardinality(candidate).unwrap_or(1.0);
                let (conditions, selectivity) = edges_to_set(graph, &order, candidate);
                let incremental = cost.scan_cost(candidate, cand_rows, false)
                    + cost.join_cost(JoinType::Inner, rows, cand_rows, conditions);
                let out_rows = (rows * cand_rows * selectivity).max(1.0);
                if best.as_ref().is_none_or(|(_, c, _)| incremental < *c) {
                    best = Some((i, incremental, out_rows));
                }
            }
            let (idx, incremental, out_rows) =
                best.expect("remaining is non-empty, a candidate always exists");
            total += incremental;
            rows = out_rows;
            order.push(remaining.remove(idx));
        }

        Ok(JoinOrder {
            order,
            estimated_cost: total,
            estimated_rows: rows,
        })
    }
}

/// Count and combined selectivity of edges crossing two subsets.
fn crossing_edges(
    graph: &JoinGraph,
    tables: &[String],
    mask_a: usize,
    mask_b: usize,
) -> (usize, f64) {
    let in_mask = |mask: usize, table: &str| -> bool {
        tables
            .iter()
            .position(|t| t == table)
            .map(|i| mask & (1 << i) != 0)
            .unwrap_or(false)
    };
    let mut count = 0usize;
    let mut selectivity = 1.0f64;
    for edge in graph.edges() {
        let crosses = (in_mask(mask_a, &edge.from) && in_mask(mask_b, &edge.to))
            || (in_mask(mask_b, &edge.from) && in_mask(mask_a, &edge.to));
        if crosses {
            count += 1;
            selectivity *= edge.selectivity;
        }
    }
    if count == 0 {
        // Cartesian: no reduction
        (0, 1.0)
    } else {
        (count, selectivity)
    }
}

/// Edges between a chosen set and one candidate table.
fn edges_to_set(graph: &JoinGraph, chosen: &[String], candidate: &str) -> (usize, f64) {
    let mut count = 0usize;
    let mut selectivity = 1.0f64;
    for edge in graph.edges() {
        let crosses = (edge.from == candidate && chosen.iter().any(|t| *t == edge.to))
            || (edge.to == candidate && chosen.iter().any(|t| *t == edge.from));
        if crosses {
            count += 1;
            selectivity *= edge.selectivity;
        }
    }
    if count == 0 { (0, 1.0) } else { (count, selectivity) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::optimizer::cost::HardwareProfile;

    fn model() -> CostModel {
        CostModel::new(&HardwareProfile::baseline())
    }

    fn chain_graph() -> JoinGraph {
        let mut g = JoinGraph::new();
        g.add_node("small", 10.0);
        g.add_node("medium", 1_000.0);
        g.add_node("large", 1_000_000.0);
        g.add_edge("small", "medium", 0.01).unwrap();
        g.add_edge("medium", "large", 0.001).unwrap();
        g
    }

    #[test]
    fn cache_key_is_permutation_invariant() {
        let abc = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let bca = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let cab = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(JoinReorderer::cache_key(&abc), JoinReorderer::cache_key(&bca));
        assert_eq!(JoinReorderer::cache_key(&abc), JoinReorderer::cache_key(&cab));
        assert_ne!(
            JoinReorderer::cache_key(&abc),
            JoinReorderer::cache_key(&vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn dp_covers_all_tables_once() {
        let reorderer = JoinReorderer::default();
        let result = reorderer.reorder(&chain_graph(), &model()).unwrap();
        let mut order = result.order.clone();
        order.sort();
        assert_eq!(order, vec!["large", "medium", "small"]);
        assert!(result.estimated_cost > 0.0);
    }

    #[test]
    fn memo_serves_repeat_queries() {
        let reorderer = JoinReorderer::default();
        let m = model();
        let g = chain_graph();
        let first = reorderer.reorder(&g, &m).unwrap();
        let second = reorderer.reorder(&g, &m).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn greedy_fallback_beyond_max_tables() {
        let reorderer = JoinReorderer::new(2);
        let result = reorderer.reorder(&chain_graph(), &model()).unwrap();
        // greedy starts from the smallest table
        assert_eq!(result.order[0], "small");
        assert_eq!(result.order.len(), 3);
    }

    #[test]
    fn single_table_is_trivial() {
        let mut g = JoinGraph::new();
        g.add_node("only", 42.0);
        let result = JoinReorderer::default().reorder(&g, &model()).unwrap();
        assert_eq!(result.order, vec!["only"]);
        assert_eq!(result.estimated_rows, 42.0);
    }

    #[test]
    fn empty_graph_rejected() {
        let g = JoinGraph::new();
        assert!(JoinReorderer::default().reorder(&g, &model()).is_err());
    }

    #[test]
    fn bushy_builder_matches_linear_result() {
        let reorderer = JoinReorderer::default();
        let m = model();
        let g = chain_graph();
        let linear = reorderer.reorder(&g, &m).unwrap();
        let bushy = reorderer.build_bushy_tree(&g, &m).unwrap();
        assert_eq!(linear, bushy);
    }
}
