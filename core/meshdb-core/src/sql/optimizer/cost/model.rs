//! Operator cost functions.
//!
//! All formulas are expressed in the profile's cost factors so the same
//! plan ranks consistently on any host.

use crate::sql::optimizer::cost::{CostFactors, HardwareProfile};
use crate::sql::planner::JoinType;
use dashmap::DashMap;

/// Vector index shape, for the vector-scan formula only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorIndexKind {
    Hnsw,
    Flat,
    IvfFlat,
}

/// Fraction of the scan cost a fully warm cache removes.
const CACHE_DISCOUNT: f64 = 0.8;

pub struct CostModel {
    factors: CostFactors,
    /// table → cache-hit rate in 0..=1, updated externally
    cache_hit: DashMap<String, f64>,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(&HardwareProfile::detect())
    }
}

impl CostModel {
    pub fn new(profile: &HardwareProfile) -> Self {
        Self {
            factors: profile.cost_factors(),
            cache_hit: DashMap::new(),
        }
    }

    pub fn factors(&self) -> CostFactors {
        self.factors
    }

    /// External feedback: the observed cache-hit rate for a table.
    pub fn update_cache_hit_info(&self, table: impl Into<String>, rate: f64) {
        self.cache_hit.insert(table.into(), rate.clamp(0.0, 1.0));
    }

    pub fn cache_hit_rate(&self, table: &str) -> f64 {
        self.cache_hit.get(table).map(|r| *r).unwrap_or(0.0)
    }

    /// Scan: `rows × io`, or the index alternative
    /// `log2(rows) × cpu + 0.1 × rows × io` when an index applies —
    /// whichever is cheaper — discounted by the table's cache-hit rate.
    pub fn scan_cost(&self, table: &str, rows: f64, has_index: bool) -> f64 {
        let rows = rows.max(1.0);
        let base = rows * self.factors.io;
        let cost = if has_index {
            let indexed = rows.log2().max(0.0) * self.factors.cpu + 0.1 * rows * self.factors.io;
            base.min(indexed)
        } else {
            base
        };
        cost * (1.0 - CACHE_DISCOUNT * self.cache_hit_rate(table))
    }

    /// Filter: `out_rows × cpu + in_rows × memory × 0.01`, with the cpu
    /// term multiplied by 0.3 per filter whose field is indexed.
    pub fn filter_cost(&self, in_rows: f64, out_rows: f64, indexed_filters: usize) -> f64 {
        let mut cpu_term = out_rows.max(0.0) * self.factors.cpu;
        for _ in 0..indexed_filters {
            cpu_term *= 0.3;
        }
        cpu_term + in_rows.max(0.0) * self.factors.memory * 0.01
    }

    /// Hash join: build + probe, plus outer materialisation terms.
    pub fn join_cost(
        &self,
        join_type: JoinType,
        build_rows: f64,
        probe_rows: f64,
        conditions: usize,
    ) -> f64 {
        let build_rows = build_rows.max(1.0);
        let probe_rows = probe_rows.max(1.0);
        let build = build_rows * self.factors.cpu * 2.0 + build_rows * self.factors.memory * 0.01;
        let probe = probe_rows * (conditions as f64 + 1.0) * self.factors.cpu
            + probe_rows * self.factors.memory * 0.001;
        let base = build + probe;
        match join_type {
            JoinType::Left | JoinType::Semi | JoinType::AntiSemi => {
                base + build_rows * self.factors.memory * 0.01
            }
            JoinType::Right => base + probe_rows * self.factors.memory * 0.01,
            JoinType::Full => {
                // both directions materialise: sum of both build+probe
                let reversed = probe_rows * self.factors.cpu * 2.0
                    + probe_rows * self.factors.memory * 0.01
                    + build_rows * (conditions as f64 + 1.0) * self.factors.cpu
                    + build_rows * self.factors.memory * 0.001;
                base + reversed
            }
            JoinType::Inner | JoinType::Cross => base,
        }
    }

    /// Aggregate: `rows × (group_cols + agg_funcs) × cpu +
    /// rows × memory × 0.05 + sort_term`.
    pub fn aggregate_cost(
        &self,
        rows: f64,
        group_cols: usize,
        agg_funcs: usize,
        needs_sort: bool,
    ) -> f64 {
        let rows = rows.max(0.0);
        let work = (group_cols + agg_funcs).max(1) as f64;
        let sort_term = if needs_sort { self.sort_cost(rows) } else { 0.0 };
        rows * work * self.factors.cpu + rows * self.factors.memory * 0.05 + sort_term
    }

    /// Sort: `rows × log2(rows) × cpu`; free at one row or fewer.
    pub fn sort_cost(&self, rows: f64) -> f64 {
        if rows <= 1.0 {
            return 0.0;
        }
        rows * rows.log2() * self.factors.cpu
    }

    /// Vector search over `n` stored vectors returning `k`.
    pub fn vector_cost(&self, kind: VectorIndexKind, n: f64, k: f64) -> f64 {
        let n = n.max(1.0);
        let k = k.max(1.0);
        match kind {
            VectorIndexKind::Hnsw => n.log2().max(1.0) * k * self.factors.cpu,
            VectorIndexKind::Flat => n * self.factors.cpu + k * k.log2().max(0.0) * self.factors.cpu,
            VectorIndexKind::IvfFlat => (n / n.sqrt()) * self.factors.cpu,
        }
    }
}
