//! Hierarchical Navigable Small World index.
//!
//! Layered proximity graph with geometrically sampled levels: queries
//! greedily descend the sparse upper layers, then run a beam search over
//! layer 0. Sub-logarithmic in practice for well-behaved data.

use crate::error::{MeshError, MeshResult};
use crate::vector::{
    IdFilter, IndexConfig, MetricType, SearchResult, VectorIndex, VectorIndexType, check_dimension,
    distance,
};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

const MAX_LEVEL: usize = 16;

/// `(distance, id)` with `Ord` so it can live in a heap. Max-heap by
/// distance; wrap in `Reverse` for min-heap behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DistEntry(f32, u64);

impl Eq for DistEntry {}

impl PartialOrd for DistEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

struct Node {
    vector: Vec<f32>,
    /// neighbors[layer] — present for layers 0..=node level
    neighbors: Vec<Vec<u64>>,
}

#[derive(Default)]
struct Inner {
    nodes: AHashMap<u64, Node>,
    entry: Option<u64>,
    max_level: usize,
}

pub struct HnswIndex {
    config: IndexConfig,
    /// Max links per node above layer 0; layer 0 allows twice as many
    m: usize,
    ef_construction: usize,
    ef_search: AtomicUsize,
    inner: RwLock<Inner>,
}

impl HnswIndex {
    pub fn new(metric: MetricType, dimension: usize) -> Self {
        Self::with_params(metric, dimension, 16, 200, 64)
    }

    pub fn with_params(
        metric: MetricType,
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Self {
        Self {
            config: IndexConfig {
                metric,
                dimension,
                index_type: VectorIndexType::Hnsw,
            },
            m: m.max(2),
            ef_construction: ef_construction.max(m),
            ef_search: AtomicUsize::new(ef_search.max(1)),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn set_ef_search(&self, ef: usize) {
        self.ef_search.store(ef.max(1), AtomicOrdering::SeqCst);
    }

    fn random_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let uniform: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let level = (-uniform.ln() * (1.0 / (self.m as f64).ln())) as usize;
        level.min(MAX_LEVEL)
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }

    /// Beam search within one layer starting from `entry_points`; returns
    /// up to `ef` nearest candidates, ascending by distance.
    fn search_layer(
        &self,
        inner: &Inner,
        query: &[f32],
        entry_points: &[u64],
        ef: usize,
        layer: usize,
    ) -> Vec<DistEntry> {
        let mut visited: AHashSet<u64> = AHashSet::new();
        let mut candidates: BinaryHeap<std::cmp::Reverse<DistEntry>> = BinaryHeap::new();
        let mut results: BinaryHeap<DistEntry> = BinaryHeap::new();

        for &id in entry_points {
            let Some(node) = inner.nodes.get(&id) else {
                continue;
            };
            let entry = DistEntry(distance(self.config.metric, query, &node.vector), id);
            visited.insert(id);
            candidates.push(std::cmp::Reverse(entry));
            results.push(entry);
        }

        while let Some(std::cmp::Reverse(current)) = candidates.pop() {
            let worst = results.peek().map(|e| e.0).unwrap_or(f32::INFINITY);
            if current.0 > worst && results.len() >= ef {
                break;
            }
            let Some(node) = inner.nodes.get(&current.1) else {
                continue;
            };
            let Some(neighbors) = node.neighbors.get(layer) else {
                continue;
            };
            for &next in neighbors {
                if !visited.insert(next) {
                    continue;
                }
                let Some(next_node) = inner.nodes.get(&next) else {
                    continue;
                };
                let d = distance(self.config.metric, query, &next_node.vector);
                let worst = results.peek().map(|e| e.0).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < worst {
                    let entry = DistEntry(d, next);
                    candidates.push(std::cmp::Reverse(entry));
                    results.push(entry);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out = results.into_vec();
        out.sort();
        out
    }

    /// Greedy single-step descent through layers above `target_layer`.
    fn descend(&self, inner: &Inner, query: &[f32], mut entry: u64, target_layer: usize) -> u64 {
        let top = inner.max_level;
        for layer in ((target_layer + 1)..=top).rev() {
            let found = self.search_layer(inner, query, &[entry], 1, layer);
            if let Some(best) = found.first() {
                entry = best.1;
            }
        }
        entry
    }

    fn prune_neighbors(&self, inner: &mut Inner, id: u64, layer: usize) {
        let cap = self.max_links(layer);
        let Some(node) = inner.nodes.get(&id) else {
            return;
        };
        if node.neighbors.get(layer).map(Vec::len).unwrap_or(0) <= cap {
            return;
        }
        let base = node.vector.clone();
        let mut scored: Vec<DistEntry> = node.neighbors[layer]
            .iter()
            .filter_map(|n| {
                inner
                    .nodes
                    .get(n)
                    .map(|nn| DistEntry(distance(self.config.metric, &base, &nn.vector), *n))
            })
            .collect();
        scored.sort();
        scored.truncate(cap);
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.neighbors[layer] = scored.into_iter().map(|e| e.1).collect();
        }
    }
}

impl VectorIndex for HnswIndex {
    fn config(&self) -> IndexConfig {
        self.config
    }

    fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    fn insert(&self, id: u64, vector: Vec<f32>) -> MeshResult<()> {
        check_dimension(&self.config, &vector)?;
        let mut inner = self.inner.write();
        if inner.nodes.contains_key(&id) {
            return Err(MeshError::AlreadyExists(format!("vector id {id}")));
        }

        let level = self.random_level();
        let node = Node {
            vector: vector.clone(),
            neighbors: vec![Vec::new(); level + 1],
        };

        let Some(entry) = inner.entry else {
            inner.max_level = level;
            inner.nodes.insert(id, node);
            inner.entry = Some(id);
            return Ok(());
        };

        inner.nodes.insert(id, node);
        let mut ep = self.descend(&inner, &vector, entry, level);

        for layer in (0..=level.min(inner.max_level)).rev() {
            let candidates = self.search_layer(&inner, &vector, &[ep], self.ef_construction, layer);
            let selected: Vec<u64> = candidates
                .iter()
                .filter(|e| e.1 != id)
                .take(self.max_links(layer))
                .map(|e| e.1)
                .collect();

            if let Some(node) = inner.nodes.get_mut(&id) {
                node.neighbors[layer] = selected.clone();
            }
            for neighbor in &selected {
                if let Some(node) = inner.nodes.get_mut(neighbor) {
                    if let Some(links) = node.neighbors.get_mut(layer) {
                        if !links.contains(&id) {
                            links.push(id);
                        }
                    }
                }
                self.prune_neighbors(&mut inner, *neighbor, layer);
            }
            if let Some(best) = candidates.first() {
                ep = best.1;
            }
        }

        if level > inner.max_level {
            inner.max_level = level;
            inner.entry = Some(id);
        }
        Ok(())
    }

    fn remove(&self, id: u64) -> MeshResult<()> {
        let mut inner = self.inner.write();
        if inner.nodes.remove(&id).is_none() {
            return Err(MeshError::InvalidArgument(format!("unknown vector id {id}")));
        }
        for node in inner.nodes.values_mut() {
            for links in &mut node.neighbors {
                links.retain(|n| *n != id);
            }
        }
        if inner.entry == Some(id) {
            // promote the node with the highest level as the new entry
            let next = inner
                .nodes
                .iter()
                .max_by_key(|(_, n)| n.neighbors.len())
                .map(|(id, n)| (*id, n.neighbors.len() - 1));
            match next {
                Some((new_entry, level)) => {
                    inner.entry = Some(new_entry);
                    inner.max_level = level;
                }
                None => {
                    inner.entry = None;
                    inner.max_level = 0;
                }
            }
        }
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> MeshResult<SearchResult> {
        check_dimension(&self.config, query)?;
        let inner = self.inner.read();
        let Some(entry) = inner.entry else {
            return Ok(SearchResult::default());
        };

        let ef = self.ef_search.load(AtomicOrdering::SeqCst).max(k);
        // over-fetch when a filter may reject candidates
        let ef = if filter.is_some() { ef * 2 } else { ef };

        let ep = self.descend(&inner, query, entry, 0);
        let candidates = self.search_layer(&inner, query, &[ep], ef, 0);

        let mut ids = Vec::with_capacity(k);
        let mut distances = Vec::with_capacity(k);
        for DistEntry(d, id) in candidates {
            if filter.is_none_or(|f| f(id)) {
                ids.push(id);
                distances.push(d);
                if ids.len() == k {
                    break;
                }
            }
        }
        Ok(SearchResult { ids, distances })
    }
}
