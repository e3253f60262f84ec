//! Join graph analysis.
//!
//! Nodes are base tables with cardinality estimates; edges are equi-join
//! predicates with estimated selectivity. Edges are stored directed but
//! connectivity treats them as undirected.

use crate::error::{MeshError, MeshResult};
use ahash::AHashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub from: String,
    pub to: String,
    pub selectivity: f64,
}

#[derive(Debug, Default)]
pub struct JoinGraph {
    /// table → estimated cardinality
    nodes: AHashMap<String, f64>,
    edges: Vec<JoinEdge>,
    /// table → degree, kept consistent with edge add/remove
    degrees: AHashMap<String, usize>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, table: impl Into<String>, cardinality: f64) {
        let table = table.into();
        self.degrees.entry(table.clone()).or_insert(0);
        self.nodes.insert(table, cardinality.max(1.0));
    }

    pub fn cardinality(&self, table: &str) -> Option<f64> {
        self.nodes.get(table).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    /// Add a directed edge. Both endpoints must exist.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        selectivity: f64,
    ) -> MeshResult<()> {
        let (from, to) = (from.into(), to.into());
        for endpoint in [&from, &to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(MeshError::InvalidArgument(format!(
                    "join edge references unknown table '{endpoint}'"
                )));
            }
        }
        *self.degrees.entry(from.clone()).or_insert(0) += 1;
        *self.degrees.entry(to.clone()).or_insert(0) += 1;
        self.edges.push(JoinEdge {
            from,
            to,
            selectivity: selectivity.clamp(1e-9, 1.0),
        });
        Ok(())
    }

    /// Remove the first edge matching `(from, to)` in either direction.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> MeshResult<()> {
        let position = self.edges.iter().position(|e| {
            (e.from == from && e.to == to) || (e.from == to && e.to == from)
        });
        match position {
            Some(i) => {
                let edge = self.edges.remove(i);
                for endpoint in [&edge.from, &edge.to] {
                    if let Some(d) = self.degrees.get_mut(endpoint.as_str()) {
                        *d = d.saturating_sub(1);
                    }
                }
                Ok(())
            }
            None => Err(MeshError::InvalidArgument(format!(
                "no join edge between '{from}' and '{to}'"
            ))),
        }
    }

    pub fn degree(&self, table: &str) -> usize {
        self.degrees.get(table).copied().unwrap_or(0)
    }

    /// Degrees sorted descending.
    pub fn degree_sequence(&self) -> Vec<usize> {
        let mut seq: Vec<usize> = self.degrees.values().copied().collect();
        seq.sort_unstable_by(|a, b| b.cmp(a));
        seq
    }

    fn undirected_adjacency(&self) -> AHashMap<&str, Vec<&str>> {
        let mut adj: AHashMap<&str, Vec<&str>> = AHashMap::new();
        for name in self.nodes.keys() {
            adj.entry(name.as_str()).or_default();
        }
        for edge in &self.edges {
            adj.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
            adj.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        }
        adj
    }

    /// Connected components via BFS over the undirected view. Components
    /// and their members are sorted for determinism.
    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let adj = self.undirected_adjacency();
        let mut visited: AHashMap<&str, bool> = AHashMap::new();
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();

        let mut components = Vec::new();
        for start in names {
            if visited.get(start).copied().unwrap_or(false) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            visited.insert(start, true);
            while let Some(current) = queue.pop_front() {
                component.push(current.to_string());
                if let Some(neighbors) = adj.get(current) {
                    for &next in neighbors {
                        if !visited.get(next).copied().unwrap_or(false) {
                            visited.insert(next, true);
                            queue.push_back(next);
                        }
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }

    pub fn is_connected(&self) -> bool {
        self.nodes.is_empty() || self.connected_components().len() == 1
    }

    /// Minimum spanning tree by edge selectivity, via Kruskal with
    /// union-find. Returns the chosen edges.
    pub fn minimum_spanning_tree(&self) -> Vec<JoinEdge> {
        let mut order: Vec<usize> = (0..self.edges.len()).collect();
        order.sort_by(|a, b| {
            self.edges[*a]
                .selectivity
                .partial_cmp(&self.edges[*b].selectivity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let names: Vec<&String> = self.nodes.keys().collect();
        let index: AHashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut uf = UnionFind::new(names.len());

        let mut tree = Vec::new();
        for i in order {
            let edge = &self.edges[i];
            let (a, b) = (index[edge.from.as_str()], index[edge.to.as_str()]);
            if uf.union(a, b) {
                tree.push(edge.clone());
                if tree.len() + 1 == self.nodes.len() {
                    break;
                }
            }
        }
        tree
    }

    /// Star graph: one central vertex adjacent to all `n-1` others.
    pub fn is_star(&self) -> Option<String> {
        let n = self.nodes.len();
        if n < 3 {
            return None;
        }
        let center = self
            .degrees
            .iter()
            .find(|(_, d)| **d == n - 1)
            .map(|(name, _)| name.clone())?;
        // every other vertex must touch only the center
        let all_leaves = self
            .degrees
            .iter()
            .filter(|(name, _)| **name != center)
            .all(|(_, d)| *d == 1);
        if all_leaves { Some(center) } else { None }
    }

    /// Output estimate for joining `left` and `right`: the connecting
    /// edge's selectivity applied to the cardinality product, or the bare
    /// product when no edge connects them.
    pub fn edge_cardinality(&self, left: &str, right: &str) -> f64 {
        let card_left = self.cardinality(left).unwrap_or(1.0);
        let card_right = self.cardinality(right).unwrap_or(1.0);
        let edge = self.edges.iter().find(|e| {
            (e.from == left && e.to == right) || (e.from == right && e.to == left)
        });
        match edge {
            Some(e) => (card_left * card_right * e.selectivity).max(1.0),
            None => card_left * card_right,
        }
    }
}

/// Union-find with path halving and union by size.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns false when both were already in the same set.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> JoinGraph {
        let mut g = JoinGraph::new();
        g.add_node("a", 100.0);
        g.add_node("b", 200.0);
        g.add_node("c", 300.0);
        g.add_edge("a", "b", 0.1).unwrap();
        g.add_edge("b", "c", 0.2).unwrap();
        g
    }

    #[test]
    fn degrees_track_edges() {
        let mut g = chain_graph();
        assert_eq!(g.degree("a"), 1);
        assert_eq!(g.degree("b"), 2);
        g.remove_edge("b", "a").unwrap();
        assert_eq!(g.degree("a"), 0);
        assert_eq!(g.degree("b"), 1);
    }

    #[test]
    fn edge_requires_known_endpoints() {
        let mut g = JoinGraph::new();
        g.add_node("a", 1.0);
        assert!(g.add_edge("a", "ghost", 0.5).is_err());
    }

    #[test]
    fn components_use_undirected_view() {
        let mut g = chain_graph();
        g.add_node("island", 50.0);
        let components = g.connected_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0], vec!["a", "b", "c"]);
        assert_eq!(components[1], vec!["island"]);
        assert!(!g.is_connected());
    }

    #[test]
    fn degree_sequence_sorted_descending() {
        let g = chain_graph();
        assert_eq!(g.degree_sequence(), vec![2, 1, 1]);
    }

    #[test]
    fn mst_picks_lowest_selectivity_edges() {
        let mut g = chain_graph();
        // redundant expensive edge a-c should lose to the chain
        g.add_edge("a", "c", 0.9).unwrap();
        let tree = g.minimum_spanning_tree();
        assert_eq!(tree.len(), 2);
        assert!(tree.iter().all(|e| e.selectivity < 0.9));
    }

    #[test]
    fn star_detection() {
        let mut g = JoinGraph::new();
        for name in ["hub", "x", "y", "z"] {
            g.add_node(name, 10.0);
        }
        g.add_edge("hub", "x", 0.1).unwrap();
        g.add_edge("hub", "y", 0.1).unwrap();
        g.add_edge("hub", "z", 0.1).unwrap();
        assert_eq!(g.is_star(), Some("hub".to_string()));

        // a chain is not a star
        assert_eq!(chain_graph().is_star(), None);
    }

    #[test]
    fn edge_cardinality_with_fallback() {
        let g = chain_graph();
        // edged pair applies selectivity
        assert_eq!(g.edge_cardinality("a", "b"), 100.0 * 200.0 * 0.1);
        // direction does not matter
        assert_eq!(g.edge_cardinality("b", "a"), g.edge_cardinality("a", "b"));
        // un-edged pair falls back to the product
        assert_eq!(g.edge_cardinality("a", "c"), 100.0 * 300.0);
    }
}
