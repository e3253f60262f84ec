//! Exact (brute-force) vector index.

use crate::error::{MeshError, MeshResult};
use crate::vector::{
    IdFilter, IndexConfig, MetricType, SearchResult, VectorIndex, VectorIndexType, check_dimension,
    distance,
};
use ahash::AHashMap;
use parking_lot::RwLock;

/// Scans every stored vector; always exact, O(N) per query.
pub struct FlatIndex {
    config: IndexConfig,
    vectors: RwLock<AHashMap<u64, Vec<f32>>>,
}

impl FlatIndex {
    pub fn new(metric: MetricType, dimension: usize) -> Self {
        Self {
            config: IndexConfig {
                metric,
                dimension,
                index_type: VectorIndexType::Flat,
            },
            vectors: RwLock::new(AHashMap::new()),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn config(&self) -> IndexConfig {
        self.config
    }

    fn len(&self) -> usize {
        self.vectors.read().len()
    }

    fn insert(&self, id: u64, vector: Vec<f32>) -> MeshResult<()> {
        check_dimension(&self.config, &vector)?;
        self.vectors.write().insert(id, vector);
        Ok(())
    }

    fn remove(&self, id: u64) -> MeshResult<()> {
        self.vectors
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown vector id {id}")))
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> MeshResult<SearchResult> {
        check_dimension(&self.config, query)?;
        let vectors = self.vectors.read();
        let mut scored: Vec<(u64, f32)> = vectors
            .iter()
            .filter(|(id, _)| filter.is_none_or(|f| f(**id)))
            .map(|(id, v)| (*id, distance(self.config.metric, query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(SearchResult {
            ids: scored.iter().map(|(id, _)| *id).collect(),
            distances: scored.iter().map(|(_, d)| *d).collect(),
        })
    }
}
