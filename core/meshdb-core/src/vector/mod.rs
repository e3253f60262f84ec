//! Approximate nearest-neighbour indexes consumed by the VectorScan
//! operator: an exact flat index and an HNSW graph, behind one trait.

mod flat;
mod hnsw;
mod manager;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use manager::IndexManager;

use crate::error::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    L2,
    Cosine,
    InnerProduct,
}

impl MetricType {
    pub fn parse(s: &str) -> MeshResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(MetricType::L2),
            "cosine" => Ok(MetricType::Cosine),
            "ip" | "inner_product" | "dot" => Ok(MetricType::InnerProduct),
            other => Err(MeshError::InvalidArgument(format!(
                "unknown metric type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorIndexType {
    Flat,
    Hnsw,
}

impl VectorIndexType {
    pub fn parse(s: &str) -> MeshResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(VectorIndexType::Flat),
            "hnsw" => Ok(VectorIndexType::Hnsw),
            other => Err(MeshError::InvalidArgument(format!(
                "unknown vector index type '{other}'"
            ))),
        }
    }
}

/// Typed index configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub metric: MetricType,
    pub dimension: usize,
    pub index_type: VectorIndexType,
}

/// Ids and distances, nearest first. Lengths always match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub ids: Vec<u64>,
    pub distances: Vec<f32>,
}

/// Optional predicate narrowing a search to permitted ids.
pub type IdFilter<'a> = &'a dyn Fn(u64) -> bool;

pub trait VectorIndex: Send + Sync {
    fn config(&self) -> IndexConfig;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, id: u64, vector: Vec<f32>) -> MeshResult<()>;
    fn remove(&self, id: u64) -> MeshResult<()>;
    fn search(&self, query: &[f32], k: usize, filter: Option<IdFilter<'_>>)
    -> MeshResult<SearchResult>;
}

/// Distance under `metric`; smaller is always nearer (inner product is
/// negated).
pub fn distance(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        MetricType::Cosine => {
            let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                1.0
            } else {
                1.0 - dot / (na * nb)
            }
        }
        MetricType::InnerProduct => -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>(),
    }
}

pub(crate) fn check_dimension(config: &IndexConfig, vector: &[f32]) -> MeshResult<()> {
    if vector.len() != config.dimension {
        return Err(MeshError::InvalidArgument(format!(
            "vector dimension mismatch: index expects {}, got {}",
            config.dimension,
            vector.len()
        )));
    }
    Ok(())
}
