//! Registry of vector indexes keyed by `(table, column)`.

use crate::error::{MeshError, MeshResult};
use crate::vector::{
    FlatIndex, HnswIndex, IdFilter, IndexConfig, SearchResult, VectorIndex, VectorIndexType,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct IndexManager {
    indexes: DashMap<(String, String), Arc<dyn VectorIndex>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index for `table.column` per `config`.
    pub fn create_index(
        &self,
        table: impl Into<String>,
        column: impl Into<String>,
        config: IndexConfig,
    ) -> MeshResult<Arc<dyn VectorIndex>> {
        let key = (table.into(), column.into());
        if self.indexes.contains_key(&key) {
            return Err(MeshError::AlreadyExists(format!("{}.{}", key.0, key.1)));
        }
        let index: Arc<dyn VectorIndex> = match config.index_type {
            VectorIndexType::Flat => Arc::new(FlatIndex::new(config.metric, config.dimension)),
            VectorIndexType::Hnsw => Arc::new(HnswIndex::new(config.metric, config.dimension)),
        };
        info!(table = %key.0, column = %key.1, ?config, "vector index created");
        self.indexes.insert(key, Arc::clone(&index));
        Ok(index)
    }

    pub fn get_index(&self, table: &str, column: &str) -> MeshResult<Arc<dyn VectorIndex>> {
        self.indexes
            .get(&(table.to_string(), column.to_string()))
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| {
                MeshError::InvalidArgument(format!("no vector index on {table}.{column}"))
            })
    }

    pub fn drop_index(&self, table: &str, column: &str) -> MeshResult<()> {
        self.indexes
            .remove(&(table.to_string(), column.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                MeshError::InvalidArgument(format!("no vector index on {table}.{column}"))
            })
    }

    /// Drop every index belonging to `table` (table drop/truncate path).
    pub fn drop_table_indexes(&self, table: &str) {
        self.indexes.retain(|(t, _), _| t != table);
    }

    pub fn search(
        &self,
        table: &str,
        column: &str,
        query: &[f32],
        k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> MeshResult<SearchResult> {
        self.get_index(table, column)?.search(query, k, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::MetricType;

    fn flat_config() -> IndexConfig {
        IndexConfig {
            metric: MetricType::L2,
            dimension: 2,
            index_type: VectorIndexType::Flat,
        }
    }

    #[test]
    fn create_and_search() {
        let manager = IndexManager::new();
        let index = manager.create_index("docs", "embedding", flat_config()).unwrap();
        index.insert(1, vec![0.0, 0.0]).unwrap();
        index.insert(2, vec![5.0, 5.0]).unwrap();

        let result = manager
            .search("docs", "embedding", &[0.1, 0.1], 1, None)
            .unwrap();
        assert_eq!(result.ids, vec![1]);
    }

    #[test]
    fn duplicate_index_rejected() {
        let manager = IndexManager::new();
        manager.create_index("docs", "embedding", flat_config()).unwrap();
        assert!(matches!(
            manager.create_index("docs", "embedding", flat_config()),
            Err(MeshError::AlreadyExists(_))
        ));
    }

    #[test]
    fn drop_table_indexes_sweeps() {
        let manager = IndexManager::new();
        manager.create_index("docs", "a", flat_config()).unwrap();
        manager.create_index("docs", "b", flat_config()).unwrap();
        manager.create_index("other", "a", flat_config()).unwrap();
        manager.drop_table_indexes("docs");
        assert!(manager.get_index("docs", "a").is_err());
        assert!(manager.get_index("other", "a").is_ok());
    }

    #[test]
    fn missing_index_is_invalid_argument() {
        let manager = IndexManager::new();
        assert!(manager.get_index("docs", "embedding").is_err());
        assert!(manager.drop_index("docs", "embedding").is_err());
    }
}
