//! In-memory document index: inverted term lists with BM25 ranking and
//! numeric field ranges for filtered retrieval.

use crate::error::{MeshError, MeshResult};
use crate::fulltext::{Bm25Scorer, CollectionStats};
use crate::types::Value;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u64,
    pub score: f64,
}

struct StoredDoc {
    /// term → frequency in this document
    terms: AHashMap<String, u64>,
    length: u64,
    /// numeric fields usable in range queries
    numeric_fields: BTreeMap<String, f64>,
}

#[derive(Default)]
struct IndexInner {
    docs: AHashMap<u64, StoredDoc>,
    /// term → posting list of doc ids
    postings: AHashMap<String, Vec<u64>>,
}

/// A small self-contained search index; one instance per indexed table.
pub struct DocumentIndex {
    stats: CollectionStats,
    scorer: Bm25Scorer,
    inner: RwLock<IndexInner>,
}

impl Default for DocumentIndex {
    fn default() -> Self {
        Self::new(Bm25Scorer::default())
    }
}

impl DocumentIndex {
    pub fn new(scorer: Bm25Scorer) -> Self {
        Self {
            stats: CollectionStats::new(),
            scorer,
            inner: RwLock::new(IndexInner::default()),
        }
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    /// Index a document. `text` is tokenised on whitespace and lowercased;
    /// numeric fields become range-queryable.
    pub fn add_document(
        &self,
        doc_id: u64,
        text: &str,
        fields: &BTreeMap<String, Value>,
    ) -> MeshResult<()> {
        let mut inner = self.inner.write();
        if inner.docs.contains_key(&doc_id) {
            return Err(MeshError::AlreadyExists(format!("document {doc_id}")));
        }

        let mut terms: AHashMap<String, u64> = AHashMap::new();
        let mut length = 0u64;
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            if token.is_empty() {
                continue;
            }
            *terms.entry(token).or_insert(0) += 1;
            length += 1;
        }

        let mut numeric_fields = BTreeMap::new();
        for (name, value) in fields {
            if let Some(n) = value.as_f64() {
                numeric_fields.insert(name.clone(), n);
            }
        }

        for term in terms.keys() {
            inner.postings.entry(term.clone()).or_default().push(doc_id);
        }
        self.stats
            .add_document(length, terms.keys().map(String::as_str));
        inner.docs.insert(
            doc_id,
            StoredDoc {
                terms,
                length,
                numeric_fields,
            },
        );
        Ok(())
    }

    pub fn remove_document(&self, doc_id: u64) -> MeshResult<()> {
        let mut inner = self.inner.write();
        let doc = inner
            .docs
            .remove(&doc_id)
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown document {doc_id}")))?;
        for term in doc.terms.keys() {
            if let Some(postings) = inner.postings.get_mut(term) {
                postings.retain(|id| *id != doc_id);
            }
        }
        self.stats
            .remove_document(doc.length, doc.terms.keys().map(String::as_str));
        Ok(())
    }

    /// BM25-ranked search. Multi-term queries sum per-term scores.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredDoc> {
        let inner = self.inner.read();
        let mut scores: AHashMap<u64, f64> = AHashMap::new();
        for token in query.split_whitespace() {
            let token = token.to_lowercase();
            let Some(postings) = inner.postings.get(&token) else {
                continue;
            };
            for doc_id in postings {
                let Some(doc) = inner.docs.get(doc_id) else {
                    continue;
                };
                let tf = doc.terms.get(&token).copied().unwrap_or(0) as f64;
                let score = self
                    .scorer
                    .score_term(&self.stats, &token, tf, doc.length as f64);
                *scores.entry(*doc_id).or_insert(0.0) += score;
            }
        }
        let mut out: Vec<ScoredDoc> = scores
            .into_iter()
            .map(|(doc_id, score)| ScoredDoc { doc_id, score })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        out.truncate(limit);
        out
    }

    /// Documents whose numeric `field` lies in `[min, max]` (inclusive).
    pub fn range_query(&self, field: &str, min: f64, max: f64) -> Vec<u64> {
        let inner = self.inner.read();
        let mut out: Vec<u64> = inner
            .docs
            .iter()
            .filter(|(_, doc)| {
                doc.numeric_fields
                    .get(field)
                    .is_some_and(|v| *v >= min && *v <= max)
            })
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn doc_count(&self) -> u64 {
        self.stats.doc_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;

    fn price_doc(price: i64) -> BTreeMap<String, Value> {
        row_from_pairs([("price", Value::Int64(price))])
    }

    #[test]
    fn range_query_inclusive_bounds() {
        let index = DocumentIndex::default();
        for (id, price) in [(1u64, 100i64), (2, 200), (3, 150), (4, 300)] {
            index
                .add_document(id, &format!("product {id}"), &price_doc(price))
                .unwrap();
        }
        // price ∈ [100, 200] keeps exactly the first three documents
        assert_eq!(index.range_query("price", 100.0, 200.0), vec![1, 2, 3]);
    }

    #[test]
    fn search_ranks_by_relevance() {
        let index = DocumentIndex::default();
        let empty = BTreeMap::new();
        index
            .add_document(1, "rust database engine", &empty)
            .unwrap();
        index
            .add_document(2, "rust rust rust language", &empty)
            .unwrap();
        index.add_document(3, "cooking recipes", &empty).unwrap();

        let results = index.search("rust", 10);
        assert_eq!(results.len(), 2);
        // higher term frequency wins for the same term
        assert_eq!(results[0].doc_id, 2);
    }

    #[test]
    fn search_is_case_insensitive() {
        let index = DocumentIndex::default();
        let empty = BTreeMap::new();
        index.add_document(1, "Rust Engine", &empty).unwrap();
        assert_eq!(index.search("rust", 10).len(), 1);
        assert_eq!(index.search("ENGINE", 10).len(), 1);
    }

    #[test]
    fn remove_document_updates_results() {
        let index = DocumentIndex::default();
        let empty = BTreeMap::new();
        index.add_document(1, "rust", &empty).unwrap();
        index.add_document(2, "rust", &empty).unwrap();
        index.remove_document(1).unwrap();
        let results = index.search("rust", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, 2);
        assert_eq!(index.doc_count(), 1);
    }

    #[test]
    fn duplicate_doc_id_rejected() {
        let index = DocumentIndex::default();
        let empty = BTreeMap::new();
        index.add_document(1, "a", &empty).unwrap();
        assert!(index.add_document(1, "b", &empty).is_err());
    }
}
