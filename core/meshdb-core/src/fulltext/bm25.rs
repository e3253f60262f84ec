//! Classical BM25 scoring.

use ahash::AHashMap;
use parking_lot::RwLock;

/// Corpus-wide statistics feeding the scorer: document count, total
/// token length, and per-term document frequency.
#[derive(Default)]
pub struct CollectionStats {
    inner: RwLock<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    doc_count: u64,
    total_length: u64,
    df: AHashMap<String, u64>,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document of `length` tokens containing `terms` (unique
    /// terms only; duplicates inflate df).
    pub fn add_document<'a>(&self, length: u64, terms: impl IntoIterator<Item = &'a str>) {
        let mut inner = self.inner.write();
        inner.doc_count += 1;
        inner.total_length += length;
        for term in terms {
            *inner.df.entry(term.to_string()).or_insert(0) += 1;
        }
    }

    pub fn remove_document<'a>(&self, length: u64, terms: impl IntoIterator<Item = &'a str>) {
        let mut inner = self.inner.write();
        inner.doc_count = inner.doc_count.saturating_sub(1);
        inner.total_length = inner.total_length.saturating_sub(length);
        for term in terms {
            if let Some(df) = inner.df.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    inner.df.remove(term);
                }
            }
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.inner.read().doc_count
    }

    pub fn avg_length(&self) -> f64 {
        let inner = self.inner.read();
        if inner.doc_count == 0 {
            0.0
        } else {
            inner.total_length as f64 / inner.doc_count as f64
        }
    }

    pub fn document_frequency(&self, term: &str) -> u64 {
        self.inner.read().df.get(term).copied().unwrap_or(0)
    }
}

/// BM25 with tunable `k1` and `b`. Defaults are the classical 1.2 / 0.75.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Scorer {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Scorer {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// `idf(t) = ln(1 + (N - df + 0.5) / (df + 0.5))`
    pub fn idf(&self, stats: &CollectionStats, term: &str) -> f64 {
        let n = stats.doc_count() as f64;
        let df = stats.document_frequency(term) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Length-normalised term-frequency component.
    pub fn tf(&self, term_freq: f64, doc_len: f64, avg_len: f64) -> f64 {
        if term_freq <= 0.0 {
            return 0.0;
        }
        let norm = if avg_len > 0.0 { doc_len / avg_len } else { 1.0 };
        term_freq * (self.k1 + 1.0) / (term_freq + self.k1 * (1.0 - self.b + self.b * norm))
    }

    /// Score a single `(term, term_freq)` pair against a document.
    pub fn score_term(
        &self,
        stats: &CollectionStats,
        term: &str,
        term_freq: f64,
        doc_len: f64,
    ) -> f64 {
        self.idf(stats, term) * self.tf(term_freq, doc_len, stats.avg_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_docs() -> CollectionStats {
        let stats = CollectionStats::new();
        stats.add_document(10, ["rust", "database"]);
        stats.add_document(20, ["rust", "engine"]);
        stats.add_document(30, ["vector"]);
        stats
    }

    #[test]
    fn stats_track_corpus() {
        let stats = stats_with_docs();
        assert_eq!(stats.doc_count(), 3);
        assert_eq!(stats.avg_length(), 20.0);
        assert_eq!(stats.document_frequency("rust"), 2);
        assert_eq!(stats.document_frequency("missing"), 0);
    }

    #[test]
    fn rarer_terms_score_higher() {
        let stats = stats_with_docs();
        let scorer = Bm25Scorer::default();
        assert!(scorer.idf(&stats, "vector") > scorer.idf(&stats, "rust"));
    }

    #[test]
    fn idf_is_positive_even_for_common_terms() {
        let stats = CollectionStats::new();
        stats.add_document(5, ["the"]);
        stats.add_document(5, ["the"]);
        let scorer = Bm25Scorer::default();
        assert!(scorer.idf(&stats, "the") > 0.0);
    }

    #[test]
    fn tf_saturates() {
        let scorer = Bm25Scorer::default();
        let low = scorer.tf(1.0, 10.0, 10.0);
        let high = scorer.tf(100.0, 10.0, 10.0);
        assert!(high > low);
        // saturation: the curve approaches k1 + 1
        assert!(high < scorer.k1 + 1.0);
    }

    #[test]
    fn longer_documents_are_penalised() {
        let scorer = Bm25Scorer::default();
        let short = scorer.tf(2.0, 5.0, 20.0);
        let long = scorer.tf(2.0, 80.0, 20.0);
        assert!(short > long);
    }

    #[test]
    fn zero_tf_scores_zero() {
        let stats = stats_with_docs();
        let scorer = Bm25Scorer::default();
        assert_eq!(scorer.score_term(&stats, "rust", 0.0, 10.0), 0.0);
    }

    #[test]
    fn remove_document_reverses_add() {
        let stats = CollectionStats::new();
        stats.add_document(10, ["a", "b"]);
        stats.add_document(6, ["b"]);
        stats.remove_document(10, ["a", "b"]);
        assert_eq!(stats.doc_count(), 1);
        assert_eq!(stats.document_frequency("a"), 0);
        assert_eq!(stats.document_frequency("b"), 1);
    }
}
