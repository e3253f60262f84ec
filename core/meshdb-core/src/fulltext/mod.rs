//! Full-text search: BM25 scoring over an inverted index, plus sparse
//! vector utilities shared with the ranking pipeline.

mod bm25;
mod index;
mod sparse;

pub use bm25::{Bm25Scorer, CollectionStats};
pub use index::{DocumentIndex, ScoredDoc};
pub use sparse::SparseVector;
