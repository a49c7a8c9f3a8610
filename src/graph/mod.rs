//! Similarity graphs over phrase ids
//!
//! Two representations answer the same question ("how similar are these
//! two ids?"):
//!
//! - [`SimilarityGraph`]: precomputed, top-K capped, symmetrized and
//!   row-stochastic. Drives propagation and answers lookups in O(log K).
//! - [`DynamicGraph`]: uncapped cosine over a feature matrix, computed on
//!   first request and memoized.
//!
//! Propagation only sees them through [`SimilarityOracle`].

pub mod dynamic;
pub mod knn;

pub use dynamic::DynamicGraph;
pub use knn::{row_normalize, symmetrize, GraphAnalysis, GraphBuildStats, KnnBuilder, SimilarityGraph};

/// Pairwise similarity lookup shared across worker threads
pub trait SimilarityOracle: Send + Sync {
    /// Similarity of `a` and `b`; 0 when they are not connected
    fn similarity(&self, a: u32, b: u32) -> f64;
}

impl SimilarityOracle for SimilarityGraph {
    fn similarity(&self, a: u32, b: u32) -> f64 {
        self.weight(a, b)
    }
}

impl SimilarityOracle for DynamicGraph {
    fn similarity(&self, a: u32, b: u32) -> f64 {
        self.get_similarity(a, b)
    }
}
