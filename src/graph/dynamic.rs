//! On-demand cosine similarity with a shared memo

use dashmap::DashMap;

use crate::sparse::{cosine, SparseMatrix};

/// Uncapped similarity oracle over a feature matrix.
///
/// Each unordered pair is computed at most once per winner: concurrent
/// callers may both compute a value, the first insert is kept and both
/// return it. Negative cosines are clipped to 0.
#[derive(Debug)]
pub struct DynamicGraph {
    features: SparseMatrix,
    cache: DashMap<u64, f64>,
}

#[inline]
fn pair_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

impl DynamicGraph {
    pub fn new(features: SparseMatrix) -> Self {
        Self {
            features,
            cache: DashMap::new(),
        }
    }

    pub fn get_similarity(&self, a: u32, b: u32) -> f64 {
        let key = pair_key(a, b);
        if let Some(v) = self.cache.get(&key) {
            return *v;
        }
        let value = cosine(&self.features.row(a as usize), &self.features.row(b as usize)).clamp(0.0, 1.0);
        *self.cache.entry(key).or_insert(value)
    }

    /// Number of memoized pairs
    pub fn cached_pairs(&self) -> usize {
        self.cache.len()
    }

    pub fn features(&self) -> &SparseMatrix {
        &self.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::Triplet;
    use rayon::prelude::*;

    const EPSILON: f64 = 1e-12;

    fn features() -> SparseMatrix {
        SparseMatrix::from_triplets(
            4,
            2,
            vec![
                Triplet::new(0, 0, 1.0),
                Triplet::new(1, 0, 1.0),
                Triplet::new(1, 1, 1.0),
                Triplet::new(2, 0, -1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(pair_key(3, 7), pair_key(7, 3));
        assert_ne!(pair_key(3, 7), pair_key(3, 8));
        assert_eq!(pair_key(1, 2), (1u64 << 32) | 2);
    }

    #[test]
    fn test_similarity_memoized_both_orders() {
        let g = DynamicGraph::new(features());
        let s = g.get_similarity(0, 1);
        assert!((s - 1.0 / 2f64.sqrt()).abs() < EPSILON);
        assert_eq!(g.get_similarity(1, 0), s);
        assert_eq!(g.cached_pairs(), 1);
    }

    #[test]
    fn test_negative_clipped_and_zero_norm() {
        let g = DynamicGraph::new(features());
        assert_eq!(g.get_similarity(0, 2), 0.0);
        assert_eq!(g.get_similarity(0, 3), 0.0);
        assert_eq!(g.get_similarity(3, 3), 0.0);
        assert_eq!(g.get_similarity(0, 99), 0.0);
    }

    #[test]
    fn test_concurrent_lookups_agree() {
        let g = DynamicGraph::new(features());
        let values: Vec<f64> = (0..1000u32)
            .into_par_iter()
            .map(|i| if i % 2 == 0 { g.get_similarity(0, 1) } else { g.get_similarity(1, 0) })
            .collect();
        assert!(values.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(g.cached_pairs(), 1);
    }
}
