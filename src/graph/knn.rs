//! k-nearest-neighbor graph construction
//!
//! Candidates for row `i` are the phrases sharing at least one indexed
//! feature with it, so the full n x n similarity is never computed. Every
//! row keeps at most `k` positive-cosine neighbors plus a self-loop of 1.0.
//! The directed result is symmetrized as `0.5 * (S + S^T)` and then
//! row-normalized into a random-walk matrix.

use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PropError, Result};
use crate::features::InvertedIndex;
use crate::phrases::PhraseRegistry;
use crate::sparse::{cosine, read_market, write_market, SparseMatrix, Triplet};
use crate::ProgressCallback;

/// Rows between progress reports
const PROGRESS_STRIDE: usize = 1000;

/// Diagnostics from a graph build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphBuildStats {
    pub rows: usize,
    /// Rows with no candidate sharing an indexed feature
    pub featureless: usize,
    /// Rows with candidates, all of which scored <= 0
    pub non_positive: usize,
    pub directed_nnz: usize,
    pub symmetric_nnz: usize,
}

/// Builds a [`SimilarityGraph`] from a feature matrix and inverted index
pub struct KnnBuilder {
    k: usize,
    progress_callback: Option<ProgressCallback>,
}

impl KnnBuilder {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            progress_callback: None,
        }
    }

    /// Called with (rows done, total rows) every few thousand rows
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Top-k neighbors of a single row, best first. Ties keep ascending id
    /// order. Returns `None` when the row has no candidates at all.
    pub fn neighbors_of(
        &self,
        features: &SparseMatrix,
        index: &InvertedIndex,
        row: u32,
    ) -> Option<Vec<(u32, f64)>> {
        let own = features.row(row as usize);
        let candidates = index.candidates(&own, row);
        if candidates.is_empty() {
            return None;
        }

        let mut scored: Vec<(u32, f64)> = candidates
            .into_iter()
            .map(|j| (j, cosine(&own, &features.row(j as usize)).min(1.0)))
            .filter(|&(_, s)| s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.k);
        Some(scored)
    }

    /// Directed k-NN matrix with self-loops, before symmetrization
    pub fn directed(
        &self,
        features: &SparseMatrix,
        index: &InvertedIndex,
    ) -> Result<(SparseMatrix, GraphBuildStats)> {
        let n = features.rows();
        let triplets = Mutex::new(Vec::with_capacity(n * (self.k.min(64) + 1)));
        let featureless = AtomicUsize::new(0);
        let non_positive = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);

        (0..n as u32).into_par_iter().for_each(|i| {
            let mut local = vec![Triplet::new(i, i, 1.0)];
            match self.neighbors_of(features, index, i) {
                None => {
                    featureless.fetch_add(1, Ordering::Relaxed);
                }
                Some(neighbors) if neighbors.is_empty() => {
                    non_positive.fetch_add(1, Ordering::Relaxed);
                }
                Some(neighbors) => {
                    local.extend(neighbors.into_iter().map(|(j, s)| Triplet::new(i, j, s)));
                }
            }
            triplets
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(local);

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % PROGRESS_STRIDE == 0 || finished == n {
                if let Some(ref callback) = self.progress_callback {
                    callback(finished, n);
                }
            }
        });

        let triplets = triplets.into_inner().unwrap_or_else(|e| e.into_inner());
        let matrix = SparseMatrix::from_triplets(n, n, triplets)?;
        let stats = GraphBuildStats {
            rows: n,
            featureless: featureless.into_inner(),
            non_positive: non_positive.into_inner(),
            directed_nnz: matrix.nnz(),
            symmetric_nnz: 0,
        };
        Ok((matrix, stats))
    }

    /// Directed k-NN, symmetrized and row-normalized
    pub fn build(
        &self,
        features: &SparseMatrix,
        index: &InvertedIndex,
    ) -> Result<(SimilarityGraph, GraphBuildStats)> {
        info!("Building {}-NN graph over {} phrases", self.k, features.rows());
        let (directed, mut stats) = self.directed(features, index)?;
        let mut sim = symmetrize(&directed)?;
        stats.symmetric_nnz = sim.nnz();
        row_normalize(&mut sim)?;

        info!(
            "Graph: {} phrases, {} featureless, {} with only non-positive candidates",
            stats.rows, stats.featureless, stats.non_positive
        );
        debug!(
            "NNZ before symmetrization {}, after {}",
            stats.directed_nnz, stats.symmetric_nnz
        );
        Ok((SimilarityGraph { matrix: sim }, stats))
    }
}

/// `0.5 * (m + m^T)`
pub fn symmetrize(m: &SparseMatrix) -> Result<SparseMatrix> {
    let mut sym = m.add(&m.transpose())?;
    sym.scale(0.5);
    Ok(sym)
}

/// Scale each row to sum to 1; empty rows stay empty
pub fn row_normalize(m: &mut SparseMatrix) -> Result<()> {
    let factors: Vec<f64> = m
        .row_sums()
        .into_iter()
        .map(|s| if s > 0.0 { 1.0 / s } else { 0.0 })
        .collect();
    m.scale_rows(&factors)
}

/// Summary of a graph's shape, relative to a phrase registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphAnalysis {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    /// Phrase with the most neighbors and its neighbor count
    pub max_degree: Option<(u32, usize)>,
    /// Labeled phrases whose only edge is the self-loop
    pub disconnected_labeled: usize,
    pub disconnected_unlabeled: usize,
}

/// Precomputed random-walk similarity matrix over phrase ids
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityGraph {
    matrix: SparseMatrix,
}

impl SimilarityGraph {
    /// Wrap an existing square matrix, e.g. one loaded from disk
    pub fn from_matrix(matrix: SparseMatrix) -> Result<Self> {
        if matrix.rows() != matrix.cols() {
            return Err(PropError::DimensionMismatch(format!(
                "similarity matrix must be square, got {}x{}",
                matrix.rows(),
                matrix.cols()
            )));
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.matrix.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.rows() == 0
    }

    #[inline]
    pub fn weight(&self, a: u32, b: u32) -> f64 {
        self.matrix.coeff(a as usize, b as usize)
    }

    /// Neighbors of `id` with positive weight, self excluded
    pub fn neighbors(&self, id: u32) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.matrix
            .row(id as usize)
            .iter()
            .filter(move |&(j, w)| j != id && w > 0.0)
    }

    pub fn has_neighbors(&self, id: u32) -> bool {
        self.neighbors(id).next().is_some()
    }

    pub fn degree(&self, id: u32) -> usize {
        self.neighbors(id).count()
    }

    pub fn analyze(&self, registry: &PhraseRegistry) -> GraphAnalysis {
        let mut analysis = GraphAnalysis {
            rows: self.matrix.rows(),
            cols: self.matrix.cols(),
            nnz: self.matrix.nnz(),
            ..Default::default()
        };
        for id in 0..self.len() as u32 {
            let degree = self.degree(id);
            if analysis.max_degree.is_none_or(|(_, best)| degree > best) {
                analysis.max_degree = Some((id, degree));
            }
            if degree == 0 {
                let labeled = registry.phrase(id).is_some_and(|p| p.is_labeled());
                if labeled {
                    analysis.disconnected_labeled += 1;
                } else {
                    analysis.disconnected_unlabeled += 1;
                }
            }
        }
        analysis
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_market(&self.matrix, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_matrix(read_market(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    /// Rows share feature 0 and each carries a private feature with a
    /// growing weight, so similarity to row 0 drops with the row number.
    fn star(n: u32) -> (SparseMatrix, InvertedIndex) {
        let mut triplets = Vec::new();
        let mut index = InvertedIndex::new();
        for i in 0..n {
            triplets.push(Triplet::new(i, 0, 1.0));
            triplets.push(Triplet::new(i, i + 1, i as f64 * 0.5));
            index.insert(0, i);
        }
        let m = SparseMatrix::from_triplets(n as usize, n as usize + 1, triplets).unwrap();
        (m, index)
    }

    #[test]
    fn test_neighbor_cap() {
        let (features, index) = star(11);
        let (directed, stats) = KnnBuilder::new(3).directed(&features, &index).unwrap();
        let row = directed.row(0);
        assert_eq!(row.nnz(), 4);
        assert_eq!(row.get(0), Some(1.0));
        // Highest similarity to row 0 comes from rows with the smallest private weight
        let kept: Vec<u32> = row.indices().iter().copied().filter(|&j| j != 0).collect();
        assert_eq!(kept, vec![1, 2, 3]);
        assert_eq!(stats.featureless, 0);
        assert_eq!(stats.non_positive, 0);
    }

    #[test]
    fn test_row_stochastic_and_symmetric() {
        let (features, index) = star(6);
        let builder = KnnBuilder::new(2);
        let (directed, _) = builder.directed(&features, &index).unwrap();
        let sym = symmetrize(&directed).unwrap();
        for t in sym.triplets() {
            assert!(approx_eq(t.value, sym.coeff(t.col as usize, t.row as usize)));
        }

        let (graph, stats) = builder.build(&features, &index).unwrap();
        assert_eq!(stats.symmetric_nnz, sym.nnz());
        for s in graph.matrix().row_sums() {
            assert!(approx_eq(s, 1.0));
        }
    }

    #[test]
    fn test_retained_similarities_in_unit_interval() {
        let (features, index) = star(8);
        let builder = KnnBuilder::new(4);
        for i in 0..8 {
            for (_, s) in builder.neighbors_of(&features, &index, i).unwrap() {
                assert!(s > 0.0 && s <= 1.0);
            }
        }
    }

    #[test]
    fn test_non_positive_and_featureless_rows() {
        // Row 0 and 1 share feature 0 but point in opposite directions;
        // row 2 has no indexed feature.
        let features = SparseMatrix::from_triplets(
            3,
            2,
            vec![
                Triplet::new(0, 0, 1.0),
                Triplet::new(1, 0, -1.0),
                Triplet::new(2, 1, 1.0),
            ],
        )
        .unwrap();
        let mut index = InvertedIndex::new();
        index.insert(0, 0);
        index.insert(0, 1);

        let (graph, stats) = KnnBuilder::new(5).build(&features, &index).unwrap();
        assert_eq!(stats.featureless, 1);
        assert_eq!(stats.non_positive, 2);
        for id in 0..3 {
            assert!(!graph.has_neighbors(id));
            assert!(approx_eq(graph.weight(id, id), 1.0));
        }
    }

    #[test]
    fn test_analyze() {
        let (features, index) = star(4);
        let (graph, _) = KnnBuilder::new(1).build(&features, &index).unwrap();
        let mut reg = PhraseRegistry::new();
        for p in ["a", "b", "c", "d", "e"] {
            reg.add_phrase(p, p == "a");
        }
        let analysis = graph.analyze(&reg);
        assert_eq!(analysis.rows, 4);
        assert_eq!(analysis.nnz, graph.matrix().nnz());
        let (_, best) = analysis.max_degree.unwrap();
        assert!(best >= 1);
        assert_eq!(analysis.disconnected_labeled + analysis.disconnected_unlabeled, 0);
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sim.mtx");
        let (features, index) = star(5);
        let (graph, _) = KnnBuilder::new(2).build(&features, &index).unwrap();
        graph.save(&path).unwrap();
        assert_eq!(SimilarityGraph::load(&path).unwrap(), graph);
    }

    #[test]
    fn test_non_square_rejected() {
        let err = SimilarityGraph::from_matrix(SparseMatrix::zeros(2, 3)).unwrap_err();
        assert!(matches!(err, PropError::DimensionMismatch(_)));
    }
}
