//! Count pruning and PMI reweighting of a phrase x feature matrix

use tracing::debug;

use crate::error::Result;
use crate::sparse::SparseMatrix;

/// Drop entries whose count is below `min_count`. Returns how many went.
pub fn prune_by_count(matrix: &mut SparseMatrix, min_count: f64) -> usize {
    let before = matrix.nnz();
    matrix.retain(|_, _, v| v >= min_count);
    let removed = before - matrix.nnz();
    debug!("Pruned {} entries below count {}", removed, min_count);
    removed
}

/// Replace counts `c(p,f)` with `ln(c(p,f) / rowSum(p) / (colSum(f) / total))`.
///
/// Done as `ln(diag(1/rowSum) * C * diag(total/colSum))`; the marginals are
/// taken from the counts before either scaling. Non-positive entries are
/// dropped first so every stored value has a finite logarithm.
pub fn rescale_to_pmi(matrix: &mut SparseMatrix) -> Result<()> {
    matrix.retain(|_, _, v| v > 0.0);
    if matrix.nnz() == 0 {
        return Ok(());
    }

    let row_sums = matrix.row_sums();
    let col_sums = matrix.col_sums();
    let total = matrix.sum();

    let row_factors: Vec<f64> = row_sums
        .iter()
        .map(|&s| if s > 0.0 { 1.0 / s } else { 0.0 })
        .collect();
    let col_factors: Vec<f64> = col_sums
        .iter()
        .map(|&s| if s > 0.0 { total / s } else { 0.0 })
        .collect();

    matrix.scale_rows(&row_factors)?;
    matrix.scale_cols(&col_factors)?;
    matrix.map_values(f64::ln);
    Ok(())
}
