//! Compressed sparse row matrix
//!
//! The feature matrix and the similarity graph are both stored as row-major
//! CSR matrices of `f64`. Only the operations the pipeline needs are
//! implemented: triplet assembly with duplicate summation, row views with
//! sparse dot products, diagonal rescaling on either side, transpose,
//! addition and in-place value maps. No operation ever materializes a dense
//! intermediate.

pub mod market;

pub use market::{read_market, write_market};

use rayon::prelude::*;

use crate::error::{PropError, Result};

/// A single (row, column, value) entry used to assemble a matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: u32,
    pub col: u32,
    pub value: f64,
}

impl Triplet {
    #[inline]
    pub fn new(row: u32, col: u32, value: f64) -> Self {
        Self { row, col, value }
    }
}

/// Row-major sparse matrix with sorted column indices per row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    /// Offsets into `indices`/`values`, one per row plus a terminator
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// An all-zero matrix of the given shape
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            indptr: vec![0; rows + 1],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Diagonal matrix with `diag` on its main diagonal
    pub fn diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        Self {
            rows: n,
            cols: n,
            indptr: (0..=n).collect(),
            indices: (0..n as u32).collect(),
            values: diag.to_vec(),
        }
    }

    /// Assemble a matrix from triplets. Duplicate (row, col) entries are
    /// summed, which is how repeated co-occurrences become counts.
    ///
    /// The sort is stable so duplicate summation happens in insertion order
    /// and the result is reproducible.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<Triplet>) -> Result<Self> {
        if let Some(t) = triplets
            .iter()
            .find(|t| t.row as usize >= rows || t.col as usize >= cols)
        {
            return Err(PropError::DimensionMismatch(format!(
                "entry ({}, {}) outside a {}x{} matrix",
                t.row, t.col, rows, cols
            )));
        }

        triplets.par_sort_by_key(|t| (t.row, t.col));

        let mut indptr = vec![0usize; rows + 1];
        let mut indices: Vec<u32> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(u32, u32)> = None;

        for t in triplets {
            if last == Some((t.row, t.col)) {
                if let Some(v) = values.last_mut() {
                    *v += t.value;
                }
                continue;
            }
            indices.push(t.col);
            values.push(t.value);
            indptr[t.row as usize + 1] += 1;
            last = Some((t.row, t.col));
        }

        for i in 0..rows {
            indptr[i + 1] += indptr[i];
        }

        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
            values,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// View of row `i`. Rows outside the matrix are empty.
    #[inline]
    pub fn row(&self, i: usize) -> SparseRow<'_> {
        if i >= self.rows {
            return SparseRow {
                indices: &[],
                values: &[],
            };
        }
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        SparseRow {
            indices: &self.indices[start..end],
            values: &self.values[start..end],
        }
    }

    /// Stored entries in row `i`
    #[inline]
    pub fn row_nnz(&self, i: usize) -> usize {
        self.row(i).nnz()
    }

    /// Value at (i, j), zero when not stored
    pub fn coeff(&self, i: usize, j: usize) -> f64 {
        self.row(i).get(j as u32).unwrap_or(0.0)
    }

    /// Sum of each row
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.row(i).sum()).collect()
    }

    /// Sum of each column
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for (&col, &v) in self.indices.iter().zip(&self.values) {
            sums[col as usize] += v;
        }
        sums
    }

    /// Sum of all entries
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Left-multiply by `diag(factors)`: row `i` is scaled by `factors[i]`
    pub fn scale_rows(&mut self, factors: &[f64]) -> Result<()> {
        if factors.len() != self.rows {
            return Err(PropError::DimensionMismatch(format!(
                "{} row factors for {} rows",
                factors.len(),
                self.rows
            )));
        }
        for (i, &f) in factors.iter().enumerate() {
            let (start, end) = (self.indptr[i], self.indptr[i + 1]);
            for v in &mut self.values[start..end] {
                *v *= f;
            }
        }
        Ok(())
    }

    /// Right-multiply by `diag(factors)`: column `j` is scaled by `factors[j]`
    pub fn scale_cols(&mut self, factors: &[f64]) -> Result<()> {
        if factors.len() != self.cols {
            return Err(PropError::DimensionMismatch(format!(
                "{} column factors for {} columns",
                factors.len(),
                self.cols
            )));
        }
        for (v, &col) in self.values.iter_mut().zip(&self.indices) {
            *v *= factors[col as usize];
        }
        Ok(())
    }

    /// Multiply every stored entry by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.values.par_iter_mut().for_each(|v| *v *= factor);
    }

    /// Apply `f` to every stored entry. Implicit zeros are never visited.
    pub fn map_values<F>(&mut self, f: F)
    where
        F: Fn(f64) -> f64 + Sync,
    {
        self.values.par_iter_mut().for_each(|v| *v = f(*v));
    }

    /// Drop stored entries for which `keep` is false and compact storage
    pub fn retain<F>(&mut self, keep: F)
    where
        F: Fn(usize, u32, f64) -> bool,
    {
        let mut indptr = vec![0usize; self.rows + 1];
        let mut indices = Vec::with_capacity(self.indices.len());
        let mut values = Vec::with_capacity(self.values.len());
        for i in 0..self.rows {
            let row = self.row(i);
            for (col, v) in row.iter() {
                if keep(i, col, v) {
                    indices.push(col);
                    values.push(v);
                }
            }
            indptr[i + 1] = indices.len();
        }
        self.indptr = indptr;
        self.indices = indices;
        self.values = values;
    }

    pub fn transpose(&self) -> SparseMatrix {
        let mut counts = vec![0usize; self.cols + 1];
        for &col in &self.indices {
            counts[col as usize + 1] += 1;
        }
        for j in 0..self.cols {
            counts[j + 1] += counts[j];
        }

        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0u32; self.nnz()];
        let mut values = vec![0.0; self.nnz()];

        // Rows are visited in order, so each transposed row comes out sorted
        for i in 0..self.rows {
            for (col, v) in self.row(i).iter() {
                let slot = next[col as usize];
                indices[slot] = i as u32;
                values[slot] = v;
                next[col as usize] += 1;
            }
        }

        SparseMatrix {
            rows: self.cols,
            cols: self.rows,
            indptr,
            indices,
            values,
        }
    }

    /// Element-wise sum of two matrices of the same shape
    pub fn add(&self, other: &SparseMatrix) -> Result<SparseMatrix> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(PropError::DimensionMismatch(format!(
                "cannot add {}x{} and {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }

        let mut indptr = vec![0usize; self.rows + 1];
        let mut indices = Vec::with_capacity(self.nnz() + other.nnz());
        let mut values = Vec::with_capacity(self.nnz() + other.nnz());

        for i in 0..self.rows {
            let (a, b) = (self.row(i), other.row(i));
            let (mut p, mut q) = (0, 0);
            while p < a.indices.len() || q < b.indices.len() {
                let take_a = q >= b.indices.len()
                    || (p < a.indices.len() && a.indices[p] < b.indices[q]);
                let take_b = p >= a.indices.len()
                    || (q < b.indices.len() && b.indices[q] < a.indices[p]);
                if take_a {
                    indices.push(a.indices[p]);
                    values.push(a.values[p]);
                    p += 1;
                } else if take_b {
                    indices.push(b.indices[q]);
                    values.push(b.values[q]);
                    q += 1;
                } else {
                    indices.push(a.indices[p]);
                    values.push(a.values[p] + b.values[q]);
                    p += 1;
                    q += 1;
                }
            }
            indptr[i + 1] = indices.len();
        }

        Ok(SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            indptr,
            indices,
            values,
        })
    }

    /// All stored entries as triplets, in row-major order
    pub fn triplets(&self) -> impl Iterator<Item = Triplet> + '_ {
        (0..self.rows).flat_map(move |i| {
            self.row(i)
                .iter()
                .map(move |(col, v)| Triplet::new(i as u32, col, v))
        })
    }
}

/// Borrowed view of one matrix row
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    indices: &'a [u32],
    values: &'a [f64],
}

impl<'a> SparseRow<'a> {
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn indices(&self) -> &'a [u32] {
        self.indices
    }

    #[inline]
    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + 'a {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn get(&self, col: u32) -> Option<f64> {
        self.indices
            .binary_search(&col)
            .ok()
            .map(|pos| self.values[pos])
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sparse dot product (merge over sorted indices)
    pub fn dot(&self, other: &SparseRow<'_>) -> f64 {
        let (mut p, mut q) = (0, 0);
        let mut acc = 0.0;
        while p < self.indices.len() && q < other.indices.len() {
            match self.indices[p].cmp(&other.indices[q]) {
                std::cmp::Ordering::Less => p += 1,
                std::cmp::Ordering::Greater => q += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.values[p] * other.values[q];
                    p += 1;
                    q += 1;
                }
            }
        }
        acc
    }

    /// Euclidean norm
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

/// Cosine similarity of two sparse rows.
///
/// A zero-norm row has no direction, so the similarity is 0 rather than NaN.
pub fn cosine(a: &SparseRow<'_>, b: &SparseRow<'_>) -> f64 {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(b) / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn sample() -> SparseMatrix {
        // [1 0 2]
        // [0 0 0]
        // [3 4 0]
        SparseMatrix::from_triplets(
            3,
            3,
            vec![
                Triplet::new(2, 1, 4.0),
                Triplet::new(0, 2, 2.0),
                Triplet::new(0, 0, 1.0),
                Triplet::new(2, 0, 3.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_triplets_sorts_and_sums_duplicates() {
        let m = SparseMatrix::from_triplets(
            2,
            2,
            vec![
                Triplet::new(1, 1, 1.0),
                Triplet::new(0, 1, 1.0),
                Triplet::new(1, 1, 1.0),
                Triplet::new(1, 1, 1.0),
            ],
        )
        .unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.coeff(1, 1), 3.0);
        assert_eq!(m.coeff(0, 1), 1.0);
        assert_eq!(m.coeff(0, 0), 0.0);
    }

    #[test]
    fn test_from_triplets_out_of_bounds() {
        let err = SparseMatrix::from_triplets(2, 2, vec![Triplet::new(2, 0, 1.0)]);
        assert!(matches!(err, Err(PropError::DimensionMismatch(_))));
    }

    #[test]
    fn test_row_and_col_sums() {
        let m = sample();
        assert_eq!(m.row_sums(), vec![3.0, 0.0, 7.0]);
        assert_eq!(m.col_sums(), vec![4.0, 4.0, 2.0]);
        assert_eq!(m.sum(), 10.0);
    }

    #[test]
    fn test_transpose() {
        let m = sample();
        let t = m.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.coeff(i, j), t.coeff(j, i));
            }
        }
        // Columns in each transposed row stay sorted
        assert_eq!(t.row(0).indices(), &[0, 2]);
    }

    #[test]
    fn test_add_merges_rows() {
        let m = sample();
        let sum = m.add(&m.transpose()).unwrap();
        assert_eq!(sum.coeff(0, 2), 2.0);
        assert_eq!(sum.coeff(2, 0), 5.0);
        assert_eq!(sum.coeff(0, 0), 2.0);
        assert_eq!(sum.coeff(1, 2), 4.0);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = SparseMatrix::zeros(2, 3);
        let b = SparseMatrix::zeros(3, 2);
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn test_diagonal_scaling() {
        let mut m = sample();
        m.scale_rows(&[0.5, 1.0, 2.0]).unwrap();
        assert_eq!(m.coeff(0, 2), 1.0);
        assert_eq!(m.coeff(2, 1), 8.0);
        m.scale_cols(&[1.0, 0.5, 1.0]).unwrap();
        assert_eq!(m.coeff(2, 1), 4.0);
        assert!(m.scale_rows(&[1.0]).is_err());
    }

    #[test]
    fn test_retain_compacts() {
        let mut m = sample();
        m.retain(|_, _, v| v >= 3.0);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.row_nnz(0), 0);
        assert_eq!(m.coeff(2, 0), 3.0);
    }

    #[test]
    fn test_dot_and_cosine() {
        let m = sample();
        assert!(approx_eq(m.row(0).dot(&m.row(2)), 3.0));
        let expected = 3.0 / (5.0f64.sqrt() * 5.0);
        assert!(approx_eq(cosine(&m.row(0), &m.row(2)), expected));
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let m = sample();
        let c = cosine(&m.row(0), &m.row(1));
        assert_eq!(c, 0.0);
        assert!(!c.is_nan());
    }

    #[test]
    fn test_row_outside_matrix_is_empty() {
        let m = sample();
        assert!(m.row(10).is_empty());
        assert_eq!(m.coeff(10, 0), 0.0);
    }
}
