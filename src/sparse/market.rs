//! Matrix Market coordinate format
//!
//! ```text
//! %%MatrixMarket matrix coordinate real general
//! % optional comments
//! <rows> <cols> <nnz>
//! <row> <col> <value>     (1-indexed)
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::{SparseMatrix, Triplet};
use crate::error::{PropError, Result};

const BANNER: &str = "%%MatrixMarket matrix coordinate real general";
const MAX_RESERVE: usize = 1 << 24;

/// Write `matrix` to `path` in coordinate format
pub fn write_market(matrix: &SparseMatrix, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PropError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let io_err = |e: std::io::Error| PropError::io(path, e);

    writeln!(out, "{}", BANNER).map_err(io_err)?;
    writeln!(out, "{} {} {}", matrix.rows(), matrix.cols(), matrix.nnz()).map_err(io_err)?;
    for t in matrix.triplets() {
        writeln!(out, "{} {} {}", t.row + 1, t.col + 1, t.value).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    debug!(
        "Wrote {}x{} matrix ({} nnz) to {}",
        matrix.rows(),
        matrix.cols(),
        matrix.nnz(),
        path.display()
    );
    Ok(())
}

/// Read a coordinate-format matrix from `path`
pub fn read_market(path: &Path) -> Result<SparseMatrix> {
    let file = File::open(path).map_err(|e| PropError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut shape: Option<(usize, usize, usize)> = None;
    let mut triplets: Vec<Triplet> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| PropError::io(path, e))?;
        let line = line.trim();
        if line_no == 1 {
            check_banner(line).map_err(|msg| PropError::parse(path, line_no, msg))?;
            continue;
        }
        if line.is_empty() || line.starts_with('%') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        match shape {
            None => {
                let [rows, cols, nnz] = parse_header(&fields)
                    .ok_or_else(|| PropError::parse(path, line_no, "expected '<rows> <cols> <nnz>'"))?;
                // The header may lie; don't let it size the allocation
                triplets.reserve(nnz.min(rows.saturating_mul(cols)).min(MAX_RESERVE));
                shape = Some((rows, cols, nnz));
            }
            Some((rows, cols, _)) => {
                let (row, col, value) = parse_entry(&fields)
                    .ok_or_else(|| PropError::parse(path, line_no, "expected '<row> <col> <value>'"))?;
                if row == 0 || col == 0 || row > rows || col > cols {
                    return Err(PropError::parse(
                        path,
                        line_no,
                        format!("entry ({}, {}) outside a {}x{} matrix", row, col, rows, cols),
                    ));
                }
                triplets.push(Triplet::new((row - 1) as u32, (col - 1) as u32, value));
            }
        }
    }

    let (rows, cols, nnz) = shape.ok_or_else(|| PropError::parse(path, 0, "missing size header"))?;
    if triplets.len() != nnz {
        debug!(
            "{} declares {} entries but contains {}",
            path.display(),
            nnz,
            triplets.len()
        );
    }

    SparseMatrix::from_triplets(rows, cols, triplets)
}

/// Only the layout written by [`write_market`] is accepted. Symmetric or
/// pattern files would load silently wrong.
fn check_banner(line: &str) -> std::result::Result<(), String> {
    let words: Vec<String> = line.split_whitespace().map(|w| w.to_ascii_lowercase()).collect();
    match words.as_slice() {
        [head, object, format, field, symmetry]
            if head == "%%matrixmarket"
                && object == "matrix"
                && format == "coordinate"
                && field == "real"
                && symmetry == "general" =>
        {
            Ok(())
        }
        [head, ..] if head == "%%matrixmarket" => Err(format!(
            "unsupported matrix type '{}', expected '{}'",
            line, BANNER
        )),
        _ => Err(format!("missing banner, expected '{}'", BANNER)),
    }
}

fn parse_header(fields: &[&str]) -> Option<[usize; 3]> {
    if fields.len() != 3 {
        return None;
    }
    Some([
        fields[0].parse().ok()?,
        fields[1].parse().ok()?,
        fields[2].parse().ok()?,
    ])
}

fn parse_entry(fields: &[&str]) -> Option<(usize, usize, f64)> {
    if fields.len() != 3 {
        return None;
    }
    Some((
        fields[0].parse().ok()?,
        fields[1].parse().ok()?,
        fields[2].parse().ok()?,
    ))
}
