//! # Sparse expression matrix helpers
//!
//! Expression matrices are `sprs::CsMat<f64>` with cells as rows and genes as columns.
//! Raw counts are kept as `f64` in memory so that integrality can be checked before
//! values are cast to the store's layer types.
//!
//! Every helper here is storage agnostic: it accepts CSR or CSC input and iterates
//! stored entries as `(value, (row, col))`.

use sprs::{CsMat, TriMat};

#[cfg(test)]
mod tests;

/// Default library size used by [`normalize`].
pub const DEFAULT_TARGET_SUM: f64 = 10_000.0;

/// Storage order for rebuilt matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Compressed sparse row
    Csr,
    /// Compressed sparse column
    Csc,
}

/// Build a matrix from coordinate triplets. Duplicate coordinates are summed.
pub fn from_triplets<I>(shape: (usize, usize), entries: I, storage: Compression) -> CsMat<f64>
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new(shape);
    for (row, col, value) in entries {
        tri.add_triplet(row, col, value);
    }
    match storage {
        Compression::Csr => tri.to_csr(),
        Compression::Csc => tri.to_csc(),
    }
}

/// Copy of `matrix` in the requested storage order.
pub fn with_storage(matrix: &CsMat<f64>, storage: Compression) -> CsMat<f64> {
    from_triplets(
        matrix.shape(),
        matrix.iter().map(|(&v, (r, c))| (r, c, v)),
        storage,
    )
}

/// Copy of a dense row-major buffer as CSR, dropping zeros.
pub fn from_dense(rows: usize, cols: usize, values: &[f64]) -> CsMat<f64> {
    let entries = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(i, &v)| (i / cols.max(1), i % cols.max(1), v));
    from_triplets((rows, cols), entries, Compression::Csr)
}

/// Sum of stored values per row.
pub fn row_sums(matrix: &CsMat<f64>) -> Vec<f64> {
    let mut sums = vec![0.0; matrix.rows()];
    for (&value, (row, _)) in matrix.iter() {
        sums[row] += value;
    }
    sums
}

/// Number of nonzero values per row.
pub fn row_nnz(matrix: &CsMat<f64>) -> Vec<usize> {
    let mut counts = vec![0usize; matrix.rows()];
    for (&value, (row, _)) in matrix.iter() {
        if value != 0.0 {
            counts[row] += 1;
        }
    }
    counts
}

/// Per-row sum restricted to the columns where `mask` is true.
pub fn masked_row_sums(matrix: &CsMat<f64>, mask: &[bool]) -> Vec<f64> {
    let mut sums = vec![0.0; matrix.rows()];
    for (&value, (row, col)) in matrix.iter() {
        if mask.get(col).copied().unwrap_or(false) {
            sums[row] += value;
        }
    }
    sums
}

/// Total fractional part of stored values; zero for strictly integer data.
pub fn fractional_sum(matrix: &CsMat<f64>) -> f64 {
    matrix
        .data()
        .iter()
        .map(|v| (v - v.trunc()).abs())
        .sum()
}

/// Number of stored values below zero.
pub fn negative_count(matrix: &CsMat<f64>) -> usize {
    matrix.data().iter().filter(|v| **v < 0.0).count()
}

/// Number of stored NaN or infinite values.
pub fn non_finite_count(matrix: &CsMat<f64>) -> usize {
    matrix.data().iter().filter(|v| !v.is_finite()).count()
}

/// Keep only the listed columns, renumbered in the order given. Output is CSR.
pub fn select_columns(matrix: &CsMat<f64>, keep: &[usize]) -> CsMat<f64> {
    let mut remap = vec![None; matrix.cols()];
    for (new_col, &old_col) in keep.iter().enumerate() {
        if let Some(slot) = remap.get_mut(old_col) {
            *slot = Some(new_col);
        }
    }
    let entries = matrix
        .iter()
        .filter_map(|(&v, (r, c))| remap[c].map(|new_col| (r, new_col, v)));
    from_triplets((matrix.rows(), keep.len()), entries, Compression::Csr)
}

/// Library-size normalization followed by `ln(1 + x)`.
///
/// Each row is scaled so that it sums to `target_sum`. Rows summing to zero stay
/// empty. The result is CSR with no explicit zeros.
pub fn normalize(matrix: &CsMat<f64>, target_sum: f64) -> CsMat<f64> {
    let sums = row_sums(matrix);
    let entries = matrix.iter().filter_map(|(&value, (row, col))| {
        let total = sums[row];
        if total == 0.0 || value == 0.0 {
            return None;
        }
        let scaled = value * (1.0 / total) * target_sum;
        let logged = scaled.ln_1p();
        (logged != 0.0).then_some((row, col, logged))
    });
    from_triplets(matrix.shape(), entries, Compression::Csr)
}

/// Stored entries as parallel coordinate vectors in storage order.
pub fn to_coordinates(matrix: &CsMat<f64>) -> (Vec<i64>, Vec<i64>, Vec<f64>) {
    let nnz = matrix.nnz();
    let mut rows = Vec::with_capacity(nnz);
    let mut cols = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    for (&value, (row, col)) in matrix.iter() {
        rows.push(row as i64);
        cols.push(col as i64);
        values.push(value);
    }
    (rows, cols, values)
}
