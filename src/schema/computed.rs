//! Computed obs columns.
//!
//! Each computed column is produced by a pure function of the primary count matrix
//! (cells x genes) and the gene names of its columns. Functions are registered by name
//! in a [`ComputedColumns`] registry that is injected into the schema at construction.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use sprs::CsMat;

use crate::matrix;

/// Inputs available to a computed-column function.
pub struct ComputeInput<'a> {
    /// Primary count matrix, cells x genes, CSR
    pub matrix: &'a CsMat<f64>,
    /// Gene name of every matrix column
    pub genes: &'a [String],
}

/// Signature of a computed-column function: one value per cell.
pub type ComputedColumnFn = fn(&ComputeInput<'_>) -> Vec<f64>;

/// Name -> function registry for computed obs columns.
#[derive(Clone)]
pub struct ComputedColumns {
    functions: BTreeMap<String, ComputedColumnFn>,
}

impl ComputedColumns {
    /// Registry with no functions.
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Registry with the built-in quality metrics.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("nnz", compute_nnz);
        registry.register("umi_counts", compute_umi_counts);
        registry.register("pct_mito", compute_pct_mito);
        registry.register("pct_ribo", compute_pct_ribo);
        registry
    }

    /// Register (or replace) a function under `name`.
    pub fn register(&mut self, name: impl Into<String>, function: ComputedColumnFn) {
        self.functions.insert(name.into(), function);
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<ComputedColumnFn> {
        self.functions.get(name).copied()
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for ComputedColumns {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ComputedColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

/// Number of nonzero entries per cell.
pub fn compute_nnz(input: &ComputeInput<'_>) -> Vec<f64> {
    matrix::row_nnz(input.matrix)
        .into_iter()
        .map(|n| n as f64)
        .collect()
}

/// Total counts per cell.
pub fn compute_umi_counts(input: &ComputeInput<'_>) -> Vec<f64> {
    matrix::row_sums(input.matrix)
}

/// Percentage of counts in mitochondrial genes (`MT-` prefix).
pub fn compute_pct_mito(input: &ComputeInput<'_>) -> Vec<f64> {
    percent_of_counts(input, "pct_mito", |gene| gene.starts_with("MT-"))
}

/// Percentage of counts in ribosomal protein genes (`RPS`/`RPL` prefixes).
pub fn compute_pct_ribo(input: &ComputeInput<'_>) -> Vec<f64> {
    percent_of_counts(input, "pct_ribo", |gene| {
        gene.starts_with("RPS") || gene.starts_with("RPL")
    })
}

/// 100 * (counts in selected genes) / (total counts). Cells with zero total count get 0.
fn percent_of_counts(
    input: &ComputeInput<'_>,
    column: &str,
    select: impl Fn(&str) -> bool,
) -> Vec<f64> {
    let mask: Vec<bool> = input.genes.iter().map(|g| select(g)).collect();
    let selected = matrix::masked_row_sums(input.matrix, &mask);
    let totals = matrix::row_sums(input.matrix);

    let mut zero_count_cells = 0usize;
    let values = selected
        .iter()
        .zip(&totals)
        .map(|(&part, &total)| {
            if total == 0.0 {
                zero_count_cells += 1;
                0.0
            } else {
                100.0 * part / total
            }
        })
        .collect();

    if zero_count_cells > 0 {
        warn!(
            "{}: {} cell(s) with zero total counts, reported as 0",
            column, zero_count_cells
        );
    }
    values
}
