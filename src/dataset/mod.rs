//! # Datasets
//!
//! A [`RawDataset`] is one input unit as produced by a collector: an expression
//! matrix (cells x genes), an obs table with one row per cell and a var table with one
//! row per gene. The [`Standardizer`] turns it into a [`CellDataset`]:
//!
//! 1. [`Standardizer::validate`] checks every schema rule and either returns a
//!    validated dataset or a [`SchemaValidationError`] listing every violation.
//! 2. [`Standardizer::standardize`] reshapes obs/var to the schema's columns and types,
//!    filters genes to the core universe, computes derived obs columns and builds the
//!    configured expression layers.
//!
//! Standardized datasets are written to intermediate unit files (see [`container`])
//! and read back by the ingestion stage.
//!
//! ## Unit File Format
//!
//! ```text
//! {group}-{unit}.scunit (ZIP archive)
//! ├── mimetype                  # "application/vnd.scatlas.unit" (uncompressed, first entry)
//! ├── manifest.json             # Shape, layers, samples, provenance
//! ├── obs.parquet
//! ├── var.parquet
//! ├── X.parquet                 # Primary matrix as coordinates
//! ├── raw/X.parquet             # Optional raw slot (input files only)
//! └── layers/{name}.parquet     # One per expression layer
//! ```

pub mod columns;
pub mod container;
mod error;
mod report;
mod standardize;
mod validate;

#[cfg(test)]
mod tests;

pub use container::{
    read_unit_file, read_unit_manifest, write_raw_unit_file, write_unit_file, UnitFile,
    UnitManifest, UnitSource, UNIT_FILE_EXTENSION,
};
pub use error::{ContainerError, SchemaValidationError, StandardizeError};
pub use report::{CheckStatus, ValidationCheck, ValidationReport};
pub use standardize::Standardizer;

use std::collections::BTreeMap;

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use sprs::CsMat;

/// An expression matrix as supplied by a collector.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionMatrix {
    /// Compressed sparse matrix (CSR or CSC)
    Sparse(CsMat<f64>),
    /// Dense row-major matrix
    Dense {
        /// Number of cells
        rows: usize,
        /// Number of genes
        cols: usize,
        /// Row-major values
        values: Vec<f64>,
    },
}

impl ExpressionMatrix {
    /// `(cells, genes)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Sparse(m) => m.shape(),
            Self::Dense { rows, cols, .. } => (*rows, *cols),
        }
    }

    /// True for compressed sparse storage.
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }
}

impl From<CsMat<f64>> for ExpressionMatrix {
    fn from(matrix: CsMat<f64>) -> Self {
        Self::Sparse(matrix)
    }
}

/// One unvalidated input dataset.
#[derive(Debug, Clone)]
pub struct RawDataset {
    /// Per-cell metadata, one row per matrix row
    pub obs: RecordBatch,
    /// Per-gene metadata, one row per matrix column
    pub var: RecordBatch,
    /// Primary (possibly processed) matrix
    pub x: Option<ExpressionMatrix>,
    /// Raw counts, preferred over `x` when present
    pub raw_x: Option<ExpressionMatrix>,
    /// Auxiliary layers; discarded by standardization
    pub layers: BTreeMap<String, CsMat<f64>>,
}

impl RawDataset {
    /// Dataset with a primary matrix and no raw slot or layers.
    pub fn new(obs: RecordBatch, var: RecordBatch, x: impl Into<ExpressionMatrix>) -> Self {
        Self {
            obs,
            var,
            x: Some(x.into()),
            raw_x: None,
            layers: BTreeMap::new(),
        }
    }
}

/// A dataset that passed validation, and after [`Standardizer::standardize`], one in
/// canonical layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CellDataset {
    obs: RecordBatch,
    var: RecordBatch,
    x: CsMat<f64>,
    layers: BTreeMap<String, CsMat<f64>>,
    standardized: bool,
}

impl CellDataset {
    pub(crate) fn from_parts(
        obs: RecordBatch,
        var: RecordBatch,
        x: CsMat<f64>,
        layers: BTreeMap<String, CsMat<f64>>,
        standardized: bool,
    ) -> Self {
        Self {
            obs,
            var,
            x,
            layers,
            standardized,
        }
    }

    /// Per-cell metadata.
    pub fn obs(&self) -> &RecordBatch {
        &self.obs
    }

    /// Per-gene metadata.
    pub fn var(&self) -> &RecordBatch {
        &self.var
    }

    /// Primary count matrix (CSR, cells x genes).
    pub fn x(&self) -> &CsMat<f64> {
        &self.x
    }

    /// Expression layers by name. The canonical `row_raw` layer is [`Self::x`].
    pub fn layers(&self) -> &BTreeMap<String, CsMat<f64>> {
        &self.layers
    }

    /// One layer, resolving the canonical layer to the primary matrix.
    pub fn layer(&self, name: &str) -> Option<&CsMat<f64>> {
        if name == crate::schema::CANONICAL_LAYER {
            Some(&self.x)
        } else {
            self.layers.get(name)
        }
    }

    /// True once standardization completed.
    pub fn is_standardized(&self) -> bool {
        self.standardized
    }

    /// Number of cells.
    pub fn num_obs(&self) -> usize {
        self.x.rows()
    }

    /// Number of genes.
    pub fn num_vars(&self) -> usize {
        self.x.cols()
    }

    /// Values of an obs column as strings.
    pub fn obs_strings(&self, column: &str) -> Result<Vec<String>, ArrowError> {
        columns::column_strings(&self.obs, column)
    }

    /// Values of a var column as strings.
    pub fn var_strings(&self, column: &str) -> Result<Vec<String>, ArrowError> {
        columns::column_strings(&self.var, column)
    }

    /// Distinct values of an obs column, in order of first appearance.
    pub fn distinct_obs_values(&self, column: &str) -> Result<Vec<String>, ArrowError> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .obs_strings(column)?
            .into_iter()
            .filter(|value| seen.insert(value.clone()))
            .collect())
    }
}
