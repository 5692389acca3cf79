//! Standardization of validated datasets into the canonical layout.

use std::collections::{BTreeMap, HashSet};

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use log::{debug, warn};
use sprs::CsMat;

use super::columns;
use super::error::StandardizeError;
use super::CellDataset;
use crate::matrix::{self, Compression, DEFAULT_TARGET_SUM};
use crate::schema::{
    ComputeInput, GeneUniverse, LayerKind, Orientation, SchemaConfigError, SchemaModel,
    GENE_COLUMN,
};

/// Fill value for missing obs strings.
pub const OBS_FILL: &str = "Unknown";

/// Fill value for missing var strings.
pub const VAR_FILL: &str = "";

/// Validates and standardizes datasets against one schema.
#[derive(Debug, Clone)]
pub struct Standardizer<'a> {
    schema: &'a SchemaModel,
    universe: &'a GeneUniverse,
    target_sum: f64,
}

impl<'a> Standardizer<'a> {
    /// Bind to a schema, loading its gene universe.
    pub fn new(schema: &'a SchemaModel) -> Result<Self, SchemaConfigError> {
        Ok(Self {
            schema,
            universe: schema.gene_universe()?,
            target_sum: DEFAULT_TARGET_SUM,
        })
    }

    /// Override the normalization library size.
    pub fn with_target_sum(mut self, target_sum: f64) -> Self {
        self.target_sum = target_sum;
        self
    }

    /// The bound schema.
    pub fn schema(&self) -> &SchemaModel {
        self.schema
    }

    /// The bound gene universe.
    pub fn universe(&self) -> &GeneUniverse {
        self.universe
    }

    /// Reshape a validated dataset in place. Running it twice changes nothing.
    ///
    /// Order: obs columns and computed metrics, var columns and gene filtering,
    /// expression layers.
    pub fn standardize(&self, dataset: &mut CellDataset) -> Result<(), StandardizeError> {
        // Computed columns are derived from the unfiltered matrix, so a second pass
        // over filtered genes would change them.
        if dataset.standardized {
            debug!("Dataset already standardized; nothing to do");
            return Ok(());
        }
        dataset.obs = self.standardize_obs(&dataset.obs, &dataset.x, &dataset.var)?;

        let (var, x) = self.standardize_var(&dataset.var, &dataset.x)?;
        dataset.var = var;
        dataset.x = x;

        dataset.layers = self.build_layers(&dataset.x)?;
        dataset.standardized = true;

        debug!(
            "Standardized dataset: {} cells x {} genes, {} layers",
            dataset.num_obs(),
            dataset.num_vars(),
            dataset.layers.len()
        );
        Ok(())
    }

    fn standardize_obs(
        &self,
        obs: &RecordBatch,
        x: &CsMat<f64>,
        var: &RecordBatch,
    ) -> Result<RecordBatch, StandardizeError> {
        let num_rows = obs.num_rows();
        let mut out: Vec<(String, ArrayRef)> = Vec::new();

        for spec in self.schema.obs_standard_columns() {
            let column =
                columns::conform_column(obs.column_by_name(&spec.name), num_rows, spec.dtype, OBS_FILL)?;
            out.push((spec.name.clone(), column));
        }

        // Computed metrics use the matrix before gene filtering.
        let genes = columns::column_strings(var, GENE_COLUMN)?;
        let input = ComputeInput { matrix: x, genes: &genes };
        for spec in &self.schema.obs_computed_columns {
            match self.schema.resolve_computed(&spec.name) {
                Ok(function) => {
                    let values = function(&input);
                    out.push((spec.name.clone(), columns::numeric_column(values, spec.dtype)?));
                }
                Err(e) => warn!("Skipping computed column `{}`: {}", spec.name, e),
            }
        }

        Ok(columns::batch_from_columns(out, num_rows)?)
    }

    fn standardize_var(
        &self,
        var: &RecordBatch,
        x: &CsMat<f64>,
    ) -> Result<(RecordBatch, CsMat<f64>), StandardizeError> {
        let genes = columns::column_strings(var, GENE_COLUMN)?;

        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        let keep: Vec<usize> = genes
            .iter()
            .enumerate()
            .filter(|(_, gene)| self.universe.contains(gene))
            .filter(|(_, gene)| {
                let first = seen.insert(gene.as_str());
                duplicates += usize::from(!first);
                first
            })
            .map(|(i, _)| i)
            .collect();
        if duplicates > 0 {
            warn!("Dropped {} duplicate core gene column(s)", duplicates);
        }
        let dropped = genes.len() - keep.len() - duplicates;
        if dropped > 0 {
            debug!("Dropped {} gene(s) outside the core universe", dropped);
        }

        let filtered = columns::take_rows(var, &keep)?;
        let mut out: Vec<(String, ArrayRef)> = Vec::new();
        for spec in &self.schema.var_columns {
            let column = columns::conform_column(
                filtered.column_by_name(&spec.name),
                keep.len(),
                spec.dtype,
                VAR_FILL,
            )?;
            out.push((spec.name.clone(), column));
        }
        let var = columns::batch_from_columns(out, keep.len())?;

        let x = if keep.len() == x.cols() && keep.iter().enumerate().all(|(i, &k)| i == k) {
            x.clone()
        } else {
            matrix::select_columns(x, &keep)
        };
        Ok((var, x))
    }

    fn build_layers(&self, x: &CsMat<f64>) -> Result<BTreeMap<String, CsMat<f64>>, StandardizeError> {
        let mut layers = BTreeMap::new();
        for layer in &self.schema.x_layers {
            if layer.is_canonical() {
                continue;
            }
            let (orientation, kind) = layer.parse_name()?;
            let storage = match orientation {
                Orientation::Row => Compression::Csr,
                Orientation::Column => Compression::Csc,
            };
            let values = match kind {
                LayerKind::Raw => matrix::with_storage(x, storage),
                LayerKind::Normalized => {
                    let normalized = matrix::normalize(x, self.target_sum);
                    match storage {
                        Compression::Csr => normalized,
                        Compression::Csc => matrix::with_storage(&normalized, storage),
                    }
                }
            };
            layers.insert(layer.name.clone(), values);
        }
        Ok(layers)
    }
}
