//! # Gene Presence
//!
//! The presence matrix records, per sample, which core genes appear anywhere in that
//! sample's raw input. Row `i` belongs to the `i`-th sample in order of first
//! registration (lowest obs index), so rows never move once written.
//!
//! [`PresenceMatrixComputer::compute`] only fills rows that are still empty. One task
//! per sample writes one row; tasks never share rows and may run in parallel.
//!
//! A row counts as filled once it has a stored coordinate. A sample whose input lists no
//! core gene has an all-zero row, stores nothing, and is therefore recomputed (with a
//! warning) on every run. The result is the same each time.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use log::{info, warn};

use crate::collection::{CollectionError, RawCollector};
use crate::executor::{AnyExecutor, Executor};
use crate::schema::{GeneUniverse, SchemaConfigError, SchemaModel};
use crate::store::{CoordinateTable, Experiment, OpenMode, StoreConfig, StoreError};

/// Errors raised while computing presence rows.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// Store failure
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Raw input could not be read
    #[error("Collection error: {0}")]
    CollectionError(#[from] CollectionError),

    /// The schema could not provide the gene universe
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaConfigError),

    /// Arrow failure while reading sample names
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// A registered sample has no unit in the collection
    #[error("Sample `{0}` is not present in the raw collection")]
    MissingSample(String),
}

/// `1` at every universe position whose gene is in `genes`, else `0`.
pub fn presence_row<'a, I>(universe: &GeneUniverse, genes: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut row = vec![0u8; universe.num_genes()];
    for gene in genes {
        if let Some(index) = universe.index_of(gene) {
            row[index] = 1;
        }
    }
    row
}

/// One presence row to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTask {
    /// Sample identifier
    pub sample: String,
    /// Presence row
    pub index: i64,
    /// Collection group holding the sample
    pub group: String,
    /// Collection unit holding the sample
    pub unit: String,
}

/// Outcome of [`PresenceMatrixComputer::compute`].
#[derive(Debug, Default)]
pub struct PresenceSummary {
    /// Samples registered in the store
    pub known_samples: usize,
    /// Rows written by this run
    pub computed: usize,
    /// Rows that were already present
    pub skipped: usize,
    /// Samples that failed, with the reason
    pub failures: Vec<(String, String)>,
}

/// Fills missing presence rows of an experiment from a raw collection.
pub struct PresenceMatrixComputer<'a, C: RawCollector + ?Sized> {
    schema: &'a SchemaModel,
    collector: &'a C,
    executor: AnyExecutor,
    config: StoreConfig,
}

impl<'a, C: RawCollector + ?Sized> PresenceMatrixComputer<'a, C> {
    /// Computer reading raw genes from `collector`.
    pub fn new(schema: &'a SchemaModel, collector: &'a C, executor: AnyExecutor) -> Self {
        Self {
            schema,
            collector,
            executor,
            config: StoreConfig::default(),
        }
    }

    /// Use `config` for presence fragments.
    pub fn with_store_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Compute every presence row of the experiment at `uri` that is still empty.
    ///
    /// The presence array is first grown to hold every registered sample.
    pub fn compute(&self, uri: &Path) -> Result<PresenceSummary, PresenceError> {
        let universe = self.schema.gene_universe()?;
        let mut experiment = Experiment::open(uri, OpenMode::Write)?;
        let array = experiment.presence_array();

        let samples = experiment.distinct_obs_values(&self.schema.sample_id_column)?;
        let current = experiment.array_shape(&array)?;
        experiment.resize_array(
            &array,
            [
                current[0].max(samples.len() as u64),
                current[1].max(universe.num_genes() as u64),
            ],
        )?;

        let written: HashSet<i64> = experiment
            .read_coordinates(&array)?
            .dim0
            .into_iter()
            .collect();

        let owners = self.sample_owners()?;
        let mut summary = PresenceSummary {
            known_samples: samples.len(),
            ..Default::default()
        };
        let mut tasks = Vec::new();
        for (index, sample) in samples.into_iter().enumerate() {
            let index = index as i64;
            if written.contains(&index) {
                summary.skipped += 1;
                continue;
            }
            match owners.get(&sample) {
                Some((group, unit)) => tasks.push(PresenceTask {
                    sample,
                    index,
                    group: group.clone(),
                    unit: unit.clone(),
                }),
                None => {
                    warn!("Sample '{}' is registered but not in the collection", sample);
                    let reason = PresenceError::MissingSample(sample.clone()).to_string();
                    summary.failures.push((sample, reason));
                }
            }
        }
        info!(
            "Computing {} presence rows ({} already present)",
            tasks.len(),
            summary.skipped
        );

        let root: PathBuf = uri.to_path_buf();
        // each task writes through its own handle
        let write_row = |task: &PresenceTask| -> Result<usize, PresenceError> {
            let experiment =
                Experiment::open(&root, OpenMode::Write)?.with_config(self.config.clone());
            let genes = self.collector.presence_genes(&task.group, &task.unit)?;
            let row = presence_row(universe, genes.iter().map(String::as_str));

            let mut table = CoordinateTable::new();
            for (gene, _) in row.iter().enumerate().filter(|(_, present)| **present == 1) {
                table.push(task.index, gene as i64, 1.0);
            }
            if table.is_empty() {
                warn!(
                    "Sample '{}' lists no core genes; its presence row stays empty",
                    task.sample
                );
            }
            experiment.write_coordinates(&array, &table)?;
            Ok(table.len())
        };
        let result = self.executor.run(tasks, write_row);

        summary.computed = result.num_successes();
        for (task, err) in result.failures {
            summary.failures.push((task.sample, err.to_string()));
        }
        info!(
            "Presence matrix: {} rows computed, {} skipped, {} failed",
            summary.computed,
            summary.skipped,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// sample -> (group, unit) over the whole collection.
    fn sample_owners(&self) -> Result<HashMap<String, (String, String)>, PresenceError> {
        let mut owners = HashMap::new();
        for (group, unit) in self.collector.list_all_units()? {
            for sample in self.collector.unit_samples(&group, &unit)? {
                owners
                    .entry(sample)
                    .or_insert_with(|| (group.clone(), unit.clone()));
            }
        }
        Ok(owners)
    }
}
