//! # Ingestion Pipeline
//!
//! Drives a batch of raw units into an experiment through a resumable state machine:
//!
//! ```text
//! PendingConversion -> Converted -> Mapped -> Resized -> Ingested -> Done
//!         \______________\___________\_________\___________\____> Failed
//! ```
//!
//! | Transition | Work | Scheduling |
//! |------------|------|------------|
//! | PendingConversion -> Converted | validate, standardize, write unit files | parallel, per unit |
//! | Converted -> Mapped | [`create_registration_mapping`] | serial |
//! | Mapped -> Resized | [`resize_store`] | serial |
//! | Resized -> Ingested | [`write_unit`] | parallel, per unit |
//! | Ingested -> Done | summary, checkpoint cleanup | serial |
//!
//! Per-unit failures in the parallel stages are recorded and never stop sibling units.
//! Failures in the serial stages abort the run.
//!
//! ## Checkpoints
//!
//! After conversion the list of unit files is written to `converted.json`; after mapping
//! the registration mapping is written to `registration.json`. A restarted run resumes
//! after the latest checkpoint it finds. Deleting them forces recomputation.

mod error;


pub use error::{ConversionError, PipelineError};

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collection::{check_duplicate_samples, RawCollector};
use crate::dataset::{write_unit_file, Standardizer, UnitSource, UNIT_FILE_EXTENSION};
use crate::executor::{AnyExecutor, Executor, ExecutorMode};
use crate::registration::{
    create_registration_mapping, resize_store, write_unit, RegistrationMapping,
};
use crate::schema::{SchemaModel, GENE_COLUMN};
use crate::store::{Experiment, OpenMode, StoreConfig};

/// Checkpoint holding the converted unit files.
pub const CONVERTED_CHECKPOINT: &str = "converted.json";
/// Checkpoint holding the registration mapping.
pub const REGISTRATION_CHECKPOINT: &str = "registration.json";

/// Stage of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Raw units not yet converted
    PendingConversion,
    /// Unit files written
    Converted,
    /// Global indices assigned
    Mapped,
    /// Store grown to the mapping's shapes
    Resized,
    /// Unit files written to the store
    Ingested,
    /// Run complete
    Done,
    /// Run aborted
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PendingConversion => "PENDING_CONVERSION",
            Self::Converted => "CONVERTED",
            Self::Mapped => "MAPPED",
            Self::Resized => "RESIZED",
            Self::Ingested => "INGESTED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Where and how a run stores its outputs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Atlas name; the experiment lives at `atlas_storage_dir/atlas_name`
    pub atlas_name: String,
    /// Parent directory of experiments
    pub atlas_storage_dir: PathBuf,
    /// Directory receiving standardized unit files
    pub unit_storage_dir: PathBuf,
    /// Checkpoint directory; defaults to `atlas_storage_dir/checkpoints/atlas_name`
    pub checkpoint_dir: Option<PathBuf>,
    /// Scheduling of the parallel stages
    pub executor: ExecutorMode,
    /// Worker threads for the parallel stages
    pub workers: usize,
    /// Keep checkpoints after a successful run
    pub keep_checkpoints: bool,
    /// Parquet settings of store fragments
    pub store: StoreConfig,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the locations.
    pub fn new(
        atlas_name: impl Into<String>,
        atlas_storage_dir: impl Into<PathBuf>,
        unit_storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            atlas_name: atlas_name.into(),
            atlas_storage_dir: atlas_storage_dir.into(),
            unit_storage_dir: unit_storage_dir.into(),
            checkpoint_dir: None,
            executor: ExecutorMode::Parallel,
            workers: 4,
            keep_checkpoints: false,
            store: StoreConfig::default(),
        }
    }

    /// Experiment location.
    pub fn experiment_uri(&self) -> PathBuf {
        self.atlas_storage_dir.join(&self.atlas_name)
    }

    /// Checkpoint directory in effect.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir.clone().unwrap_or_else(|| {
            self.atlas_storage_dir
                .join("checkpoints")
                .join(&self.atlas_name)
        })
    }

    /// Default log file of the atlas.
    pub fn log_file(&self) -> PathBuf {
        self.atlas_storage_dir
            .join("logs")
            .join(format!("{}.log", self.atlas_name))
    }

    fn unit_path(&self, group: &str, unit: &str) -> PathBuf {
        self.unit_storage_dir
            .join(format!("{group}-{unit}.{UNIT_FILE_EXTENSION}"))
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// Units whose samples were all registered already
    pub skipped: usize,
    /// Units converted to unit files
    pub converted: usize,
    /// Units that failed conversion, labeled `group/unit`
    pub conversion_failures: Vec<(String, String)>,
    /// Unit files written to the store
    pub ingested: usize,
    /// Unit files that failed to write
    pub ingestion_failures: Vec<(PathBuf, String)>,
    /// Cells new to the store
    pub new_obs: usize,
    /// True when this run created the experiment
    pub created_store: bool,
    /// True when the run resumed from a checkpoint
    pub resumed: bool,
}

impl PipelineSummary {
    /// Total per-unit failures.
    pub fn num_failures(&self) -> usize {
        self.conversion_failures.len() + self.ingestion_failures.len()
    }
}

/// One ingestion run over a raw collection.
pub struct IngestionPipeline<'a, C: RawCollector + ?Sized> {
    schema: &'a SchemaModel,
    collector: &'a C,
    config: PipelineConfig,
    executor: AnyExecutor,
    state: PipelineState,
}

impl<'a, C: RawCollector + ?Sized> IngestionPipeline<'a, C> {
    /// Pipeline ingesting `collector` under `schema`.
    pub fn new(schema: &'a SchemaModel, collector: &'a C, config: PipelineConfig) -> Self {
        let executor = AnyExecutor::new(config.executor, config.workers);
        Self {
            schema,
            collector,
            config,
            executor,
            state: PipelineState::PendingConversion,
        }
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Configuration of this run.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every remaining stage. Any error leaves the pipeline in
    /// [`PipelineState::Failed`].
    pub fn run(&mut self) -> Result<PipelineSummary, PipelineError> {
        info!(
            "Starting ingestion into {}",
            self.config.experiment_uri().display()
        );
        match self.run_stages() {
            Ok(summary) => Ok(summary),
            Err(err) => {
                error!("Ingestion failed in state {}: {}", self.state, err);
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        info!("{} -> {}", self.state, next);
        self.state = next;
    }

    fn run_stages(&mut self) -> Result<PipelineSummary, PipelineError> {
        let uri = self.config.experiment_uri();
        let checkpoints = self.config.checkpoint_dir();
        let mut summary = PipelineSummary::default();

        let registered: HashSet<String> = if Experiment::exists(&uri) {
            self.check_schema_frozen(&uri)?;
            let experiment = Experiment::open(&uri, OpenMode::Read)?;
            experiment
                .distinct_obs_values(&self.schema.sample_id_column)?
                .into_iter()
                .collect()
        } else {
            HashSet::new()
        };
        check_duplicate_samples(self.collector)?;

        if !Experiment::exists(&uri) {
            Experiment::create(
                &uri,
                self.schema,
                &self.config.atlas_name,
                self.config.store.clone(),
            )?;
            summary.created_store = true;
        }

        let saved = load_checkpoint::<RegistrationMapping>(&checkpoints, REGISTRATION_CHECKPOINT)?;
        let mapping = match saved {
            Some(mapping) => {
                info!(
                    "Resuming from registration checkpoint ({} units)",
                    mapping.units.len()
                );
                summary.resumed = true;
                self.state = PipelineState::Mapped;
                mapping
            }
            None => {
                let saved = load_checkpoint::<Vec<PathBuf>>(&checkpoints, CONVERTED_CHECKPOINT)?;
                let converted = match saved {
                    Some(paths) => {
                        info!("Resuming from conversion checkpoint ({} units)", paths.len());
                        summary.resumed = true;
                        self.state = PipelineState::Converted;
                        paths
                    }
                    None => {
                        let converted = self.convert(&registered, &mut summary)?;
                        if converted.is_empty() {
                            return self.abort_empty(&uri, summary);
                        }
                        save_checkpoint(&checkpoints, CONVERTED_CHECKPOINT, &converted)?;
                        self.transition(PipelineState::Converted);
                        converted
                    }
                };

                let mapping = create_registration_mapping(&uri, &converted, self.schema)?;
                save_checkpoint(&checkpoints, REGISTRATION_CHECKPOINT, &mapping)?;
                self.transition(PipelineState::Mapped);
                mapping
            }
        };
        summary.new_obs = mapping.new_obs_count();

        resize_store(&uri, &mapping)?;
        self.transition(PipelineState::Resized);

        let paths: Vec<PathBuf> = mapping.paths().map(Path::to_path_buf).collect();
        let store = self.config.store.clone();
        let result = self
            .executor
            .run(paths, |path| write_unit(&uri, path, &mapping, &store));
        summary.ingested = result.num_successes();
        summary.ingestion_failures = result
            .failures
            .into_iter()
            .map(|(path, err)| (path, err.to_string()))
            .collect();
        self.transition(PipelineState::Ingested);

        if !summary.ingestion_failures.is_empty() {
            warn!(
                "{} unit files failed to ingest",
                summary.ingestion_failures.len()
            );
        }
        if !self.config.keep_checkpoints {
            remove_checkpoints(&checkpoints)?;
        }
        self.transition(PipelineState::Done);
        info!(
            "Ingestion complete: {} converted, {} ingested, {} skipped, {} failures",
            summary.converted,
            summary.ingested,
            summary.skipped,
            summary.num_failures()
        );
        Ok(summary)
    }

    /// Reject a store whose var genes differ from the schema's universe.
    fn check_schema_frozen(&self, uri: &Path) -> Result<(), PipelineError> {
        let universe = self.schema.gene_universe()?;
        let experiment = Experiment::open(uri, OpenMode::Read)?;
        let var = experiment.read_var()?;
        let genes = crate::dataset::columns::column_strings(&var, GENE_COLUMN)
            .map_err(crate::store::StoreError::from)?;
        if genes.as_slice() != universe.sorted_core_genes() {
            return Err(PipelineError::SchemaMismatch {
                uri: uri.to_path_buf(),
                expected: universe.num_genes(),
                found: genes.len(),
            });
        }
        Ok(())
    }

    /// Convert every unit with an unregistered sample. Returns the unit files written.
    fn convert(
        &self,
        registered: &HashSet<String>,
        summary: &mut PipelineSummary,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let mut pending = Vec::new();
        for (group, unit) in self.collector.list_all_units()? {
            let samples = self.collector.unit_samples(&group, &unit)?;
            if !samples.is_empty() && samples.iter().all(|s| registered.contains(s)) {
                summary.skipped += 1;
                continue;
            }
            pending.push((group, unit));
        }
        info!(
            "Converting {} units ({} already registered)",
            pending.len(),
            summary.skipped
        );
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.config.unit_storage_dir)?;
        let standardizer = Standardizer::new(self.schema)?;
        let collector = self.collector;
        let config = &self.config;
        let sample_column = self.schema.sample_id_column.as_str();

        let result = self.executor.run(pending, |(group, unit)| {
            let label = format!("{group}/{unit}");
            let raw = collector.get_raw_unit(group, unit)?;
            let mut dataset = standardizer.validate(raw, &label)?;
            standardizer.standardize(&mut dataset)?;

            let path = config.unit_path(group, unit);
            let source = UnitSource {
                group: group.clone(),
                unit: unit.clone(),
            };
            write_unit_file(&path, &dataset, sample_column, Some(source))?;
            Ok::<PathBuf, ConversionError>(path)
        });

        summary.converted = result.num_successes();
        summary.conversion_failures = result
            .failures
            .into_iter()
            .map(|((group, unit), err)| (format!("{group}/{unit}"), err.to_string()))
            .collect();
        info!(
            "Conversion complete: {} successes, {} failures",
            summary.converted,
            summary.conversion_failures.len()
        );
        Ok(result.successes)
    }

    /// Nothing to ingest: a no-op for an existing store, an abort for a new one.
    fn abort_empty(
        &mut self,
        uri: &Path,
        summary: PipelineSummary,
    ) -> Result<PipelineSummary, PipelineError> {
        let failures = summary.conversion_failures.len();
        if failures == 0 && !summary.created_store {
            info!("No pending units; store is up to date");
            self.transition(PipelineState::Done);
            return Ok(summary);
        }
        if summary.created_store {
            warn!("Deleting empty experiment {}", uri.display());
            Experiment::delete(uri)?;
        }
        for (unit, reason) in &summary.conversion_failures {
            error!("{}: {}", unit, reason);
        }
        Err(PipelineError::NothingConverted { failures })
    }
}

fn load_checkpoint<T: DeserializeOwned>(
    dir: &Path,
    name: &str,
) -> Result<Option<T>, PipelineError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Ok(None);
    }
    let file = fs::File::open(&path)?;
    Ok(Some(serde_json::from_reader(std::io::BufReader::new(file))?))
}

fn save_checkpoint<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), PipelineError> {
    fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    temp.flush()?;
    temp.persist(dir.join(name))
        .map_err(|e| PipelineError::IoError(e.error))?;
    Ok(())
}

fn remove_checkpoints(dir: &Path) -> Result<(), PipelineError> {
    for name in [CONVERTED_CHECKPOINT, REGISTRATION_CHECKPOINT] {
        let path = dir.join(name);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
