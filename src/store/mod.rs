//! # Experiment Store
//!
//! A directory-backed, append-only columnar store for one atlas.
//!
//! ## Layout
//!
//! ```text
//! <atlas_storage_dir>/<atlas_name>/
//! ├── experiment.json                       # Manifest: metadata, domains, shapes, dtypes
//! ├── obs/<fragment>.parquet                # soma_joinid + obs columns
//! └── ms/<measurement>/
//!     ├── var/<fragment>.parquet            # Written once at create
//!     ├── X/<layer>/<fragment>.parquet      # soma_dim_0, soma_dim_1, soma_data
//!     └── <presence>/<fragment>.parquet
//! ```
//!
//! Fragment names start with a zero-padded nanosecond timestamp, so listing order is
//! write order. Reads resolve duplicate rows and coordinates last-write-wins.
//!
//! ## Concurrency
//!
//! Only the manifest is ever rewritten, and only through a [`OpenMode::Write`] handle
//! (temp file + rename). Fragment writes never touch the manifest, so any number of
//! writers may append to disjoint coordinates once the shapes have been grown.

mod config;
mod error;
mod manifest;

#[cfg(test)]
mod tests;

pub use config::{CompressionType, StoreConfig};
pub use error::StoreError;
pub use manifest::{ArraySpec, DataFrameSpec, ExperimentManifest, MANIFEST_FILE};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, Float64Array, Int64Array, LargeStringArray};
use arrow::compute::{cast, cast_with_options, concat_batches, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use sprs::CsMat;

use crate::dataset::columns::{self, take_rows};
use crate::matrix::{self, Compression};
use crate::schema::{SchemaModel, GENE_COLUMN};

/// Index column of obs and var.
pub const SOMA_JOINID: &str = "soma_joinid";
/// First coordinate column (cell or sample).
pub const SOMA_DIM_0: &str = "soma_dim_0";
/// Second coordinate column (gene).
pub const SOMA_DIM_1: &str = "soma_dim_1";
/// Value column of coordinate tables.
pub const SOMA_DATA: &str = "soma_data";

/// Version of the experiment object layout.
pub const OBJECT_VERSION: &str = "1";

/// Metadata keys written at create.
pub mod keys {
    /// RFC 3339 creation time
    pub const CREATED_ON: &str = "created_on";
    /// Schema version of the atlas
    pub const SCHEMA_VERSION: &str = "schema_version";
    /// Object layout version
    pub const OBJECT_VERSION: &str = "object_version";
    /// Atlas name
    pub const ATLAS_NAME: &str = "atlas_name";
    /// Size of the gene universe
    pub const NUM_GENES: &str = "num_genes";
    /// Writing software
    pub const WRITER_VERSION: &str = "writer_version";
    /// Name of the presence matrix array
    pub const PRESENCE_MATRIX_NAME: &str = "presence_matrix_name";
    /// Obs column identifying a sample
    pub const SAMPLE_ID_COLUMN: &str = "sample_id_column";
}

static FRAGMENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Access mode of an experiment handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads only
    Read,
    /// Reads, fragment writes and manifest updates
    Write,
}

/// Sparse coordinates with `f64` values, in write order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateTable {
    /// First dimension
    pub dim0: Vec<i64>,
    /// Second dimension
    pub dim1: Vec<i64>,
    /// Values
    pub data: Vec<f64>,
}

impl CoordinateTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn push(&mut self, row: i64, col: i64, value: f64) {
        self.dim0.push(row);
        self.dim1.push(col);
        self.data.push(value);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stored entries of `matrix` with local rows and columns mapped through `rows`
    /// and `cols`.
    pub fn from_matrix(matrix: &CsMat<f64>, rows: &[i64], cols: &[i64]) -> Self {
        let mut table = Self::new();
        for (&value, (row, col)) in matrix.iter() {
            table.push(rows[row], cols[col], value);
        }
        table
    }

    /// Entries as a CSR matrix of the given shape. Negative coordinates are skipped.
    pub fn to_matrix(&self, shape: (usize, usize)) -> CsMat<f64> {
        let entries = self
            .dim0
            .iter()
            .zip(&self.dim1)
            .zip(&self.data)
            .filter(|((r, c), _)| **r >= 0 && **c >= 0)
            .map(|((&r, &c), &v)| (r as usize, c as usize, v));
        matrix::from_triplets(shape, entries, Compression::Csr)
    }

    /// Entries of one `dim0` value, as `(dim1, value)`.
    pub fn row(&self, row: i64) -> Vec<(i64, f64)> {
        self.dim0
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == row)
            .map(|(i, _)| (self.dim1[i], self.data[i]))
            .collect()
    }
}

/// Handle on one experiment directory.
#[derive(Debug, Clone)]
pub struct Experiment {
    root: PathBuf,
    mode: OpenMode,
    manifest: ExperimentManifest,
    config: StoreConfig,
}

impl Experiment {
    /// True when an experiment exists at `root`.
    pub fn exists(root: &Path) -> bool {
        root.join(MANIFEST_FILE).is_file()
    }

    /// Create an empty experiment for `schema` and return a write handle.
    ///
    /// `var` is populated from the gene universe; every X layer and the presence matrix
    /// start with shape `(0, num_genes)`.
    pub fn create(
        root: &Path,
        schema: &SchemaModel,
        atlas_name: &str,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        if Self::exists(root) {
            return Err(StoreError::AlreadyExists(root.to_path_buf()));
        }
        let universe = schema.gene_universe()?;
        let num_genes = universe.num_genes() as u64;
        fs::create_dir_all(root)?;

        let metadata: BTreeMap<String, String> = [
            (keys::CREATED_ON, Utc::now().to_rfc3339()),
            (keys::SCHEMA_VERSION, schema.schema_version.clone()),
            (keys::OBJECT_VERSION, OBJECT_VERSION.to_string()),
            (keys::ATLAS_NAME, atlas_name.to_string()),
            (keys::NUM_GENES, num_genes.to_string()),
            (keys::WRITER_VERSION, writer_version()),
            (keys::PRESENCE_MATRIX_NAME, schema.presence_matrix_name.clone()),
            (keys::SAMPLE_ID_COLUMN, schema.sample_id_column.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let obs_index = schema.obs_index_name().to_string();
        let var_index = schema.var_index_name().to_string();
        let measurement = schema.measurement_name.clone();

        let mut arrays = BTreeMap::new();
        for layer in &schema.x_layers {
            arrays.insert(
                layer_array_name(&measurement, &layer.name),
                ArraySpec {
                    shape: [0, num_genes],
                    dtype: layer.dtype,
                    storage: schema.storage_hint(&["X", &layer.name]),
                },
            );
        }
        arrays.insert(
            presence_array_name(&measurement, &schema.presence_matrix_name),
            ArraySpec {
                shape: [0, num_genes],
                dtype: schema.presence_layer_type,
                storage: schema.storage_hint(&["presence"]),
            },
        );

        let manifest = ExperimentManifest {
            format_version: manifest::MANIFEST_VERSION.to_string(),
            measurement: measurement.clone(),
            metadata,
            obs: DataFrameSpec {
                columns: schema
                    .obs_term_columns()
                    .filter(|c| c.name != obs_index)
                    .cloned()
                    .collect(),
                index_column: obs_index,
                domain: 0,
                storage: schema.storage_hint(&["obs"]),
            },
            var: DataFrameSpec {
                columns: schema
                    .var_term_columns()
                    .filter(|c| c.name != var_index)
                    .cloned()
                    .collect(),
                index_column: var_index,
                domain: num_genes,
                storage: schema.storage_hint(&["var"]),
            },
            arrays,
        };
        manifest.save(root)?;

        let experiment = Self {
            root: root.to_path_buf(),
            mode: OpenMode::Write,
            manifest,
            config,
        };

        let var_schema = Arc::new(experiment.manifest.var.arrow_schema());
        let mut var_columns: Vec<ArrayRef> = Vec::with_capacity(var_schema.fields().len());
        for field in var_schema.fields() {
            let column: ArrayRef = if field.name() == &experiment.manifest.var.index_column {
                Arc::new(Int64Array::from_iter_values(
                    universe.var_table().map(|entry| entry.index as i64),
                ))
            } else if field.name() == GENE_COLUMN {
                Arc::new(LargeStringArray::from_iter_values(
                    universe.var_table().map(|entry| entry.gene),
                ))
            } else if field.name() == "ens" {
                Arc::new(LargeStringArray::from_iter_values(
                    universe.var_table().map(|entry| entry.ens),
                ))
            } else {
                new_null_array(&DataType::LargeUtf8, universe.num_genes())
            };
            var_columns.push(cast(&column, field.data_type())?);
        }
        let var = RecordBatch::try_new(var_schema, var_columns)?;
        experiment.write_fragment(&experiment.var_dir(), &var, &experiment.manifest.var.storage)?;

        info!(
            "Created experiment {} ({} genes, {} layers)",
            root.display(),
            num_genes,
            schema.x_layers.len()
        );
        Ok(experiment)
    }

    /// Open an existing experiment.
    pub fn open(root: &Path, mode: OpenMode) -> Result<Self, StoreError> {
        let manifest = ExperimentManifest::load(root)?;
        debug!("Opened experiment {} ({:?})", root.display(), mode);
        Ok(Self {
            root: root.to_path_buf(),
            mode,
            manifest,
            config: StoreConfig::default(),
        })
    }

    /// Use `config` for subsequent fragment writes.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Remove an experiment directory and everything in it.
    pub fn delete(root: &Path) -> Result<(), StoreError> {
        if !root.exists() {
            return Err(StoreError::NotFound(root.to_path_buf()));
        }
        fs::remove_dir_all(root)?;
        info!("Deleted experiment {}", root.display());
        Ok(())
    }

    /// Experiment directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Access mode of this handle.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Manifest snapshot taken when the handle was opened or last updated.
    pub fn manifest(&self) -> &ExperimentManifest {
        &self.manifest
    }

    /// Measurement name.
    pub fn measurement(&self) -> &str {
        &self.manifest.measurement
    }

    /// Array name of an X layer.
    pub fn layer_array(&self, layer: &str) -> String {
        layer_array_name(&self.manifest.measurement, layer)
    }

    /// Array name of the presence matrix.
    pub fn presence_array(&self) -> String {
        let name = self
            .manifest
            .metadata
            .get(keys::PRESENCE_MATRIX_NAME)
            .map(String::as_str)
            .unwrap_or("feature_presence_matrix");
        presence_array_name(&self.manifest.measurement, name)
    }

    /// Names of the X layers.
    pub fn layer_names(&self) -> Vec<String> {
        let prefix = format!("ms/{}/X/", self.manifest.measurement);
        self.manifest
            .arrays
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// String metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.manifest.metadata
    }

    /// Set one metadata entry.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update_manifest(|manifest| {
            manifest
                .metadata
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    /// Allocated obs rows.
    pub fn obs_domain(&self) -> u64 {
        self.manifest.obs.domain
    }

    /// Current shape of an array.
    pub fn array_shape(&self, array: &str) -> Result<[u64; 2], StoreError> {
        Ok(self.manifest.array(array)?.shape)
    }

    /// Grow the obs domain. Shrinking fails.
    pub fn resize_obs(&mut self, rows: u64) -> Result<(), StoreError> {
        self.update_manifest(|manifest| {
            let current = manifest.obs.domain;
            if rows < current {
                return Err(StoreError::Shrink {
                    array: "obs".to_string(),
                    current: [current, 0],
                    requested: [rows, 0],
                });
            }
            manifest.obs.domain = rows;
            Ok(())
        })
    }

    /// Grow an array's shape. Shrinking either dimension fails.
    pub fn resize_array(&mut self, array: &str, shape: [u64; 2]) -> Result<(), StoreError> {
        self.update_manifest(|manifest| {
            let spec = manifest
                .arrays
                .get_mut(array)
                .ok_or_else(|| StoreError::UnknownArray(array.to_string()))?;
            if shape[0] < spec.shape[0] || shape[1] < spec.shape[1] {
                return Err(StoreError::Shrink {
                    array: array.to_string(),
                    current: spec.shape,
                    requested: shape,
                });
            }
            spec.shape = shape;
            Ok(())
        })
    }

    /// Append obs rows. The index column must lie within the obs domain; missing
    /// columns are written as nulls and other columns are cast to the stored types.
    pub fn write_obs(&self, batch: &RecordBatch) -> Result<(), StoreError> {
        self.require_write()?;
        let spec = &self.manifest.obs;
        let conformed = conform_frame("obs", spec, batch)?;
        check_index_bounds("obs", spec, &conformed)?;
        self.write_fragment(&self.obs_dir(), &conformed, &spec.storage)?;
        debug!("Wrote {} obs rows to {}", conformed.num_rows(), self.root.display());
        Ok(())
    }

    /// Every obs row, ordered by index, last write wins.
    pub fn read_obs(&self) -> Result<RecordBatch, StoreError> {
        read_frame(&self.obs_dir(), &self.manifest.obs, None)
    }

    /// Selected obs columns plus the index column, ordered by index.
    pub fn read_obs_columns(&self, columns: &[&str]) -> Result<RecordBatch, StoreError> {
        read_frame(&self.obs_dir(), &self.manifest.obs, Some(columns))
    }

    /// Distinct non-empty values of an obs column, in order of their lowest index.
    pub fn distinct_obs_values(&self, column: &str) -> Result<Vec<String>, StoreError> {
        let obs = self.read_obs_columns(&[column])?;
        let mut seen = HashSet::new();
        Ok(columns::column_strings(&obs, column)?
            .into_iter()
            .filter(|value| !value.is_empty() && seen.insert(value.clone()))
            .collect())
    }

    /// The var dataframe, ordered by index.
    pub fn read_var(&self) -> Result<RecordBatch, StoreError> {
        read_frame(&self.var_dir(), &self.manifest.var, None)
    }

    /// Append coordinates to an array. Every coordinate must lie within its shape.
    pub fn write_coordinates(&self, array: &str, table: &CoordinateTable) -> Result<(), StoreError> {
        self.require_write()?;
        let spec = self.manifest.array(array)?;
        for (&row, &col) in table.dim0.iter().zip(&table.dim1) {
            let inside = row >= 0
                && col >= 0
                && (row as u64) < spec.shape[0]
                && (col as u64) < spec.shape[1];
            if !inside {
                return Err(StoreError::OutOfBounds {
                    array: array.to_string(),
                    row,
                    col,
                    shape: spec.shape,
                });
            }
        }
        if table.is_empty() {
            return Ok(());
        }

        let values: ArrayRef = Arc::new(Float64Array::from(table.data.clone()));
        let strict = CastOptions {
            safe: false,
            ..Default::default()
        };
        let values = cast_with_options(&values, &spec.dtype.data_type(), &strict)?;
        let batch = RecordBatch::try_new(
            coordinate_schema(&spec.dtype.data_type()),
            vec![
                Arc::new(Int64Array::from(table.dim0.clone())),
                Arc::new(Int64Array::from(table.dim1.clone())),
                values,
            ],
        )?;
        self.write_fragment(&self.root.join(array), &batch, &spec.storage)?;
        debug!("Wrote {} coordinates to {}", table.len(), array);
        Ok(())
    }

    /// All coordinates of an array sorted by `(dim0, dim1)`, last write wins.
    pub fn read_coordinates(&self, array: &str) -> Result<CoordinateTable, StoreError> {
        let spec = self.manifest.array(array)?;
        let schema = coordinate_schema(&spec.dtype.data_type());
        let batches = read_fragments(&self.root.join(array), &schema, None)?;

        let mut entries: BTreeMap<(i64, i64), f64> = BTreeMap::new();
        for batch in &batches {
            let dim0 = int64_column(batch, 0)?;
            let dim1 = int64_column(batch, 1)?;
            let data = cast(batch.column(2), &DataType::Float64)?;
            let data = data
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| invalid_fragment(&self.root.join(array), "soma_data is not numeric"))?;
            for i in 0..batch.num_rows() {
                entries.insert((dim0.value(i), dim1.value(i)), data.value(i));
            }
        }

        let mut table = CoordinateTable::new();
        for ((row, col), value) in entries {
            table.push(row, col, value);
        }
        Ok(table)
    }

    /// Minimum and maximum written coordinate per dimension, `None` when empty.
    pub fn non_empty_domain(&self, array: &str) -> Result<Option<[(i64, i64); 2]>, StoreError> {
        let table = self.read_coordinates(array)?;
        let bounds = |values: &[i64]| -> Option<(i64, i64)> {
            Some((*values.iter().min()?, *values.iter().max()?))
        };
        Ok(bounds(table.dim0.as_slice())
            .zip(bounds(table.dim1.as_slice()))
            .map(|(a, b)| [a, b]))
    }

    fn obs_dir(&self) -> PathBuf {
        self.root.join("obs")
    }

    fn var_dir(&self) -> PathBuf {
        self.root.join("ms").join(&self.manifest.measurement).join("var")
    }

    fn require_write(&self) -> Result<(), StoreError> {
        match self.mode {
            OpenMode::Write => Ok(()),
            OpenMode::Read => Err(StoreError::ReadOnly(self.root.clone())),
        }
    }

    /// Reload, modify and atomically save the manifest.
    fn update_manifest<F>(&mut self, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ExperimentManifest) -> Result<(), StoreError>,
    {
        self.require_write()?;
        let mut manifest = ExperimentManifest::load(&self.root)?;
        update(&mut manifest)?;
        manifest.save(&self.root)?;
        self.manifest = manifest;
        Ok(())
    }

    fn write_fragment(
        &self,
        dir: &Path,
        batch: &RecordBatch,
        hint: &serde_json::Value,
    ) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(dir)?;
        let mut metadata = HashMap::new();
        metadata.insert(keys::WRITER_VERSION.to_string(), writer_version());
        let props = self
            .config
            .with_hint(hint)
            .writer_properties(batch.schema().as_ref(), &metadata);

        let temp = tempfile::NamedTempFile::new_in(dir)?;
        let mut writer = ArrowWriter::try_new(temp.reopen()?, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        let path = dir.join(fragment_name());
        temp.persist(&path).map_err(|e| StoreError::IoError(e.error))?;
        Ok(path)
    }
}

fn writer_version() -> String {
    format!("scatlas {}", env!("CARGO_PKG_VERSION"))
}

/// Array name of an X layer within a measurement.
pub fn layer_array_name(measurement: &str, layer: &str) -> String {
    format!("ms/{measurement}/X/{layer}")
}

/// Array name of the presence matrix within a measurement.
pub fn presence_array_name(measurement: &str, name: &str) -> String {
    format!("ms/{measurement}/{name}")
}

fn fragment_name() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = FRAGMENT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{nanos:020}-{seq:08}-{}.parquet",
        uuid::Uuid::new_v4().simple()
    )
}

fn coordinate_schema(data_type: &DataType) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(SOMA_DIM_0, DataType::Int64, false),
        Field::new(SOMA_DIM_1, DataType::Int64, false),
        Field::new(SOMA_DATA, data_type.clone(), false),
    ]))
}

fn invalid_fragment(path: &Path, message: &str) -> StoreError {
    StoreError::InvalidFragment {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn int64_column(batch: &RecordBatch, index: usize) -> Result<&Int64Array, StoreError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| {
            StoreError::ArrowError(arrow::error::ArrowError::SchemaError(format!(
                "column {} is not int64",
                batch.schema().field(index).name()
            )))
        })
}

/// Fragment files of `dir` in write order. A missing directory has no fragments.
fn fragment_paths(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_fragment = path.extension().map(|e| e == "parquet").unwrap_or(false)
            && !path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
        if is_fragment {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Read every fragment of `dir` projected to `columns` (root indices into `schema`).
fn read_fragments(
    dir: &Path,
    schema: &SchemaRef,
    columns: Option<&[usize]>,
) -> Result<Vec<RecordBatch>, StoreError> {
    let mut batches = Vec::new();
    for path in fragment_paths(dir)? {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;

        let found = builder.schema().fields().clone();
        let matches = found.len() == schema.fields().len()
            && found
                .iter()
                .zip(schema.fields())
                .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());
        if !matches {
            return Err(invalid_fragment(&path, "schema does not match the manifest"));
        }

        let builder = match columns {
            Some(indices) => {
                let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
                builder.with_projection(mask)
            }
            None => builder,
        };
        for batch in builder.build()? {
            batches.push(batch?);
        }
    }
    Ok(batches)
}

fn read_frame(
    dir: &Path,
    spec: &DataFrameSpec,
    columns: Option<&[&str]>,
) -> Result<RecordBatch, StoreError> {
    let full = Arc::new(spec.arrow_schema());
    let indices: Option<Vec<usize>> = match columns {
        Some(names) => {
            let mut indices = vec![0];
            for name in names {
                let index = full.index_of(name).map_err(|_| StoreError::MissingColumn {
                    frame: dir.display().to_string(),
                    column: name.to_string(),
                })?;
                if index != 0 && !indices.contains(&index) {
                    indices.push(index);
                }
            }
            indices.sort_unstable();
            Some(indices)
        }
        None => None,
    };
    let schema = match &indices {
        Some(indices) => Arc::new(full.project(indices)?),
        None => Arc::clone(&full),
    };

    let batches = read_fragments(dir, &full, indices.as_deref())?;
    let all = concat_batches(&schema, &batches)?;

    // last write wins per index value
    let index = int64_column(&all, 0)?;
    let mut latest: BTreeMap<i64, usize> = BTreeMap::new();
    for row in 0..all.num_rows() {
        latest.insert(index.value(row), row);
    }
    if latest.len() == all.num_rows() && latest.values().enumerate().all(|(i, &r)| i == r) {
        return Ok(all);
    }
    let rows: Vec<usize> = latest.into_values().collect();
    Ok(take_rows(&all, &rows)?)
}

/// Reorder and cast `batch` to the dataframe's schema.
fn conform_frame(
    frame: &str,
    spec: &DataFrameSpec,
    batch: &RecordBatch,
) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(spec.arrow_schema());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let column = match batch.column_by_name(field.name()) {
            Some(column) if column.data_type() == field.data_type() => Arc::clone(column),
            Some(column) => cast(column, field.data_type())?,
            None if field.name() == &spec.index_column => {
                return Err(StoreError::MissingColumn {
                    frame: frame.to_string(),
                    column: field.name().clone(),
                });
            }
            None => new_null_array(field.data_type(), batch.num_rows()),
        };
        columns.push(column);
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn check_index_bounds(
    frame: &str,
    spec: &DataFrameSpec,
    batch: &RecordBatch,
) -> Result<(), StoreError> {
    let index = int64_column(batch, 0)?;
    if let Some(joinid) = index
        .iter()
        .flatten()
        .find(|&v| v < 0 || v as u64 >= spec.domain)
    {
        return Err(StoreError::RowOutOfBounds {
            frame: frame.to_string(),
            joinid,
            domain: spec.domain,
        });
    }
    Ok(())
}
