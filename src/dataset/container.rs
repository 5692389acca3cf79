//! Intermediate unit files.
//!
//! A unit file is a ZIP archive holding one dataset. The `mimetype` entry comes first
//! and is stored uncompressed so the format can be sniffed; `manifest.json` is
//! deflated; Parquet entries are stored uncompressed since Parquet compresses its own
//! pages. Files are written to a temporary sibling and renamed into place, so a crash
//! never leaves a truncated unit file behind.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int64Array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::columns;
use super::error::ContainerError;
use super::{CellDataset, ExpressionMatrix, RawDataset};
use crate::matrix::{self, Compression};
use crate::schema::{LayerSpec, LogicalType, Orientation};

/// File extension of unit files.
pub const UNIT_FILE_EXTENSION: &str = "scunit";

/// MIME type written as the first archive entry.
pub const UNIT_MIMETYPE: &str = "application/vnd.scatlas.unit";

/// Current unit file format version.
pub const UNIT_FORMAT_VERSION: &str = "1.0";

const MANIFEST_ENTRY: &str = "manifest.json";
const OBS_ENTRY: &str = "obs.parquet";
const VAR_ENTRY: &str = "var.parquet";
const X_ENTRY: &str = "X.parquet";
const RAW_X_ENTRY: &str = "raw/X.parquet";

/// Where a unit came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSource {
    /// Collector group (study or directory)
    pub group: String,
    /// Unit within the group (sample or file)
    pub unit: String,
}

/// Human-readable description of a unit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Unit file format version
    pub format_version: String,
    /// True for standardized datasets
    pub standardized: bool,
    /// Number of cells
    pub n_obs: usize,
    /// Number of genes
    pub n_vars: usize,
    /// True when the primary matrix was supplied dense
    #[serde(default)]
    pub dense_x: bool,
    /// True when a raw slot is present
    #[serde(default)]
    pub has_raw: bool,
    /// Stored layer names
    pub layers: Vec<String>,
    /// Distinct sample identifiers, in order of first appearance
    pub sample_names: Vec<String>,
    /// Provenance
    pub source: Option<UnitSource>,
    /// Creation time
    pub created_on: DateTime<Utc>,
    /// Writing software
    pub writer: String,
}

/// Contents of a unit file.
#[derive(Debug, Clone)]
pub struct UnitFile {
    /// Manifest
    pub manifest: UnitManifest,
    /// Per-cell metadata
    pub obs: RecordBatch,
    /// Per-gene metadata
    pub var: RecordBatch,
    /// Primary matrix
    pub x: ExpressionMatrix,
    /// Raw slot, if stored
    pub raw_x: Option<CsMat<f64>>,
    /// Expression layers
    pub layers: BTreeMap<String, CsMat<f64>>,
}

impl UnitFile {
    /// View as an unvalidated dataset.
    pub fn into_raw_dataset(self) -> RawDataset {
        RawDataset {
            obs: self.obs,
            var: self.var,
            x: Some(self.x),
            raw_x: self.raw_x.map(ExpressionMatrix::Sparse),
            layers: self.layers,
        }
    }

    /// View as a standardized dataset. Fails for raw unit files.
    pub fn into_cell_dataset(self) -> Result<CellDataset, ContainerError> {
        if !self.manifest.standardized {
            return Err(ContainerError::InvalidFormat(
                "unit file is not standardized".to_string(),
            ));
        }
        let x = match self.x {
            ExpressionMatrix::Sparse(m) => m,
            ExpressionMatrix::Dense { rows, cols, values } => matrix::from_dense(rows, cols, &values),
        };
        Ok(CellDataset::from_parts(self.obs, self.var, x, self.layers, true))
    }
}

/// Write a validated or standardized dataset.
pub fn write_unit_file(
    path: &Path,
    dataset: &CellDataset,
    sample_column: &str,
    source: Option<UnitSource>,
) -> Result<UnitManifest, ContainerError> {
    let manifest = UnitManifest {
        format_version: UNIT_FORMAT_VERSION.to_string(),
        standardized: dataset.is_standardized(),
        n_obs: dataset.num_obs(),
        n_vars: dataset.num_vars(),
        dense_x: false,
        has_raw: false,
        layers: dataset.layers().keys().cloned().collect(),
        sample_names: dataset.distinct_obs_values(sample_column).unwrap_or_default(),
        source,
        created_on: Utc::now(),
        writer: format!("scatlas {}", env!("CARGO_PKG_VERSION")),
    };
    let entries = UnitEntries {
        obs: dataset.obs(),
        var: dataset.var(),
        x: dataset.x(),
        raw_x: None,
        layers: dataset.layers(),
    };
    write_archive(path, &manifest, &entries)?;
    Ok(manifest)
}

/// Write an unvalidated dataset, e.g. as input for a file collection.
pub fn write_raw_unit_file(
    path: &Path,
    dataset: &RawDataset,
    sample_column: &str,
) -> Result<UnitManifest, ContainerError> {
    let dense_x = matches!(dataset.x, Some(ExpressionMatrix::Dense { .. }));
    let x = match &dataset.x {
        Some(ExpressionMatrix::Sparse(m)) => m.clone(),
        Some(ExpressionMatrix::Dense { rows, cols, values }) => {
            matrix::from_dense(*rows, *cols, values)
        }
        None => matrix::from_triplets(
            (dataset.obs.num_rows(), dataset.var.num_rows()),
            std::iter::empty(),
            Compression::Csr,
        ),
    };
    let raw_x = match &dataset.raw_x {
        Some(ExpressionMatrix::Sparse(m)) => Some(m.clone()),
        Some(ExpressionMatrix::Dense { rows, cols, values }) => {
            Some(matrix::from_dense(*rows, *cols, values))
        }
        None => None,
    };
    let sample_names = columns::column_strings(&dataset.obs, sample_column)
        .map(|values| {
            let mut seen = std::collections::HashSet::new();
            values.into_iter().filter(|v| seen.insert(v.clone())).collect()
        })
        .unwrap_or_default();

    let manifest = UnitManifest {
        format_version: UNIT_FORMAT_VERSION.to_string(),
        standardized: false,
        n_obs: dataset.obs.num_rows(),
        n_vars: dataset.var.num_rows(),
        dense_x,
        has_raw: raw_x.is_some(),
        layers: dataset.layers.keys().cloned().collect(),
        sample_names,
        source: None,
        created_on: Utc::now(),
        writer: format!("scatlas {}", env!("CARGO_PKG_VERSION")),
    };
    let entries = UnitEntries {
        obs: &dataset.obs,
        var: &dataset.var,
        x: &x,
        raw_x: raw_x.as_ref(),
        layers: &dataset.layers,
    };
    write_archive(path, &manifest, &entries)?;
    Ok(manifest)
}

struct UnitEntries<'a> {
    obs: &'a RecordBatch,
    var: &'a RecordBatch,
    x: &'a CsMat<f64>,
    raw_x: Option<&'a CsMat<f64>>,
    layers: &'a BTreeMap<String, CsMat<f64>>,
}

fn write_archive(
    path: &Path,
    manifest: &UnitManifest,
    entries: &UnitEntries<'_>,
) -> Result<(), ContainerError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp = tempfile::NamedTempFile::new_in(parent)?;
    let mut zip_writer = ZipWriter::new(BufWriter::new(temp.reopen()?));

    // mimetype MUST be uncompressed and first
    let stored = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip_writer.start_file("mimetype", stored)?;
    zip_writer.write_all(UNIT_MIMETYPE.as_bytes())?;

    zip_writer.start_file(MANIFEST_ENTRY, deflated)?;
    zip_writer.write_all(serde_json::to_string_pretty(manifest)?.as_bytes())?;

    let mut add_parquet = |name: &str, batch: &RecordBatch| -> Result<(), ContainerError> {
        let data = encode_parquet(batch)?;
        zip_writer.start_file(name, stored)?;
        zip_writer.write_all(&data)?;
        Ok(())
    };

    add_parquet(OBS_ENTRY, entries.obs)?;
    add_parquet(VAR_ENTRY, entries.var)?;
    add_parquet(X_ENTRY, &coordinates_batch(entries.x)?)?;
    if let Some(raw) = entries.raw_x {
        add_parquet(RAW_X_ENTRY, &coordinates_batch(raw)?)?;
    }
    for (name, layer) in entries.layers {
        add_parquet(&layer_entry(name), &coordinates_batch(layer)?)?;
    }

    let inner = zip_writer.finish()?;
    inner.into_inner().map_err(|e| {
        ContainerError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to flush ZIP buffer: {}", e.error()),
        ))
    })?;
    temp.persist(path).map_err(|e| ContainerError::IoError(e.error))?;

    debug!(
        "Wrote unit file {} ({} x {}, {} layers)",
        path.display(),
        manifest.n_obs,
        manifest.n_vars,
        manifest.layers.len()
    );
    Ok(())
}

fn layer_entry(name: &str) -> String {
    format!("layers/{name}.parquet")
}

fn coordinate_schema() -> Schema {
    Schema::new(vec![
        Field::new("soma_dim_0", DataType::Int64, false),
        Field::new("soma_dim_1", DataType::Int64, false),
        Field::new("soma_data", DataType::Float64, false),
    ])
}

fn coordinates_batch(matrix: &CsMat<f64>) -> Result<RecordBatch, ContainerError> {
    let (rows, cols, values) = matrix::to_coordinates(matrix);
    Ok(RecordBatch::try_new(
        Arc::new(coordinate_schema()),
        vec![
            Arc::new(Int64Array::from(rows)),
            Arc::new(Int64Array::from(cols)),
            Arc::new(Float64Array::from(values)),
        ],
    )?)
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>, ContainerError> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)?;
    writer.write(batch)?;
    Ok(writer.into_inner()?)
}

fn decode_parquet(data: Vec<u8>) -> Result<RecordBatch, ContainerError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ContainerError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(Some(data))
}

fn require_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ContainerError> {
    read_entry(archive, name)?.ok_or_else(|| ContainerError::MissingEntry(name.to_string()))
}

fn matrix_from_batch(
    batch: &RecordBatch,
    shape: (usize, usize),
    storage: Compression,
) -> Result<CsMat<f64>, ContainerError> {
    let column = |i: usize| batch.column(i).as_any();
    let (Some(rows), Some(cols), Some(values)) = (
        column(0).downcast_ref::<Int64Array>(),
        column(1).downcast_ref::<Int64Array>(),
        column(2).downcast_ref::<Float64Array>(),
    ) else {
        return Err(ContainerError::InvalidFormat(
            "coordinate table has unexpected column types".to_string(),
        ));
    };
    let entries = rows
        .values()
        .iter()
        .zip(cols.values().iter())
        .zip(values.values().iter())
        .map(|((&r, &c), &v)| (r as usize, c as usize, v));
    Ok(matrix::from_triplets(shape, entries, storage))
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, ContainerError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mimetype = require_entry(&mut archive, "mimetype")?;
    if mimetype != UNIT_MIMETYPE.as_bytes() {
        return Err(ContainerError::InvalidFormat(path.display().to_string()));
    }
    Ok(archive)
}

/// Read only the manifest of a unit file.
pub fn read_unit_manifest(path: &Path) -> Result<UnitManifest, ContainerError> {
    let mut archive = open_archive(path)?;
    let manifest = require_entry(&mut archive, MANIFEST_ENTRY)?;
    Ok(serde_json::from_slice(&manifest)?)
}

/// Read a whole unit file.
pub fn read_unit_file(path: &Path) -> Result<UnitFile, ContainerError> {
    let mut archive = open_archive(path)?;
    let manifest: UnitManifest =
        serde_json::from_slice(&require_entry(&mut archive, MANIFEST_ENTRY)?)?;
    let shape = (manifest.n_obs, manifest.n_vars);

    let mut obs = decode_parquet(require_entry(&mut archive, OBS_ENTRY)?)?;
    if obs.num_columns() == 0 {
        obs = columns::batch_from_columns(Vec::new(), manifest.n_obs)?;
    }
    let mut var = decode_parquet(require_entry(&mut archive, VAR_ENTRY)?)?;
    if var.num_columns() == 0 {
        var = columns::batch_from_columns(Vec::new(), manifest.n_vars)?;
    }

    let x_batch = decode_parquet(require_entry(&mut archive, X_ENTRY)?)?;
    let x_sparse = matrix_from_batch(&x_batch, shape, Compression::Csr)?;
    let x = if manifest.dense_x {
        let mut values = vec![0.0; shape.0 * shape.1];
        for (&v, (r, c)) in x_sparse.iter() {
            values[r * shape.1 + c] = v;
        }
        ExpressionMatrix::Dense {
            rows: shape.0,
            cols: shape.1,
            values,
        }
    } else {
        ExpressionMatrix::Sparse(x_sparse)
    };

    let raw_x = match read_entry(&mut archive, RAW_X_ENTRY)? {
        Some(data) => Some(matrix_from_batch(&decode_parquet(data)?, shape, Compression::Csr)?),
        None => None,
    };

    let mut layers = BTreeMap::new();
    for name in &manifest.layers {
        let storage = match LayerSpec::new(name.as_str(), LogicalType::Float32).parse_name() {
            Ok((Orientation::Column, _)) => Compression::Csc,
            _ => Compression::Csr,
        };
        let batch = decode_parquet(require_entry(&mut archive, &layer_entry(name))?)?;
        layers.insert(name.clone(), matrix_from_batch(&batch, shape, storage)?);
    }

    Ok(UnitFile {
        manifest,
        obs,
        var,
        x,
        raw_x,
        layers,
    })
}
