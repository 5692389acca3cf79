//! Directory-of-studies collection with Matrix-Market triples.
//!
//! ```text
//! <root>/
//! └── <study>/
//!     ├── mtx/<sample>/{matrix.mtx, barcodes.tsv, features.tsv}[.gz]
//!     ├── cell_metadata/<study>.tsv[.gz]     # joined on `barcode`
//!     └── sample_metadata/<study>.tsv[.gz]   # joined on `sample_name`
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use log::{debug, info, warn};
use sprs::CsMat;

use super::{list_subdirectories, CollectionError, RawCollector};
use crate::dataset::columns::batch_from_columns;
use crate::dataset::RawDataset;
use crate::schema::{SchemaModel, BARCODE_COLUMN, GENE_COLUMN};
use crate::textio::{find_text_file, open_text, tsv_reader};

const MATRIX_FILE: &str = "matrix.mtx";
const BARCODES_FILE: &str = "barcodes.tsv";
const FEATURES_FILE: &str = "features.tsv";

/// Fill for metadata columns the metadata file does not carry.
const ABSENT_COLUMN_FILL: &str = "Unknown";

/// Collection of studies laid out as Matrix-Market directories.
#[derive(Debug, Clone)]
pub struct MtxCollection {
    root: PathBuf,
    include: Option<Vec<String>>,
    sample_id_column: String,
    cell_columns: Vec<String>,
    sample_columns: Vec<String>,
}

/// Contents of one sample's Matrix-Market directory.
#[derive(Debug, Clone)]
pub struct MtxSample {
    /// Counts, cells x genes (CSR)
    pub matrix: CsMat<f64>,
    /// One barcode per matrix row
    pub barcodes: Vec<String>,
    /// `(feature id, gene symbol)` per matrix column
    pub features: Vec<(String, String)>,
}

impl MtxCollection {
    /// Collection rooted at `root`, joining the metadata columns named by `schema`.
    pub fn new(root: impl Into<PathBuf>, schema: &SchemaModel) -> Self {
        Self {
            root: root.into(),
            include: None,
            sample_id_column: schema.sample_id_column.clone(),
            cell_columns: schema.obs_cell_columns.iter().map(|c| c.name.clone()).collect(),
            sample_columns: schema
                .obs_sample_columns
                .iter()
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    /// Restrict listing to the named studies.
    pub fn with_include(mut self, studies: Vec<String>) -> Self {
        self.include = Some(studies);
        self
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sample_dir(&self, study: &str, sample: &str) -> PathBuf {
        self.root.join(study).join("mtx").join(sample)
    }

    /// Read one sample's matrix, barcodes and features.
    pub fn read_mtx(&self, study: &str, sample: &str) -> Result<MtxSample, CollectionError> {
        let dir = self.sample_dir(study, sample);
        if !dir.is_dir() {
            return Err(CollectionError::UnknownUnit {
                group: study.to_string(),
                unit: sample.to_string(),
            });
        }
        info!("Reading mtx for study: {}, sample: {}", study, sample);

        let barcodes = crate::textio::read_first_column(&require_file(&dir, BARCODES_FILE)?)?;
        let features = read_features(&require_file(&dir, FEATURES_FILE)?)?;
        let matrix = read_matrix_market(&require_file(&dir, MATRIX_FILE)?)?;

        let (cells, genes) = matrix.shape();
        if cells != barcodes.len() || genes != features.len() {
            return Err(CollectionError::ShapeMismatch {
                unit: format!("{study}/{sample}"),
                message: format!(
                    "matrix is {} genes x {} cells but found {} features and {} barcodes",
                    genes,
                    cells,
                    features.len(),
                    barcodes.len()
                ),
            });
        }
        Ok(MtxSample {
            matrix,
            barcodes,
            features,
        })
    }

    fn metadata_path(&self, study: &str, kind: &str) -> Option<PathBuf> {
        find_text_file(&self.root.join(study).join(kind), &format!("{study}.tsv"))
    }
}

impl RawCollector for MtxCollection {
    fn list_groups(&self) -> Result<Vec<String>, CollectionError> {
        let studies = list_subdirectories(&self.root)?;
        match &self.include {
            Some(include) => {
                let filtered: Vec<String> = studies
                    .into_iter()
                    .filter(|study| include.contains(study))
                    .collect();
                info!("Filtered studies using include list: {:?}", filtered);
                Ok(filtered)
            }
            None => Ok(studies),
        }
    }

    fn list_units(&self, group: &str) -> Result<Vec<String>, CollectionError> {
        list_subdirectories(&self.root.join(group).join("mtx"))
    }

    fn get_raw_unit(&self, group: &str, unit: &str) -> Result<RawDataset, CollectionError> {
        let MtxSample {
            matrix,
            barcodes,
            features,
        } = self.read_mtx(group, unit)?;

        let mut obs: Vec<(String, ArrayRef)> = vec![
            (BARCODE_COLUMN.to_string(), strings(barcodes.iter().map(|b| Some(b.as_str())))),
            (
                self.sample_id_column.clone(),
                strings(barcodes.iter().map(|_| Some(unit))),
            ),
        ];

        let cell_metadata = MetadataTable::read(
            self.metadata_path(group, "cell_metadata"),
            BARCODE_COLUMN,
            &self.cell_columns,
        )?;
        obs.extend(cell_metadata.left_join(&barcodes));

        let sample_keys = vec![unit.to_string(); barcodes.len()];
        let sample_metadata = MetadataTable::read(
            self.metadata_path(group, "sample_metadata"),
            &self.sample_id_column,
            &self.sample_columns,
        )?;
        obs.extend(sample_metadata.left_join(&sample_keys));

        let var: Vec<(String, ArrayRef)> = vec![
            (
                GENE_COLUMN.to_string(),
                strings(features.iter().map(|(_, gene)| Some(gene.as_str()))),
            ),
            (
                "ens".to_string(),
                strings(features.iter().map(|(id, _)| Some(id.as_str()))),
            ),
        ];

        Ok(RawDataset::new(
            batch_from_columns(obs, barcodes.len())?,
            batch_from_columns(var, features.len())?,
            matrix,
        ))
    }

    fn presence_genes(&self, group: &str, unit: &str) -> Result<HashSet<String>, CollectionError> {
        let dir = self.sample_dir(group, unit);
        let features = read_features(&require_file(&dir, FEATURES_FILE)?)?;
        Ok(features.into_iter().map(|(_, gene)| gene).collect())
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf, CollectionError> {
    find_text_file(dir, name).ok_or_else(|| CollectionError::MissingFile(dir.join(name)))
}

fn strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

/// Matrix-Market file (genes x cells) as cells x genes CSR.
///
/// `integer` files (raw counts, as written by Cell Ranger) are read as integers and
/// widened; everything else is read as `real`.
pub(crate) fn read_matrix_market(path: &Path) -> Result<CsMat<f64>, CollectionError> {
    let parse_error = |e: sprs::io::IoError| CollectionError::MatrixMarket {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = open_text(path)?;
    let tri: sprs::TriMat<f64> = if matrix_market_field(path)? == "integer" {
        let counts: sprs::TriMat<i64> =
            sprs::io::read_matrix_market_from_bufread(&mut reader).map_err(parse_error)?;
        sprs::TriMat::from_triplets(
            counts.shape(),
            counts.row_inds().to_vec(),
            counts.col_inds().to_vec(),
            counts.data().iter().map(|&v| v as f64).collect(),
        )
    } else {
        sprs::io::read_matrix_market_from_bufread(&mut reader).map_err(parse_error)?
    };
    let genes_by_cells: CsMat<f64> = tri.to_csc();
    Ok(genes_by_cells.transpose_into())
}

/// Field of the `%%MatrixMarket matrix coordinate <field> <symmetry>` banner, lowercased.
fn matrix_market_field(path: &Path) -> Result<String, CollectionError> {
    let mut banner = String::new();
    open_text(path)?.read_line(&mut banner)?;
    Ok(banner
        .split_whitespace()
        .nth(3)
        .unwrap_or_default()
        .to_ascii_lowercase())
}

/// `features.tsv`: feature id, gene symbol, optional feature type.
fn read_features(path: &Path) -> Result<Vec<(String, String)>, CollectionError> {
    let mut reader = tsv_reader(open_text(path)?, false);
    let mut features = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(0).unwrap_or_default().trim().to_string();
        let gene = match record.get(1) {
            Some(gene) => gene.trim().to_string(),
            None => id.clone(),
        };
        features.push((id, gene));
    }
    Ok(features)
}

/// Metadata file indexed by its join key.
struct MetadataTable {
    columns: Vec<String>,
    rows: HashMap<String, Vec<String>>,
}

impl MetadataTable {
    /// Read `path`, keeping `columns` except the key. Columns the file lacks are filled
    /// with "Unknown"; a missing file yields an empty table.
    fn read(path: Option<PathBuf>, key: &str, columns: &[String]) -> Result<Self, CollectionError> {
        let columns: Vec<String> = columns.iter().filter(|c| *c != key).cloned().collect();
        let Some(path) = path else {
            info!("Metadata file not found for key `{}`; columns stay empty", key);
            return Ok(Self {
                columns,
                rows: HashMap::new(),
            });
        };

        let mut reader = tsv_reader(open_text(&path)?, true);
        let headers = reader.headers()?.clone();
        let Some(key_index) = headers.iter().position(|h| h == key) else {
            warn!("{} has no `{}` column; skipping join", path.display(), key);
            return Ok(Self {
                columns,
                rows: HashMap::new(),
            });
        };
        let indices: Vec<Option<usize>> = columns
            .iter()
            .map(|c| headers.iter().position(|h| h == c))
            .collect();

        let mut rows = HashMap::new();
        let mut duplicates = 0usize;
        for record in reader.records() {
            let record = record?;
            let Some(key_value) = record.get(key_index) else {
                continue;
            };
            let values = indices
                .iter()
                .map(|index| match index {
                    Some(i) => record.get(*i).unwrap_or_default().to_string(),
                    None => ABSENT_COLUMN_FILL.to_string(),
                })
                .collect();
            if rows.contains_key(key_value) {
                duplicates += 1;
                continue;
            }
            rows.insert(key_value.to_string(), values);
        }
        if duplicates > 0 {
            warn!(
                "{}: {} duplicate `{}` row(s) ignored",
                path.display(),
                duplicates,
                key
            );
        }
        debug!("Read {} metadata rows from {}", rows.len(), path.display());
        Ok(Self { columns, rows })
    }

    /// One column per metadata column, aligned to `keys`. Unmatched keys are null.
    fn left_join(&self, keys: &[String]) -> Vec<(String, ArrayRef)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let values = keys
                    .iter()
                    .map(|key| self.rows.get(key).map(|row| row[i].as_str()));
                (column.clone(), strings(values))
            })
            .collect()
    }
}
