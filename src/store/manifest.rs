//! `experiment.json`: the only mutable file of an experiment.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use arrow::datatypes::{Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::StoreError;
use crate::schema::{ColumnSpec, LogicalType};

/// Manifest file name inside the experiment directory.
pub const MANIFEST_FILE: &str = "experiment.json";

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "1";

/// A dataframe (obs or var): typed columns indexed by an integer column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrameSpec {
    /// Integer index column, first in every fragment
    pub index_column: String,
    /// Remaining columns in on-disk order
    pub columns: Vec<ColumnSpec>,
    /// Allocated rows; index values must be below this
    pub domain: u64,
    /// Layout hints
    #[serde(default)]
    pub storage: Value,
}

impl DataFrameSpec {
    /// Arrow schema of every fragment.
    pub fn arrow_schema(&self) -> Schema {
        let mut fields = vec![Field::new(
            &self.index_column,
            LogicalType::Int64.data_type(),
            false,
        )];
        fields.extend(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, c.dtype.data_type(), true)),
        );
        Schema::new(fields)
    }
}

/// A two-dimensional sparse array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySpec {
    /// Current shape; coordinates must be below it
    pub shape: [u64; 2],
    /// Value type
    pub dtype: LogicalType,
    /// Layout hints
    #[serde(default)]
    pub storage: Value,
}

/// Persistent description of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentManifest {
    /// Manifest format version
    pub format_version: String,
    /// Measurement holding var, X layers and the presence matrix
    pub measurement: String,
    /// Free-form string metadata
    pub metadata: BTreeMap<String, String>,
    /// Per-cell dataframe
    pub obs: DataFrameSpec,
    /// Per-gene dataframe
    pub var: DataFrameSpec,
    /// Sparse arrays by relative path, e.g. `ms/RNA/X/row_raw`
    pub arrays: BTreeMap<String, ArraySpec>,
}

impl ExperimentManifest {
    /// Read the manifest of the experiment at `root`.
    pub fn load(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(StoreError::NotFound(root.to_path_buf()));
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replace the manifest atomically: write a sibling temp file, then rename.
    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        let mut temp = tempfile::NamedTempFile::new_in(root)?;
        temp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(root.join(MANIFEST_FILE))
            .map_err(|e| StoreError::IoError(e.error))?;
        Ok(())
    }

    /// Look up an array.
    pub fn array(&self, name: &str) -> Result<&ArraySpec, StoreError> {
        self.arrays
            .get(name)
            .ok_or_else(|| StoreError::UnknownArray(name.to_string()))
    }
}
