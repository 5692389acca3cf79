//! Flat directory of standalone unit files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{is_ignored, CollectionError, RawCollector};
use crate::dataset::{read_unit_file, read_unit_manifest, RawDataset, UNIT_FILE_EXTENSION};
use crate::schema::GENE_COLUMN;

/// The single group of a [`UnitFileCollection`].
pub const FILES_GROUP: &str = "files";

/// Directory of `*.scunit` files, one unit per file.
#[derive(Debug, Clone)]
pub struct UnitFileCollection {
    root: PathBuf,
}

impl UnitFileCollection {
    /// Collection over the unit files directly inside `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unit_path(&self, group: &str, unit: &str) -> Result<PathBuf, CollectionError> {
        let path = self.root.join(unit);
        if group != FILES_GROUP || !path.is_file() {
            return Err(CollectionError::UnknownUnit {
                group: group.to_string(),
                unit: unit.to_string(),
            });
        }
        Ok(path)
    }
}

impl RawCollector for UnitFileCollection {
    fn list_groups(&self) -> Result<Vec<String>, CollectionError> {
        Ok(vec![FILES_GROUP.to_string()])
    }

    fn list_units(&self, group: &str) -> Result<Vec<String>, CollectionError> {
        if group != FILES_GROUP {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let is_unit = path
                .extension()
                .map(|ext| ext == UNIT_FILE_EXTENSION)
                .unwrap_or(false);
            if is_unit && path.is_file() && !is_ignored(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn get_raw_unit(&self, group: &str, unit: &str) -> Result<RawDataset, CollectionError> {
        let path = self.unit_path(group, unit)?;
        Ok(read_unit_file(&path)?.into_raw_dataset())
    }

    fn presence_genes(&self, group: &str, unit: &str) -> Result<HashSet<String>, CollectionError> {
        let dataset = self.get_raw_unit(group, unit)?;
        Ok(crate::dataset::columns::column_strings(&dataset.var, GENE_COLUMN)?
            .into_iter()
            .collect())
    }

    fn unit_samples(&self, group: &str, unit: &str) -> Result<Vec<String>, CollectionError> {
        let manifest = read_unit_manifest(&self.unit_path(group, unit)?)?;
        if manifest.sample_names.is_empty() {
            let stem = Path::new(unit)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| unit.to_string());
            return Ok(vec![stem]);
        }
        Ok(manifest.sample_names)
    }
}
