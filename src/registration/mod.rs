//! # Registration
//!
//! Assigns global observation indices to every barcode of a batch of standardized unit
//! files and global variable indices to every gene, before anything is written.
//!
//! The protocol is three steps, the first two strictly serial:
//!
//! 1. [`create_registration_mapping`] reads each unit's labels. Barcodes already in the
//!    store keep their index; new ones continue after the store's current obs domain.
//!    Genes map through the frozen [`GeneUniverse`](crate::schema::GeneUniverse).
//! 2. [`resize_store`] grows obs and every X layer to the mapping's shapes, once.
//! 3. [`write_unit`] writes one unit at its pre-assigned coordinates. Units touch
//!    disjoint rows, so writes may run in parallel.
//!
//! The mapping serializes to JSON so an interrupted run can resume at step 3.

mod error;
mod resize;
mod write;

#[cfg(test)]
mod tests;

pub use error::{RegistrationError, ResizeError};
pub use resize::resize_store;
pub use write::write_unit;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use arrow::array::{Array, Int64Array};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::collection::DuplicateLabelError;
use crate::dataset::{columns, read_unit_file};
use crate::schema::{SchemaModel, BARCODE_COLUMN, GENE_COLUMN};
use crate::store::{Experiment, OpenMode};

/// Global indices of one unit file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRegistration {
    /// Unit file
    pub path: PathBuf,
    /// Global obs index of each cell, in file order
    pub obs_joinids: Vec<i64>,
    /// Global var index of each gene, in file order
    pub var_joinids: Vec<i64>,
    /// Cells that were not yet in the store
    pub new_obs: usize,
}

/// Batch-scoped assignment of global indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMapping {
    /// Measurement the var indices belong to
    pub measurement: String,
    /// Obs domain of the store when the mapping was built
    pub existing_obs_count: u64,
    /// Var count per measurement
    pub var_counts: BTreeMap<String, u64>,
    /// Per-unit indices, in input order
    pub units: Vec<UnitRegistration>,
}

impl RegistrationMapping {
    /// Obs rows the store must hold before any unit is written.
    pub fn required_obs_count(&self) -> u64 {
        let highest = self
            .units
            .iter()
            .flat_map(|unit| unit.obs_joinids.iter())
            .max()
            .map(|&joinid| joinid as u64 + 1)
            .unwrap_or(0);
        highest.max(self.existing_obs_count)
    }

    /// Var columns a measurement must hold.
    pub fn required_var_count(&self, measurement: &str) -> u64 {
        self.var_counts.get(measurement).copied().unwrap_or(0)
    }

    /// Registration of one unit file.
    pub fn unit(&self, path: &Path) -> Option<&UnitRegistration> {
        self.units.iter().find(|unit| unit.path == path)
    }

    /// Registered unit files.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.units.iter().map(|unit| unit.path.as_path())
    }

    /// Barcodes new to the store across the batch.
    pub fn new_obs_count(&self) -> usize {
        self.units.iter().map(|unit| unit.new_obs).sum()
    }

    /// Persist as JSON, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), RegistrationError> {
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut temp, self)?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|e| RegistrationError::IoError(e.error))?;
        Ok(())
    }

    /// Load a mapping written by [`Self::save`].
    pub fn load(path: &Path) -> Result<Self, RegistrationError> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Build the registration mapping for `paths` against the experiment at `uri`.
///
/// The experiment does not need to exist yet; indices then start at zero. Duplicate
/// barcodes within the batch are reported together as a [`DuplicateLabelError`].
pub fn create_registration_mapping(
    uri: &Path,
    paths: &[PathBuf],
    schema: &SchemaModel,
) -> Result<RegistrationMapping, RegistrationError> {
    let universe = schema.gene_universe()?;

    let (mut existing, existing_obs_count) = if Experiment::exists(uri) {
        let experiment = Experiment::open(uri, OpenMode::Read)?;
        let obs = experiment.read_obs_columns(&[BARCODE_COLUMN])?;
        let barcodes = columns::column_strings(&obs, BARCODE_COLUMN)?;
        let joinids = obs
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.values().to_vec())
            .unwrap_or_default();
        let known: HashMap<String, i64> = barcodes.into_iter().zip(joinids).collect();
        (known, experiment.obs_domain())
    } else {
        (HashMap::new(), 0)
    };
    debug!(
        "Registering {} units against {} existing barcodes",
        paths.len(),
        existing.len()
    );

    let mut next = existing_obs_count as i64;
    let mut owners: HashMap<String, usize> = HashMap::new();
    let mut collisions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut units = Vec::with_capacity(paths.len());

    for (position, path) in paths.iter().enumerate() {
        let unit = read_unit_file(path)?;
        if !unit.manifest.standardized {
            return Err(RegistrationError::NotStandardized(path.clone()));
        }

        let mut obs_joinids = Vec::with_capacity(unit.obs.num_rows());
        let mut new_obs = 0;
        for barcode in columns::column_strings(&unit.obs, BARCODE_COLUMN)? {
            if let Some(&owner) = owners.get(&barcode) {
                let entry = collisions.entry(barcode.clone()).or_default();
                if entry.is_empty() {
                    entry.push(paths[owner].display().to_string());
                }
                entry.push(path.display().to_string());
                continue;
            }
            owners.insert(barcode.clone(), position);

            let joinid = match existing.get(&barcode) {
                Some(&joinid) => joinid,
                None => {
                    let joinid = next;
                    next += 1;
                    new_obs += 1;
                    existing.insert(barcode, joinid);
                    joinid
                }
            };
            obs_joinids.push(joinid);
        }

        let mut var_joinids = Vec::with_capacity(unit.var.num_rows());
        for gene in columns::column_strings(&unit.var, GENE_COLUMN)? {
            match universe.index_of(&gene) {
                Some(index) => var_joinids.push(index as i64),
                None => {
                    return Err(RegistrationError::UnknownGene {
                        gene,
                        path: path.clone(),
                    })
                }
            }
        }

        units.push(UnitRegistration {
            path: path.clone(),
            obs_joinids,
            var_joinids,
            new_obs,
        });
    }

    if !collisions.is_empty() {
        return Err(DuplicateLabelError {
            kind: BARCODE_COLUMN.to_string(),
            collisions,
        }
        .into());
    }

    let mapping = RegistrationMapping {
        measurement: schema.measurement_name.clone(),
        existing_obs_count,
        var_counts: BTreeMap::from([(
            schema.measurement_name.clone(),
            universe.num_genes() as u64,
        )]),
        units,
    };
    info!(
        "Registered {} units: {} new cells, obs shape {}",
        mapping.units.len(),
        mapping.new_obs_count(),
        mapping.required_obs_count()
    );
    Ok(mapping)
}
