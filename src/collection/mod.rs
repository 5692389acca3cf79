//! # Raw Collections
//!
//! A collection enumerates raw input units and loads them as [`RawDataset`]s. Units are
//! addressed by `(group, unit)`:
//!
//! | Collector | Group | Unit |
//! |-----------|-------|------|
//! | [`MtxCollection`] | study directory | sample directory |
//! | [`UnitFileCollection`] | `"files"` | unit file name |
//!
//! Sample identifiers must be unique across the whole collection;
//! [`check_duplicate_samples`] verifies this in one pass before anything is ingested.

pub mod demo;
mod error;
mod files;
mod mtx;


pub use demo::{create_demo_structure, write_mtx_sample};
pub use error::{CollectionError, DuplicateLabelError};
pub use files::{UnitFileCollection, FILES_GROUP};
pub use mtx::MtxCollection;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::dataset::RawDataset;

/// Directory entries containing any of these substrings are skipped when listing.
pub const IGNORE_PATTERNS: &[&str] = &[".DS_Store", ".log"];

/// Source of raw input units.
///
/// Implementations must be shareable across worker threads: every method takes
/// `&self` and loads from storage on each call.
pub trait RawCollector: Send + Sync {
    /// Group names, sorted.
    fn list_groups(&self) -> Result<Vec<String>, CollectionError>;

    /// Unit names within a group, sorted.
    fn list_units(&self, group: &str) -> Result<Vec<String>, CollectionError>;

    /// Load one unit.
    fn get_raw_unit(&self, group: &str, unit: &str) -> Result<RawDataset, CollectionError>;

    /// Every gene name present in a unit's input, before any filtering.
    fn presence_genes(&self, group: &str, unit: &str) -> Result<HashSet<String>, CollectionError>;

    /// Sample identifiers contained in a unit. Defaults to the unit name.
    fn unit_samples(&self, _group: &str, unit: &str) -> Result<Vec<String>, CollectionError> {
        Ok(vec![unit.to_string()])
    }

    /// Every `(group, unit)` pair in listing order.
    fn list_all_units(&self) -> Result<Vec<(String, String)>, CollectionError> {
        let mut units = Vec::new();
        for group in self.list_groups()? {
            for unit in self.list_units(&group)? {
                units.push((group.clone(), unit));
            }
        }
        Ok(units)
    }
}

/// Fail if any sample identifier is owned by more than one unit.
///
/// Builds `sample -> owners` in a single pass and reports every collision at once.
pub fn check_duplicate_samples<C: RawCollector + ?Sized>(
    collector: &C,
) -> Result<(), CollectionError> {
    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (group, unit) in collector.list_all_units()? {
        for sample in collector.unit_samples(&group, &unit)? {
            owners
                .entry(sample)
                .or_default()
                .push(format!("{group}/{unit}"));
        }
    }

    let collisions: BTreeMap<String, Vec<String>> = owners
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .collect();
    if collisions.is_empty() {
        return Ok(());
    }
    for (sample, owners) in &collisions {
        warn!("Sample '{}' appears in: {}", sample, owners.join(", "));
    }
    Err(DuplicateLabelError {
        kind: "sample".to_string(),
        collisions,
    }
    .into())
}

/// Sorted union of every gene name across a collection.
pub fn collect_gene_list<C: RawCollector + ?Sized>(
    collector: &C,
) -> Result<Vec<String>, CollectionError> {
    let mut genes = BTreeSet::new();
    for (group, unit) in collector.list_all_units()? {
        genes.extend(collector.presence_genes(&group, &unit)?);
    }
    info!("Collected {} distinct genes", genes.len());
    Ok(genes.into_iter().collect())
}

/// Write a one-column gene list usable as `core_gene_set_path`.
pub fn write_gene_list(path: &Path, genes: &[String]) -> Result<(), CollectionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)?;
    for gene in genes {
        writer.write_record([gene])?;
    }
    writer.flush()?;
    Ok(())
}

/// Sorted names of the subdirectories of `dir`, skipping [`IGNORE_PATTERNS`].
pub(crate) fn list_subdirectories(dir: &Path) -> Result<Vec<String>, CollectionError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignored(&name) || !entry.file_type()?.is_dir() {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

pub(crate) fn is_ignored(name: &str) -> bool {
    IGNORE_PATTERNS.iter().any(|pattern| name.contains(pattern))
}
