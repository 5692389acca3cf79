use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use scatlas::dataset::{read_unit_file, Standardizer};

use super::SchemaArgs;

/// Check a unit file against the schema without standardizing it.
///
/// Exits with status 1 when any rule fails.
pub fn run(file: PathBuf, schema: SchemaArgs) -> Result<()> {
    let schema = schema.load()?;
    let standardizer = Standardizer::new(&schema).context("Failed to load the gene universe")?;
    let unit = read_unit_file(&file)
        .with_context(|| format!("Failed to read unit file {}", file.display()))?;
    info!(
        "Checking {} ({} samples, standardized: {})",
        file.display(),
        unit.manifest.sample_names.len(),
        unit.manifest.standardized
    );

    let report = standardizer.check(&unit.into_raw_dataset(), &file.display().to_string());
    println!("{}", report.format_colored());

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
