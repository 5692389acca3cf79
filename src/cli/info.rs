use anyhow::{Context, Result};
use std::path::PathBuf;

use scatlas::store::{Experiment, OpenMode};

/// Display information about an atlas
pub fn run(atlas: PathBuf) -> Result<()> {
    if !Experiment::exists(&atlas) {
        anyhow::bail!("Atlas does not exist: {}", atlas.display());
    }

    let experiment = Experiment::open(&atlas, OpenMode::Read).context("Failed to open atlas")?;
    let manifest = experiment.manifest();

    println!("scatlas Atlas Information");
    println!("=========================");
    println!("Atlas: {}", atlas.display());
    println!("Measurement: {}", manifest.measurement);
    println!();

    // Metadata
    println!("Metadata:");
    for (key, value) in experiment.metadata() {
        println!("  {}: {}", key, value);
    }
    println!();

    // Frames
    println!("Obs: {} rows", manifest.obs.domain);
    for column in &manifest.obs.columns {
        println!("  {} ({})", column.name, column.dtype);
    }
    println!("Var: {} rows", manifest.var.domain);
    println!();

    // Arrays
    println!("Arrays:");
    for (name, array) in &manifest.arrays {
        let domain = experiment
            .non_empty_domain(name)
            .with_context(|| format!("Failed to read array {}", name))?;
        let written = match domain {
            Some([(r0, r1), (c0, c1)]) => format!("written [{r0}..={r1}] x [{c0}..={c1}]"),
            None => "empty".to_string(),
        };
        println!(
            "  {} {:?} {} ({})",
            name, array.shape, array.dtype, written
        );
    }

    Ok(())
}
