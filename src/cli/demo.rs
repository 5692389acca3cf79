use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use scatlas::collection::create_demo_structure;

/// Generate a demo collection
pub fn run(output: PathBuf) -> Result<()> {
    info!("scatlas - Demo Collection");
    info!("=========================");

    if output.exists() {
        anyhow::bail!("Output already exists: {}", output.display());
    }
    let samples = create_demo_structure(&output).context("Failed to create demo collection")?;

    println!("Created {} samples under {}", samples.len(), output.display());
    for sample in &samples {
        println!("  {}", sample.display());
    }
    println!();
    println!("Try:");
    println!(
        "  scatlas ingest --raw {} --atlas-name demo --atlas-dir demo_atlases",
        output.display()
    );
    Ok(())
}
