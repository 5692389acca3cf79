use anyhow::{Context, Result};

use super::SchemaArgs;

/// Print the merged schema as JSON
pub fn run(schema: SchemaArgs) -> Result<()> {
    let model = schema.load()?;
    let universe = model
        .gene_universe()
        .context("Failed to load the core gene set")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&model).context("Failed to serialize schema")?
    );
    eprintln!("Core genes: {}", universe.num_genes());
    Ok(())
}
