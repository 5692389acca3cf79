use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use scatlas::collection::{collect_gene_list, write_gene_list};
use scatlas::schema::SchemaModel;

use super::SourceArgs;

/// Write the union of every gene in a collection
pub fn run(source: SourceArgs, output: PathBuf) -> Result<()> {
    let schema = SchemaModel::default();
    let collector = source.collector(&schema, &[])?;

    info!("Collecting genes...");
    let genes = collect_gene_list(&*collector).context("Failed to collect genes")?;
    write_gene_list(&output, &genes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote {} genes to {}", genes.len(), output.display());
    Ok(())
}
