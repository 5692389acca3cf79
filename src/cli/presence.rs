use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use scatlas::executor::{AnyExecutor, ExecutorMode};
use scatlas::presence::PresenceMatrixComputer;

use super::config::Config;
use super::{SchemaArgs, SourceArgs};

const DEFAULT_WORKERS: usize = 4;

/// Fill missing presence rows of an atlas
pub fn run(
    atlas: PathBuf,
    source: SourceArgs,
    schema: Option<PathBuf>,
    workers: Option<usize>,
    serial: bool,
    config: Option<PathBuf>,
) -> Result<()> {
    let file_config = Config::load(config.as_deref())?.presence;
    let schema = SchemaArgs {
        schema: schema.or(file_config.schema),
        validation: None,
    }
    .load()?;

    let mode = if serial {
        ExecutorMode::Serial
    } else {
        file_config.executor.unwrap_or_default()
    };
    let workers = workers.or(file_config.workers).unwrap_or(DEFAULT_WORKERS);
    let collector = source.collector(&schema, &[])?;

    info!("Computing presence matrix for {}", atlas.display());
    let computer =
        PresenceMatrixComputer::new(&schema, &*collector, AnyExecutor::new(mode, workers));
    let summary = computer
        .compute(&atlas)
        .with_context(|| format!("Presence computation failed for {}", atlas.display()))?;

    println!("Presence matrix: {}", atlas.display());
    println!("  Samples:   {}", summary.known_samples);
    println!("  Computed:  {}", summary.computed);
    println!("  Skipped:   {}", summary.skipped);
    if !summary.failures.is_empty() {
        println!("  Failures:  {}", summary.failures.len());
        for (sample, reason) in &summary.failures {
            println!("    {}: {}", sample, reason);
        }
    }
    Ok(())
}
