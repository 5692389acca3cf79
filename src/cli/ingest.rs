use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use scatlas::executor::ExecutorMode;
use scatlas::pipeline::{IngestionPipeline, PipelineConfig};

use super::config::Config;
use super::{Profile, SchemaArgs, SourceArgs, DEFAULT_ATLAS_DIR};

/// Flags of the ingest command.
pub struct IngestArgs {
    pub source: SourceArgs,
    pub include: Vec<String>,
    pub atlas_name: Option<String>,
    pub atlas_dir: Option<PathBuf>,
    pub unit_dir: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
    pub schema: SchemaArgs,
    pub workers: Option<usize>,
    pub serial: bool,
    pub keep_checkpoints: bool,
    pub profile: Profile,
    pub config: Option<PathBuf>,
    pub compression_level: Option<i32>,
}

/// Ingest a collection into an atlas
pub fn run(args: IngestArgs) -> Result<()> {
    let file_config = Config::load(args.config.as_deref())?.ingest;

    let schema_args = SchemaArgs {
        schema: args.schema.schema.or(file_config.schema),
        validation: args.schema.validation.or(file_config.validation),
    };
    let schema = schema_args.load()?;

    let atlas_name = args
        .atlas_name
        .or(file_config.atlas_name)
        .context("--atlas-name is required (or `atlas_name` in the config file)")?;
    let atlas_dir = args
        .atlas_dir
        .or(file_config.atlas_storage_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ATLAS_DIR));
    let unit_dir = args
        .unit_dir
        .or(file_config.unit_storage_dir)
        .unwrap_or_else(|| atlas_dir.join("units").join(&atlas_name));

    let mut config = PipelineConfig::new(atlas_name, atlas_dir, unit_dir);
    config.checkpoint_dir = args.checkpoint_dir.or(file_config.checkpoint_dir);
    config.keep_checkpoints = args.keep_checkpoints || file_config.keep_checkpoints.unwrap_or(false);
    config.executor = if args.serial {
        ExecutorMode::Serial
    } else {
        file_config.executor.unwrap_or_default()
    };
    if let Some(workers) = args.workers.or(file_config.workers) {
        config.workers = workers;
    }
    config.store = args
        .profile
        .store_config(args.compression_level.or(file_config.compression_level));

    let collector = args.source.collector(&schema, &args.include)?;

    info!("scatlas ingest");
    info!("==============");
    info!("Atlas: {}", config.experiment_uri().display());
    info!("Unit files: {}", config.unit_storage_dir.display());
    info!("Profile: {} ({} workers)", args.profile, config.workers);

    let mut pipeline = IngestionPipeline::new(&schema, &*collector, config);
    let summary = pipeline.run().context("Ingestion failed")?;

    println!("Ingestion complete ({})", pipeline.state());
    println!("  Atlas:      {}", pipeline.config().experiment_uri().display());
    println!("  Skipped:    {}", summary.skipped);
    println!("  Converted:  {}", summary.converted);
    println!("  Ingested:   {}", summary.ingested);
    println!("  New cells:  {}", summary.new_obs);
    if summary.num_failures() > 0 {
        println!("  Failures:   {}", summary.num_failures());
        for (unit, reason) in &summary.conversion_failures {
            println!("    {}: {}", unit, reason);
        }
        for (path, reason) in &summary.ingestion_failures {
            println!("    {}: {}", path.display(), reason);
        }
    }
    Ok(())
}
