use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

mod demo;
mod genes;
mod info;
mod ingest;
mod presence;
mod schema;
mod validate;

mod config;
mod profile;

pub use profile::Profile;

use scatlas::pipeline::PipelineConfig;

/// Parent directory of atlases when neither a flag nor the config file names one.
pub const DEFAULT_ATLAS_DIR: &str = "atlases";

/// scatlas - Single-Cell Atlas Curation and Ingestion
#[derive(Parser)]
#[command(name = "scatlas")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Append log output to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Storage profile for speed vs compression.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ProfileArg {
    /// Prioritize speed over compression
    Fast,
    /// Balance between speed and compression
    #[default]
    Balanced,
    /// Maximum compression, slower ingestion
    MaxCompression,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Fast => Profile::Fast,
            ProfileArg::Balanced => Profile::Balanced,
            ProfileArg::MaxCompression => Profile::MaxCompression,
        }
    }
}

/// Where raw units are read from.
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Directory of studies (`<study>/mtx/<sample>/`)
    #[arg(long, value_name = "DIR")]
    raw: Option<PathBuf>,

    /// Directory of standalone unit files
    #[arg(long, value_name = "DIR")]
    units: Option<PathBuf>,
}

/// Schema override files.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SchemaArgs {
    /// Schema override file (TOML or JSON)
    #[arg(long, value_name = "FILE")]
    schema: Option<PathBuf>,

    /// Validation override file (TOML or JSON)
    #[arg(long, value_name = "FILE")]
    validation: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, standardize and ingest a collection into an atlas
    Ingest {
        #[command(flatten)]
        source: SourceArgs,

        /// Only ingest these studies (directory-of-studies input)
        #[arg(long, value_name = "STUDY", num_args = 1..)]
        include: Vec<String>,

        /// Atlas name
        #[arg(long)]
        atlas_name: Option<String>,

        /// Parent directory of atlases
        #[arg(long, value_name = "DIR")]
        atlas_dir: Option<PathBuf>,

        /// Directory receiving standardized unit files
        #[arg(long, value_name = "DIR")]
        unit_dir: Option<PathBuf>,

        /// Checkpoint directory (defaults to <atlas-dir>/checkpoints/<atlas-name>)
        #[arg(long, value_name = "DIR")]
        checkpoint_dir: Option<PathBuf>,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Worker threads
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Run every stage on the calling thread
        #[arg(long)]
        serial: bool,

        /// Keep checkpoints after a successful run
        #[arg(long)]
        keep_checkpoints: bool,

        /// Write the log to <atlas-dir>/logs/<atlas-name>.log unless --log-file is given
        #[arg(long, requires = "atlas_name")]
        log_to_atlas: bool,

        /// Storage profile (fast, balanced, max-compression)
        #[arg(short = 'p', long, default_value = "balanced", value_enum)]
        profile: ProfileArg,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        // === Advanced tuning flags (hidden from --help) ===
        /// Compression level for ZSTD (1-22, default: profile-dependent)
        #[arg(short = 'c', long, hide = true)]
        compression_level: Option<i32>,
    },

    /// Fill missing gene-presence rows of an atlas
    Presence {
        /// Atlas directory
        #[arg(value_name = "ATLAS")]
        atlas: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Schema override file (TOML or JSON)
        #[arg(long, value_name = "FILE")]
        schema: Option<PathBuf>,

        /// Worker threads
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Run every task on the calling thread
        #[arg(long)]
        serial: bool,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Validate a unit file against the schema
    Validate {
        /// Unit file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Print the merged schema as JSON
    Schema {
        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Write the sorted union of every gene in a collection
    Genes {
        #[command(flatten)]
        source: SourceArgs,

        /// Output gene list (one gene per line)
        #[arg(short, long, value_name = "FILE", default_value = "genes.tsv")]
        output: PathBuf,
    },

    /// Display metadata and shapes of an atlas
    Info {
        /// Atlas directory
        #[arg(value_name = "ATLAS")]
        atlas: PathBuf,
    },

    /// Generate a demo directory-of-studies collection
    Demo {
        /// Output directory
        #[arg(value_name = "OUTPUT", default_value = "demo_collection")]
        output: PathBuf,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// Log sink requested on the command line, if any.
    pub fn log_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.log_file {
            return Some(path.clone());
        }
        match &self.command {
            Commands::Ingest {
                log_to_atlas: true,
                atlas_name: Some(name),
                atlas_dir,
                ..
            } => {
                let atlas_dir = atlas_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ATLAS_DIR));
                let config = PipelineConfig::new(name.clone(), atlas_dir, PathBuf::new());
                Some(config.log_file())
            }
            _ => None,
        }
    }
}

pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            source,
            include,
            atlas_name,
            atlas_dir,
            unit_dir,
            checkpoint_dir,
            schema,
            workers,
            serial,
            keep_checkpoints,
            profile,
            config,
            compression_level,
            ..
        } => ingest::run(ingest::IngestArgs {
            source,
            include,
            atlas_name,
            atlas_dir,
            unit_dir,
            checkpoint_dir,
            schema,
            workers,
            serial,
            keep_checkpoints,
            profile: Profile::from(profile),
            config,
            compression_level,
        }),
        Commands::Presence {
            atlas,
            source,
            schema,
            workers,
            serial,
            config,
        } => presence::run(atlas, source, schema, workers, serial, config),
        Commands::Validate { file, schema } => validate::run(file, schema),
        Commands::Schema { schema } => schema::run(schema),
        Commands::Genes { source, output } => genes::run(source, output),
        Commands::Info { atlas } => info::run(atlas),
        Commands::Demo { output } => demo::run(output),
    }
}

impl SchemaArgs {
    /// Load the default schema merged with the override files.
    pub fn load(&self) -> Result<scatlas::schema::SchemaModel> {
        scatlas::schema::load_schema_files(self.schema.as_deref(), self.validation.as_deref())
            .context("Failed to load schema")
    }
}

impl SourceArgs {
    /// Build the collector for the selected input.
    pub fn collector(
        &self,
        schema: &scatlas::schema::SchemaModel,
        include: &[String],
    ) -> Result<Box<dyn scatlas::collection::RawCollector>> {
        use scatlas::collection::{MtxCollection, UnitFileCollection};

        match (&self.raw, &self.units) {
            (Some(raw), _) => {
                let mut collection = MtxCollection::new(raw, schema);
                if !include.is_empty() {
                    collection = collection.with_include(include.to_vec());
                }
                Ok(Box::new(collection))
            }
            (None, Some(units)) => Ok(Box::new(UnitFileCollection::new(units))),
            (None, None) => anyhow::bail!("Either --raw or --units is required"),
        }
    }
}
