//! TOML configuration file support.
//!
//! Settings that are tedious to repeat on every run can live in a config file; flags
//! given on the command line take precedence:
//!
//! ```toml
//! # scatlas.toml
//! [ingest]
//! atlas_name = "lung"
//! atlas_storage_dir = "/data/atlases"
//! unit_storage_dir = "/data/units"
//! schema = "lung_schema.toml"
//! workers = 8
//! executor = "parallel"
//! keep_checkpoints = false
//! compression_level = 9
//!
//! [presence]
//! workers = 16
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use scatlas::executor::ExecutorMode;

/// Root configuration structure for scatlas.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Presence computation settings.
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Configuration for the ingest command.
#[derive(Debug, Default, Deserialize)]
pub struct IngestConfig {
    /// Atlas name.
    pub atlas_name: Option<String>,

    /// Parent directory of atlases.
    pub atlas_storage_dir: Option<PathBuf>,

    /// Directory receiving standardized unit files.
    pub unit_storage_dir: Option<PathBuf>,

    /// Checkpoint directory.
    pub checkpoint_dir: Option<PathBuf>,

    /// Schema override file.
    pub schema: Option<PathBuf>,

    /// Validation override file.
    pub validation: Option<PathBuf>,

    /// Worker threads.
    pub workers: Option<usize>,

    /// Serial or parallel scheduling.
    pub executor: Option<ExecutorMode>,

    /// Keep checkpoints after a successful run.
    pub keep_checkpoints: Option<bool>,

    /// ZSTD compression level (1-22).
    pub compression_level: Option<i32>,
}

/// Configuration for the presence command.
#[derive(Debug, Default, Deserialize)]
pub struct PresenceConfig {
    /// Schema override file.
    pub schema: Option<PathBuf>,

    /// Worker threads.
    pub workers: Option<usize>,

    /// Serial or parallel scheduling.
    pub executor: Option<ExecutorMode>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Load `path` when given, else the empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}
