//! # scatlas
//!
//! Command-line front end for curating single-cell collections into an atlas.
//!
//! ## Usage
//!
//! ```bash
//! # Generate a demo collection
//! scatlas demo demo_collection
//!
//! # Ingest it
//! scatlas -v ingest --raw demo_collection --atlas-name demo --atlas-dir atlases
//!
//! # Fill the gene-presence matrix
//! scatlas presence atlases/demo --raw demo_collection
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{dispatch, init_logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), cli.log_file().as_deref())?;

    dispatch(cli)
}
