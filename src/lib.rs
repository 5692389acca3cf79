//! # scatlas - Single-Cell Atlas Curation
//!
//! `scatlas` validates heterogeneous single-cell RNA-seq datasets against a declarative
//! schema, standardizes them onto a fixed core gene universe, and appends them to a
//! shared columnar atlas with stable global cell and gene indices.
//!
//! ## Key Features
//!
//! - **Schema-Driven**: One [`schema::SchemaModel`] declares obs/var columns, logical
//!   types, stored expression layers and validation rules. Overrides are TOML or JSON.
//!
//! - **Fixed Gene Universe**: Genes are indexed by a sorted core gene list shared by every
//!   worker; standardized datasets keep only genes inside that universe.
//!
//! - **Append-Only Store**: Parquet fragments under an experiment directory; cells get
//!   dense global indices that never change once assigned.
//!
//! - **Resumable Ingestion**: A checkpointed state machine that tolerates per-unit
//!   failures and skips samples already in the atlas.
//!
//! - **Gene Presence**: A per-sample record of which core genes appeared in the raw input,
//!   filled incrementally.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scatlas::collection::MtxCollection;
//! use scatlas::pipeline::{IngestionPipeline, PipelineConfig};
//! use scatlas::schema::load_schema;
//!
//! let schema = load_schema(None)?;
//! let collection = MtxCollection::new("raw_studies", &schema);
//! let config = PipelineConfig::new("lung", "atlases", "units");
//!
//! let summary = IngestionPipeline::new(&schema, &collection, config).run()?;
//! println!("Ingested {} units, {} new cells", summary.ingested, summary.new_obs);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! This creates a directory structure:
//! ```text
//! atlases/lung/
//! ├── experiment.json                # shapes, types, metadata
//! ├── obs/*.parquet                  # per-cell metadata fragments
//! └── ms/RNA/
//!     ├── var/*.parquet              # the core gene universe
//!     ├── X/{row_raw,row_norm,...}/  # expression coordinates
//!     └── feature_presence_matrix/   # per-sample presence rows
//! ```
//!
//! ## Architecture
//!
//! - [`schema`]: Schema model, overrides, core gene universe, computed columns
//! - [`matrix`]: Sparse matrix helpers and log-normalization
//! - [`dataset`]: Validation, standardization, intermediate unit files
//! - [`collection`]: Raw input collectors
//! - [`store`]: Append-only experiment store
//! - [`registration`]: Global index assignment, store resizing, per-unit writes
//! - [`executor`]: Serial and parallel task executors
//! - [`pipeline`]: The ingestion state machine
//! - [`presence`]: Gene-presence matrix computation

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
// Allow some patterns common in scientific code
#![allow(clippy::too_many_arguments)]

pub mod collection;
pub mod dataset;
pub mod executor;
pub mod matrix;
pub mod pipeline;
pub mod presence;
pub mod registration;
pub mod schema;
pub mod store;

mod textio;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::collection::{
        check_duplicate_samples, CollectionError, MtxCollection, RawCollector,
        UnitFileCollection,
    };
    pub use crate::dataset::{
        read_unit_file, write_unit_file, CellDataset, RawDataset, Standardizer,
        ValidationReport,
    };
    pub use crate::executor::{AnyExecutor, Executor, ExecutorMode};
    pub use crate::matrix::normalize;
    pub use crate::pipeline::{
        IngestionPipeline, PipelineConfig, PipelineError, PipelineState, PipelineSummary,
    };
    pub use crate::presence::{presence_row, PresenceMatrixComputer};
    pub use crate::registration::{
        create_registration_mapping, resize_store, write_unit, RegistrationMapping,
    };
    pub use crate::schema::{load_schema, GeneUniverse, SchemaModel};
    pub use crate::store::{Experiment, OpenMode, StoreConfig};
}
