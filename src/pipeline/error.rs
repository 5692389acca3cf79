use std::path::PathBuf;

use crate::collection::CollectionError;
use crate::dataset::{ContainerError, SchemaValidationError, StandardizeError};
use crate::registration::{RegistrationError, ResizeError};
use crate::schema::SchemaConfigError;
use crate::store::StoreError;

/// Errors that abort an ingestion run.
///
/// Raised by the serial stages and the pre-checks; per-unit failures of the parallel
/// stages are collected in the summary instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// I/O error on checkpoints or output directories
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Checkpoint could not be (de)serialized
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// The schema could not provide the gene universe
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaConfigError),

    /// Listing or duplicate pre-check failed
    #[error("Collection error: {0}")]
    CollectionError(#[from] CollectionError),

    /// Store failure during a serial stage
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Registration failed
    #[error("Registration failed: {0}")]
    RegistrationError(#[from] RegistrationError),

    /// The store refused to grow
    #[error("Resize failed: {0}")]
    ResizeError(#[from] ResizeError),

    /// The store was built against a different core gene universe
    #[error(
        "Store {uri} holds {found} genes but the schema defines {expected}; \
         the store must be migrated before ingesting with this schema"
    )]
    SchemaMismatch {
        /// Experiment location
        uri: PathBuf,
        /// Genes in the schema's universe
        expected: usize,
        /// Genes in the store's var
        found: usize,
    },

    /// Every pending unit failed conversion
    #[error("No unit converted successfully ({failures} failures); aborting")]
    NothingConverted {
        /// Number of failed conversions
        failures: usize,
    },
}

/// Why one unit failed conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The raw unit could not be loaded
    #[error("{0}")]
    Collection(#[from] CollectionError),

    /// The unit violates the schema
    #[error("{0}")]
    Validation(#[from] SchemaValidationError),

    /// Standardization failed
    #[error("{0}")]
    Standardize(#[from] StandardizeError),

    /// The unit file could not be written
    #[error("{0}")]
    Container(#[from] ContainerError),
}
