use std::path::PathBuf;

use arrow::error::ArrowError;

use crate::collection::DuplicateLabelError;
use crate::dataset::ContainerError;
use crate::schema::SchemaConfigError;
use crate::store::StoreError;

/// Errors raised while registering or writing standardized units.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// I/O error while reading or writing the mapping
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Mapping could not be (de)serialized
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Arrow failure while reading labels or assembling obs
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Store failure
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Unit file failure
    #[error("Unit file error: {0}")]
    ContainerError(#[from] ContainerError),

    /// The schema could not provide the gene universe
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaConfigError),

    /// A barcode is owned by more than one unit of the batch
    #[error(transparent)]
    DuplicateLabel(#[from] DuplicateLabelError),

    /// A unit carries a gene outside the frozen universe
    #[error("Gene `{gene}` in {path} is not part of the core gene universe")]
    UnknownGene {
        /// Offending gene
        gene: String,
        /// Unit file
        path: PathBuf,
    },

    /// Only standardized unit files can be registered
    #[error("Unit file {0} is not standardized")]
    NotStandardized(PathBuf),

    /// A unit file was written that the mapping does not know
    #[error("Unit file {0} is not part of the registration mapping")]
    Unregistered(PathBuf),

    /// Unit contents disagree with its registration
    #[error("Unit file {path} does not match its registration: {message}")]
    ShapeMismatch {
        /// Unit file
        path: PathBuf,
        /// Description
        message: String,
    },
}

/// The store rejected growth to the shapes a mapping requires.
///
/// Fatal to the batch, but safe to retry: no coordinates were written.
#[derive(Debug, thiserror::Error)]
pub enum ResizeError {
    /// The underlying store refused the new shape
    #[error("Store {uri} rejected resize: {source}")]
    Rejected {
        /// Experiment location
        uri: PathBuf,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// The mapping was built for a different measurement
    #[error("Mapping targets measurement `{mapping}` but the store holds `{store}`")]
    MeasurementMismatch {
        /// Measurement named by the mapping
        mapping: String,
        /// Measurement of the store
        store: String,
    },
}
