use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Errors raised by the experiment store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Parquet encode/decode failure
    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    /// Arrow failure
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// The schema could not provide the gene universe
    #[error("Schema error: {0}")]
    Schema(#[from] crate::schema::SchemaConfigError),

    /// Manifest could not be (de)serialized
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// An experiment already exists at the location
    #[error("Experiment already exists: {0}")]
    AlreadyExists(PathBuf),

    /// No experiment at the location
    #[error("Experiment not found: {0}")]
    NotFound(PathBuf),

    /// Mutation attempted through a read-only handle
    #[error("Experiment {0} is open read-only")]
    ReadOnly(PathBuf),

    /// Array name not present in the manifest
    #[error("Unknown array `{0}`")]
    UnknownArray(String),

    /// Coordinate outside the array's current shape
    #[error("Coordinate ({row}, {col}) is outside `{array}` with shape {shape:?}")]
    OutOfBounds {
        /// Array written to
        array: String,
        /// First dimension coordinate
        row: i64,
        /// Second dimension coordinate
        col: i64,
        /// Current shape
        shape: [u64; 2],
    },

    /// Dataframe row outside the current domain
    #[error("Row `{joinid}` is outside `{frame}` with {domain} rows")]
    RowOutOfBounds {
        /// Dataframe written to
        frame: String,
        /// Offending index value
        joinid: i64,
        /// Current domain size
        domain: u64,
    },

    /// Growth request smaller than the current shape
    #[error("Cannot shrink `{array}` from {current:?} to {requested:?}")]
    Shrink {
        /// Array or dataframe name
        array: String,
        /// Current shape
        current: [u64; 2],
        /// Requested shape
        requested: [u64; 2],
    },

    /// A batch lacks a column the store requires
    #[error("Missing column `{column}` when writing `{frame}`")]
    MissingColumn {
        /// Dataframe written to
        frame: String,
        /// Missing column name
        column: String,
    },

    /// A fragment does not match the stored schema
    #[error("Invalid fragment {path}: {message}")]
    InvalidFragment {
        /// Fragment file
        path: PathBuf,
        /// Description
        message: String,
    },
}
