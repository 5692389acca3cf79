use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use arrow::error::ArrowError;

use crate::dataset::ContainerError;

/// Errors raised while reading raw units from a collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed tab-separated file
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Malformed Matrix-Market file
    #[error("Matrix-Market error in {path}: {message}")]
    MatrixMarket {
        /// Offending file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Arrow failure while assembling obs/var tables
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Unit file could not be read
    #[error("Unit file error: {0}")]
    ContainerError(#[from] ContainerError),

    /// A required input file is absent
    #[error("Missing input file: {0}")]
    MissingFile(PathBuf),

    /// Group or unit does not exist in the collection
    #[error("Unknown unit {group}/{unit}")]
    UnknownUnit {
        /// Group name
        group: String,
        /// Unit name
        unit: String,
    },

    /// Matrix dimensions disagree with barcodes/features
    #[error("Shape mismatch in {unit}: {message}")]
    ShapeMismatch {
        /// Unit label
        unit: String,
        /// Description
        message: String,
    },

    /// Labels collided across groups
    #[error(transparent)]
    DuplicateLabel(#[from] DuplicateLabelError),
}

/// The same label is owned by more than one unit or group.
///
/// Every collision is collected before the error is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct DuplicateLabelError {
    /// Label kind, e.g. `sample` or `barcode`
    pub kind: String,
    /// Colliding label -> every owner
    pub collisions: BTreeMap<String, Vec<String>>,
}

impl fmt::Display for DuplicateLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Found duplicate {} names:", self.kind)?;
        for (label, owners) in &self.collisions {
            write!(f, " `{}` in [{}];", label, owners.join(", "))?;
        }
        write!(f, " each {} name must be unique", self.kind)
    }
}
