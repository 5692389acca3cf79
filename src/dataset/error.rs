use std::fmt;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use super::report::ValidationReport;
use crate::schema::SchemaConfigError;

/// A dataset violated one or more schema rules.
///
/// Carries the full report so every violation is visible at once.
#[derive(Debug, thiserror::Error)]
pub struct SchemaValidationError {
    /// All checks, including the failed ones
    pub report: ValidationReport,
}

impl SchemaValidationError {
    /// Failed-rule messages joined with newlines.
    pub fn violations(&self) -> String {
        self.report.failures().collect::<Vec<_>>().join("\n")
    }
}

impl fmt::Display for SchemaValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset {} failed validation:\n{}",
            self.report.subject,
            self.violations()
        )
    }
}

/// Errors raised while reshaping a validated dataset.
#[derive(Debug, thiserror::Error)]
pub enum StandardizeError {
    /// Arrow kernel failure
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Schema could not be resolved (gene universe, layer names)
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaConfigError),

    /// A required column vanished between validation and standardization
    #[error("Missing column `{0}`")]
    MissingColumn(String),
}

/// Errors reading or writing unit container files.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from the ZIP container library
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Parquet encode/decode failure
    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    /// Arrow failure
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Error serializing/deserializing JSON
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Mimetype entry missing or unexpected
    #[error("Not a scatlas unit file: {0}")]
    InvalidFormat(String),

    /// A required entry is missing from the archive
    #[error("Missing entry `{0}` in unit file")]
    MissingEntry(String),
}
