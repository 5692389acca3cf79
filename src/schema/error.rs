use std::path::PathBuf;

/// Errors raised while loading or checking a schema.
///
/// These are fatal at load time: nothing downstream can run against a broken schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaConfigError {
    /// The override file could not be read
    #[error("Cannot read schema override {path}: {source}")]
    Read {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The override file is not valid TOML
    #[error("Cannot parse schema override as TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The override file is not valid JSON
    #[error("Cannot parse schema override as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The override's top level is not a mapping
    #[error("Schema override must be a mapping at the top level, found {0}")]
    NotAMapping(String),

    /// A logical type string is not part of the type enumeration
    #[error("Unknown logical type: {0}")]
    UnknownType(String),

    /// A required validation column is missing after merge
    #[error("Validation settings must require `{column}` in {table}")]
    MissingRequiredColumn {
        /// Table name (`obs` or `var`)
        table: &'static str,
        /// Column that must be required
        column: &'static str,
    },

    /// Gene intersection threshold outside [0, 1]
    #[error("gene_intersection_threshold_frac must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    /// Index columns must be integer typed
    #[error("Index column `{0}` must have an integer type")]
    NonIntegerIndex(String),

    /// Layer name not of the form `row_raw`, `col_norm`, ...
    #[error("Invalid layer name `{0}`: expected row_/col_ prefix and _raw/_norm suffix")]
    InvalidLayerName(String),

    /// Expression and presence layers must hold numeric values
    #[error("Layer `{name}` must have a numeric type, found {dtype}")]
    NonNumericLayer {
        /// Layer name
        name: String,
        /// Configured type
        dtype: String,
    },

    /// A structural field is empty or absent after merge
    #[error("Schema field `{0}` is missing or empty")]
    MissingField(&'static str),

    /// A computed column names a function that is not registered
    #[error("No computed-column function `{function}` registered for column `{column}`")]
    UnknownComputedColumn {
        /// Computed column name
        column: String,
        /// Function key that failed to resolve
        function: String,
    },

    /// The gene list could not be read
    #[error("Cannot read core gene set {path}: {message}")]
    GeneList {
        /// Gene list path
        path: PathBuf,
        /// Reason
        message: String,
    },

    /// The gene list contained no genes
    #[error("Core gene set {0} is empty")]
    EmptyGeneList(PathBuf),
}
