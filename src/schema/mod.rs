//! # Atlas Schema
//!
//! The [`SchemaModel`] is the declarative description of an atlas: which obs (cell) and
//! var (gene) columns exist and with which logical types, which expression layers are
//! stored, how datasets are validated, and which core gene universe defines the var
//! index.
//!
//! ## Column Groups
//!
//! | Group | Default columns | Purpose |
//! |-------|-----------------|---------|
//! | obs index | soma_joinid (int64) | Global observation index |
//! | obs cell | barcode, cell_type | Per-cell metadata |
//! | obs sample | sample_name, scrnaseq_protocol, study_name | Per-sample metadata |
//! | obs computed | nnz, umi_counts, pct_mito, pct_ribo | Derived from the count matrix |
//! | var index | soma_joinid (int64) | Global variable index |
//! | var | gene, ens | Gene metadata |
//!
//! Groups are ordered: column order on disk is index, cell, sample, computed.
//!
//! ## Loading
//!
//! [`load_schema`] starts from the built-in defaults and applies an optional TOML or
//! JSON override file (see [`SchemaOverride`] for the merge rules). The merged model
//! is checked for structural invariants before it is returned.
//!
//! ## Gene Universe
//!
//! [`SchemaModel::gene_universe`] reads the core gene list on first access and caches
//! it. When no list is configured the bundled placeholder list is used.

mod computed;
mod defaults;
mod error;
mod genes;
mod overrides;
mod types;


pub use computed::{
    compute_nnz, compute_pct_mito, compute_pct_ribo, compute_umi_counts, ComputeInput,
    ComputedColumnFn, ComputedColumns,
};
pub use error::SchemaConfigError;
pub use genes::{GeneUniverse, VarEntry, BUNDLED_GENE_LIST};
pub use overrides::{merge_values, SchemaOverride, ValidationOverride};
pub use types::{ColumnSpec, LayerKind, LayerSpec, LogicalType, Orientation};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use arrow::datatypes::{Field, Schema};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Name of the row-major raw layer, which is the primary matrix unchanged.
pub const CANONICAL_LAYER: &str = "row_raw";

/// Column holding cell barcodes.
pub const BARCODE_COLUMN: &str = "barcode";

/// Column holding gene symbols.
pub const GENE_COLUMN: &str = "gene";

/// Field metadata key recording which column group a field belongs to.
pub const COLUMN_GROUP_KEY: &str = "scatlas:column_group";

/// Dataset validation settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSettings {
    /// Obs columns that must be present without missing values
    pub required_obs_columns: BTreeSet<String>,
    /// Var columns that must be present without missing values
    pub required_var_columns: BTreeSet<String>,
    /// Minimum `|core ∩ dataset| / |core|`; 0 disables the check
    pub gene_intersection_threshold_frac: f64,
}

/// Declarative atlas schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaModel {
    /// Schema version recorded in store metadata
    pub schema_version: String,
    /// Measurement (layer group) holding var, X and presence arrays
    pub measurement_name: String,
    /// Name of the presence matrix array
    pub presence_matrix_name: String,
    /// Obs column that identifies a sample
    pub sample_id_column: String,
    /// Core gene list; `None` selects the bundled placeholder list
    pub core_gene_set_path: Option<PathBuf>,
    /// Obs index columns
    pub obs_index_columns: Vec<ColumnSpec>,
    /// Per-sample obs columns
    pub obs_sample_columns: Vec<ColumnSpec>,
    /// Per-cell obs columns
    pub obs_cell_columns: Vec<ColumnSpec>,
    /// Obs columns derived from the count matrix
    pub obs_computed_columns: Vec<ColumnSpec>,
    /// Var index columns
    pub var_index_columns: Vec<ColumnSpec>,
    /// Var columns
    pub var_columns: Vec<ColumnSpec>,
    /// Expression layers
    pub x_layers: Vec<LayerSpec>,
    /// Presence matrix value type
    pub presence_layer_type: LogicalType,
    /// Computed column name -> registered function name
    pub computed_column_functions: BTreeMap<String, String>,
    /// Validation settings
    pub validation: ValidationSettings,
    /// Opaque storage layout hints passed to the store
    pub storage: Value,
    #[serde(skip)]
    computed: ComputedColumns,
    #[serde(skip)]
    genes: OnceLock<GeneUniverse>,
}

impl Default for SchemaModel {
    fn default() -> Self {
        Self {
            schema_version: defaults::SCHEMA_VERSION.to_string(),
            measurement_name: defaults::MEASUREMENT_NAME.to_string(),
            presence_matrix_name: defaults::PRESENCE_MATRIX_NAME.to_string(),
            sample_id_column: defaults::SAMPLE_ID_COLUMN.to_string(),
            core_gene_set_path: None,
            obs_index_columns: defaults::obs_index_columns(),
            obs_sample_columns: defaults::obs_sample_columns(),
            obs_cell_columns: defaults::obs_cell_columns(),
            obs_computed_columns: defaults::obs_computed_columns(),
            var_index_columns: defaults::var_index_columns(),
            var_columns: defaults::var_columns(),
            x_layers: defaults::x_layers(),
            presence_layer_type: LogicalType::UInt8,
            computed_column_functions: defaults::computed_column_functions(),
            validation: defaults::validation(),
            storage: defaults::storage(),
            computed: ComputedColumns::builtin(),
            genes: OnceLock::new(),
        }
    }
}

impl SchemaModel {
    /// Apply an override on top of this model and re-check invariants.
    pub fn merged(mut self, schema_override: SchemaOverride) -> Result<Self, SchemaConfigError> {
        schema_override.apply(&mut self);
        self.genes = OnceLock::new();
        self.check()?;
        Ok(self)
    }

    /// Replace the computed-column registry.
    pub fn with_computed_columns(mut self, registry: ComputedColumns) -> Self {
        self.computed = registry;
        self
    }

    /// Use an already-built gene universe instead of reading `core_gene_set_path`.
    pub fn with_gene_universe(self, universe: GeneUniverse) -> Self {
        let genes = OnceLock::new();
        let _ = genes.set(universe);
        Self { genes, ..self }
    }

    /// The computed-column registry.
    pub fn computed_columns(&self) -> &ComputedColumns {
        &self.computed
    }

    /// Resolve the function producing a computed column.
    pub fn resolve_computed(&self, column: &str) -> Result<ComputedColumnFn, SchemaConfigError> {
        let function = self
            .computed_column_functions
            .get(column)
            .map(String::as_str)
            .unwrap_or(column);
        self.computed
            .get(function)
            .ok_or_else(|| SchemaConfigError::UnknownComputedColumn {
                column: column.to_string(),
                function: function.to_string(),
            })
    }

    /// Core gene universe, loaded on first access and cached.
    pub fn gene_universe(&self) -> Result<&GeneUniverse, SchemaConfigError> {
        if let Some(universe) = self.genes.get() {
            return Ok(universe);
        }
        let loaded = match &self.core_gene_set_path {
            Some(path) => GeneUniverse::from_path(path)?,
            None => GeneUniverse::bundled(),
        };
        Ok(self.genes.get_or_init(|| loaded))
    }

    /// Obs columns a standardized dataset carries: cell columns then sample columns.
    pub fn obs_standard_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.obs_cell_columns
            .iter()
            .chain(self.obs_sample_columns.iter())
    }

    /// Every obs column in on-disk order: index, cell, sample, computed.
    pub fn obs_term_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.obs_index_columns
            .iter()
            .chain(self.obs_standard_columns())
            .chain(self.obs_computed_columns.iter())
    }

    /// Every var column in on-disk order: index, then var columns.
    pub fn var_term_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.var_index_columns.iter().chain(self.var_columns.iter())
    }

    /// Name of the obs index column.
    pub fn obs_index_name(&self) -> &str {
        self.obs_index_columns
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or("soma_joinid")
    }

    /// Name of the var index column.
    pub fn var_index_name(&self) -> &str {
        self.var_index_columns
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or("soma_joinid")
    }

    /// Look up a configured layer.
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.x_layers.iter().find(|layer| layer.name == name)
    }

    /// Arrow schema of the store's obs dataframe.
    pub fn obs_arrow_schema(&self) -> Schema {
        let groups = [
            ("index", &self.obs_index_columns),
            ("cell", &self.obs_cell_columns),
            ("sample", &self.obs_sample_columns),
            ("computed", &self.obs_computed_columns),
        ];
        Schema::new(grouped_fields(&groups))
    }

    /// Arrow schema of the store's var dataframe.
    pub fn var_arrow_schema(&self) -> Schema {
        let groups = [("index", &self.var_index_columns), ("var", &self.var_columns)];
        Schema::new(grouped_fields(&groups))
    }

    /// Storage hint for one array, addressed by path (`["X", "row_raw"]`).
    pub fn storage_hint(&self, path: &[&str]) -> Value {
        path.iter()
            .try_fold(&self.storage, |node, key| node.get(*key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Check structural invariants.
    pub fn check(&self) -> Result<(), SchemaConfigError> {
        if !self.validation.required_obs_columns.contains(BARCODE_COLUMN) {
            return Err(SchemaConfigError::MissingRequiredColumn {
                table: "obs",
                column: BARCODE_COLUMN,
            });
        }
        if !self.validation.required_var_columns.contains(GENE_COLUMN) {
            return Err(SchemaConfigError::MissingRequiredColumn {
                table: "var",
                column: GENE_COLUMN,
            });
        }
        let frac = self.validation.gene_intersection_threshold_frac;
        if !(0.0..=1.0).contains(&frac) {
            return Err(SchemaConfigError::InvalidThreshold(frac));
        }

        if self.measurement_name.is_empty() {
            return Err(SchemaConfigError::MissingField("measurement_name"));
        }
        if self.presence_matrix_name.is_empty() {
            return Err(SchemaConfigError::MissingField("presence_matrix_name"));
        }
        if self.obs_index_columns.is_empty() {
            return Err(SchemaConfigError::MissingField("obs_index_columns"));
        }
        if self.var_index_columns.is_empty() {
            return Err(SchemaConfigError::MissingField("var_index_columns"));
        }
        for column in self
            .obs_index_columns
            .iter()
            .chain(self.var_index_columns.iter())
        {
            if !column.dtype.is_integer() {
                return Err(SchemaConfigError::NonIntegerIndex(column.name.clone()));
            }
        }

        if !self.obs_standard_columns().any(|c| c.name == BARCODE_COLUMN) {
            return Err(SchemaConfigError::MissingField("obs_cell_columns.barcode"));
        }
        if !self
            .obs_standard_columns()
            .any(|c| c.name == self.sample_id_column)
        {
            return Err(SchemaConfigError::MissingField("obs_sample_columns.sample_id_column"));
        }
        if !self.var_columns.iter().any(|c| c.name == GENE_COLUMN) {
            return Err(SchemaConfigError::MissingField("var_columns.gene"));
        }

        if self.x_layers.is_empty() {
            return Err(SchemaConfigError::MissingField("x_layers"));
        }
        for layer in &self.x_layers {
            layer.parse_name()?;
            if !layer.dtype.is_numeric() {
                return Err(SchemaConfigError::NonNumericLayer {
                    name: layer.name.clone(),
                    dtype: layer.dtype.to_string(),
                });
            }
        }
        if self.layer(CANONICAL_LAYER).is_none() {
            return Err(SchemaConfigError::MissingField("x_layers.row_raw"));
        }
        if !self.presence_layer_type.is_numeric() {
            return Err(SchemaConfigError::NonNumericLayer {
                name: self.presence_matrix_name.clone(),
                dtype: self.presence_layer_type.to_string(),
            });
        }
        Ok(())
    }
}

fn grouped_fields(groups: &[(&str, &Vec<ColumnSpec>)]) -> Vec<Field> {
    groups
        .iter()
        .flat_map(|(group, columns)| {
            columns.iter().map(move |column| {
                let mut metadata = HashMap::new();
                metadata.insert(COLUMN_GROUP_KEY.to_string(), group.to_string());
                Field::new(&column.name, column.dtype.data_type(), *group != "index")
                    .with_metadata(metadata)
            })
        })
        .collect()
}

/// Serialization format of an override file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideFormat {
    /// TOML document
    Toml,
    /// JSON document
    Json,
}

impl OverrideFormat {
    /// Pick the format from a file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Parse an override document. The top level must be a mapping.
pub fn parse_override<T: DeserializeOwned>(
    text: &str,
    format: OverrideFormat,
) -> Result<T, SchemaConfigError> {
    match format {
        OverrideFormat::Json => {
            let value: Value = serde_json::from_str(text)?;
            if !value.is_object() {
                let kind = match value {
                    Value::Null => "null",
                    Value::Bool(_) => "a boolean",
                    Value::Number(_) => "a number",
                    Value::String(_) => "a string",
                    Value::Array(_) => "an array",
                    Value::Object(_) => "a mapping",
                };
                return Err(SchemaConfigError::NotAMapping(kind.to_string()));
            }
            Ok(serde_json::from_value(value)?)
        }
        OverrideFormat::Toml => Ok(toml::from_str(text)?),
    }
}

fn read_override<T: DeserializeOwned>(path: &Path) -> Result<T, SchemaConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| SchemaConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_override(&text, OverrideFormat::from_path(path))
}

/// Load the default schema, optionally merged with an override file.
pub fn load_schema(override_path: Option<&Path>) -> Result<SchemaModel, SchemaConfigError> {
    load_schema_files(override_path, None)
}

/// Load the default schema with separate schema and validation override files.
pub fn load_schema_files(
    override_path: Option<&Path>,
    validation_path: Option<&Path>,
) -> Result<SchemaModel, SchemaConfigError> {
    let mut model = SchemaModel::default();

    if let Some(path) = override_path {
        debug!("Applying schema override {}", path.display());
        let schema_override: SchemaOverride = read_override(path)?;
        model = model.merged(schema_override)?;
    }
    if let Some(path) = validation_path {
        debug!("Applying validation override {}", path.display());
        let validation_override: ValidationOverride = read_override(path)?;
        model = model.merged(SchemaOverride {
            validation: Some(validation_override),
            ..SchemaOverride::default()
        })?;
    }
    model.check()?;

    if model.core_gene_set_path.is_none() {
        warn!("core_gene_set_path is not set; using the bundled placeholder gene list");
    }
    Ok(model)
}
