//! Typed schema overrides and the merge that applies them.
//!
//! Overrides mirror [`SchemaModel`]'s fields with every field optional. Merging is
//! field by field: a present override value wins, column groups and layer lists are
//! replaced wholesale, `validation` and `computed_column_functions` merge per key, and
//! the opaque storage hints merge recursively through nested mappings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use super::types::{ColumnSpec, LayerSpec, LogicalType};
use super::{SchemaModel, ValidationSettings};

/// Partial schema read from an override file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaOverride {
    /// Schema version string
    pub schema_version: Option<String>,
    /// Measurement (layer group) name
    pub measurement_name: Option<String>,
    /// Name of the presence matrix array
    pub presence_matrix_name: Option<String>,
    /// Obs column identifying a sample
    pub sample_id_column: Option<String>,
    /// Path to the core gene list
    pub core_gene_set_path: Option<PathBuf>,
    /// Obs index columns
    pub obs_index_columns: Option<Vec<ColumnSpec>>,
    /// Per-sample obs columns
    pub obs_sample_columns: Option<Vec<ColumnSpec>>,
    /// Per-cell obs columns
    pub obs_cell_columns: Option<Vec<ColumnSpec>>,
    /// Computed obs columns
    pub obs_computed_columns: Option<Vec<ColumnSpec>>,
    /// Var index columns
    pub var_index_columns: Option<Vec<ColumnSpec>>,
    /// Var columns
    pub var_columns: Option<Vec<ColumnSpec>>,
    /// Expression layers
    pub x_layers: Option<Vec<LayerSpec>>,
    /// Presence matrix value type
    pub presence_layer_type: Option<LogicalType>,
    /// Computed column -> registered function name
    pub computed_column_functions: Option<BTreeMap<String, String>>,
    /// Validation settings
    pub validation: Option<ValidationOverride>,
    /// Storage layout hints
    pub storage: Option<Value>,
}

/// Partial validation settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationOverride {
    /// Obs columns that must be present and complete
    pub required_obs_columns: Option<BTreeSet<String>>,
    /// Var columns that must be present and complete
    pub required_var_columns: Option<BTreeSet<String>>,
    /// Minimum fraction of core genes a dataset must cover
    pub gene_intersection_threshold_frac: Option<f64>,
}

impl ValidationOverride {
    pub(super) fn apply(self, target: &mut ValidationSettings) {
        if let Some(columns) = self.required_obs_columns {
            target.required_obs_columns = columns;
        }
        if let Some(columns) = self.required_var_columns {
            target.required_var_columns = columns;
        }
        if let Some(frac) = self.gene_intersection_threshold_frac {
            target.gene_intersection_threshold_frac = frac;
        }
    }
}

impl SchemaOverride {
    pub(super) fn apply(self, target: &mut SchemaModel) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut target.schema_version, self.schema_version);
        set(&mut target.measurement_name, self.measurement_name);
        set(&mut target.presence_matrix_name, self.presence_matrix_name);
        set(&mut target.sample_id_column, self.sample_id_column);
        if self.core_gene_set_path.is_some() {
            target.core_gene_set_path = self.core_gene_set_path;
        }
        set(&mut target.obs_index_columns, self.obs_index_columns);
        set(&mut target.obs_sample_columns, self.obs_sample_columns);
        set(&mut target.obs_cell_columns, self.obs_cell_columns);
        set(&mut target.obs_computed_columns, self.obs_computed_columns);
        set(&mut target.var_index_columns, self.var_index_columns);
        set(&mut target.var_columns, self.var_columns);
        set(&mut target.x_layers, self.x_layers);
        set(&mut target.presence_layer_type, self.presence_layer_type);

        if let Some(functions) = self.computed_column_functions {
            target.computed_column_functions.extend(functions);
        }
        if let Some(validation) = self.validation {
            validation.apply(&mut target.validation);
        }
        if let Some(storage) = self.storage {
            merge_values(&mut target.storage, storage);
        }
    }
}

/// Recursive merge: mappings merge key by key, anything else is replaced.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
