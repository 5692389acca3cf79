//! Built-in default schema.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use super::types::{ColumnSpec, LayerSpec, LogicalType};
use super::ValidationSettings;

pub(super) const SCHEMA_VERSION: &str = "1.0.0";
pub(super) const MEASUREMENT_NAME: &str = "RNA";
pub(super) const PRESENCE_MATRIX_NAME: &str = "feature_presence_matrix";
pub(super) const SAMPLE_ID_COLUMN: &str = "sample_name";
pub(super) const GENE_INTERSECTION_THRESHOLD_FRAC: f64 = 0.1;

pub(super) fn obs_index_columns() -> Vec<ColumnSpec> {
    vec![ColumnSpec::new("soma_joinid", LogicalType::Int64)]
}

pub(super) fn obs_sample_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("sample_name", LogicalType::Categorical),
        ColumnSpec::new("scrnaseq_protocol", LogicalType::Categorical),
        ColumnSpec::new("study_name", LogicalType::Categorical),
    ]
}

pub(super) fn obs_cell_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("barcode", LogicalType::LargeString),
        ColumnSpec::new("cell_type", LogicalType::Categorical),
    ]
}

pub(super) fn obs_computed_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("nnz", LogicalType::UInt32),
        ColumnSpec::new("umi_counts", LogicalType::UInt32),
        ColumnSpec::new("pct_mito", LogicalType::Float32),
        ColumnSpec::new("pct_ribo", LogicalType::Float32),
    ]
}

pub(super) fn computed_column_functions() -> BTreeMap<String, String> {
    ["nnz", "umi_counts", "pct_mito", "pct_ribo"]
        .into_iter()
        .map(|name| (name.to_string(), name.to_string()))
        .collect()
}

pub(super) fn var_index_columns() -> Vec<ColumnSpec> {
    vec![ColumnSpec::new("soma_joinid", LogicalType::Int64)]
}

pub(super) fn var_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("gene", LogicalType::LargeString),
        ColumnSpec::new("ens", LogicalType::LargeString),
    ]
}

pub(super) fn x_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec::new("col_raw", LogicalType::UInt32),
        LayerSpec::new("col_norm", LogicalType::Float32),
        LayerSpec::new("row_raw", LogicalType::UInt32),
        LayerSpec::new("row_norm", LogicalType::Float32),
    ]
}

pub(super) fn validation() -> ValidationSettings {
    ValidationSettings {
        required_obs_columns: ["barcode", "sample_name", "study_name"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>(),
        required_var_columns: ["gene"].into_iter().map(String::from).collect(),
        gene_intersection_threshold_frac: GENE_INTERSECTION_THRESHOLD_FRAC,
    }
}

/// Storage layout hints, handed to the store untouched.
pub(super) fn storage() -> Value {
    json!({
        "obs": { "capacity": 16384, "tile_order": "row-major", "zstd_level": 9 },
        "var": { "capacity": 131072, "zstd_level": 9 },
        "X": {
            "col_raw": { "capacity": 131072, "tile_order": "col-major", "zstd_level": 5 },
            "col_norm": { "capacity": 131072, "tile_order": "col-major", "zstd_level": 5 },
            "row_raw": { "capacity": 131072, "tile_order": "row-major", "zstd_level": 5 },
            "row_norm": { "capacity": 131072, "tile_order": "row-major", "zstd_level": 5 }
        },
        "presence": { "capacity": 131072, "tile_order": "row-major", "zstd_level": 9 }
    })
}
