use super::*;
use crate::matrix::from_dense;
use crate::schema::{ColumnSpec, GeneUniverse, LogicalType, SchemaModel};
use arrow::array::{Array, ArrayRef, Float32Array, StringArray, UInt32Array};
use arrow::datatypes::DataType;
use std::sync::Arc;
use tempfile::tempdir;

fn schema() -> SchemaModel {
    SchemaModel::default()
        .with_gene_universe(GeneUniverse::from_genes(["A", "MT-CO1", "RPL3", "Z"]))
}

fn strings(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

fn obs() -> RecordBatch {
    columns::batch_from_columns(
        vec![
            ("barcode".to_string(), strings(&["AAA", "CCC", "GGG"])),
            ("sample_name".to_string(), strings(&["s1", "s1", "s1"])),
            ("study_name".to_string(), strings(&["study", "study", "study"])),
            ("free_text".to_string(), strings(&["x", "y", "z"])),
        ],
        3,
    )
    .unwrap()
}

fn var() -> RecordBatch {
    columns::batch_from_columns(
        vec![(
            "gene".to_string(),
            strings(&["MT-CO1", "A", "RPL3", "NOT_CORE"]),
        )],
        4,
    )
    .unwrap()
}

fn counts() -> CsMat<f64> {
    from_dense(
        3,
        4,
        &[
            1.0, 0.0, 2.0, 5.0, //
            0.0, 3.0, 1.0, 0.0, //
            2.0, 0.0, 0.0, 0.0,
        ],
    )
}

fn raw_dataset() -> RawDataset {
    RawDataset::new(obs(), var(), counts())
}

fn standardized(schema: &SchemaModel) -> CellDataset {
    let standardizer = Standardizer::new(schema).unwrap();
    let mut dataset = standardizer.validate(raw_dataset(), "fixture").unwrap();
    standardizer.standardize(&mut dataset).unwrap();
    dataset
}

// ==================== Validation Tests ====================

#[test]
fn test_validate_accepts_fixture() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let dataset = standardizer.validate(raw_dataset(), "fixture").unwrap();
    assert!(!dataset.is_standardized());
    assert!(dataset.x().is_csr());
    assert_eq!(dataset.num_obs(), 3);
    assert_eq!(dataset.num_vars(), 4);
}

#[test]
fn test_missing_required_obs_column_is_named() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.obs = columns::batch_from_columns(
        vec![
            ("sample_name".to_string(), strings(&["s1", "s1", "s1"])),
            ("study_name".to_string(), strings(&["st", "st", "st"])),
        ],
        3,
    )
    .unwrap();

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    assert!(err.to_string().contains("`barcode`"));
    assert_eq!(err.report.failure_count(), 1);
}

#[test]
fn test_missing_required_var_column_is_named() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.var = columns::batch_from_columns(
        vec![("symbol".to_string(), strings(&["a", "b", "c", "d"]))],
        4,
    )
    .unwrap();

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    assert!(err.violations().contains("Missing col in var: `gene`"));
}

#[test]
fn test_empty_and_null_values_fail() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    let study: ArrayRef = Arc::new(StringArray::from(vec![Some("st"), None, Some("")]));
    dataset.obs = columns::batch_from_columns(
        vec![
            ("barcode".to_string(), strings(&["AAA", "CCC", "GGG"])),
            ("sample_name".to_string(), strings(&["s1", "s1", "s1"])),
            ("study_name".to_string(), study),
        ],
        3,
    )
    .unwrap();

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    let violations = err.violations();
    assert!(violations.contains("study_name"));
    assert!(violations.contains("1 missing value(s)"));
    assert!(violations.contains("1 empty value(s)"));
}

#[test]
fn test_non_integer_counts_fail() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.x = Some(from_dense(3, 4, &[0.5; 12]).into());

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    assert!(err.violations().contains("not integer"));
}

#[test]
fn test_dense_matrix_is_rejected() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.x = Some(ExpressionMatrix::Dense {
        rows: 3,
        cols: 4,
        values: vec![1.0; 12],
    });

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    assert!(err.violations().contains("X matrix is not sparse"));
}

#[test]
fn test_missing_matrix_is_rejected() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.x = None;

    let err = standardizer.validate(dataset, "fixture").unwrap_err();
    assert!(err.violations().contains("No expression matrix"));
}

#[test]
fn test_all_violations_reported_together() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let dataset = RawDataset::new(
        columns::batch_from_columns(Vec::new(), 3).unwrap(),
        columns::batch_from_columns(Vec::new(), 4).unwrap(),
        from_dense(3, 4, &[-1.5; 12]),
    );

    let err = standardizer.validate(dataset, "broken").unwrap_err();
    // barcode, sample_name, study_name, gene, integer, nonnegative
    assert_eq!(err.report.failure_count(), 6);
    assert!(err.to_string().starts_with("Dataset broken failed validation"));
}

#[test]
fn test_raw_slot_is_promoted() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = raw_dataset();
    dataset.x = Some(from_dense(3, 4, &[0.25; 12]).into());
    dataset.raw_x = Some(counts().into());

    let report = standardizer.check(&dataset, "fixture");
    assert!(!report.has_failures());
    assert!(report.has_warnings());

    let validated = standardizer.validate(dataset, "fixture").unwrap();
    assert_eq!(validated.x(), &counts());
}

#[test]
fn test_gene_intersection_threshold() {
    let schema = SchemaModel::default()
        .with_gene_universe(GeneUniverse::from_genes(["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K"]));
    let standardizer = Standardizer::new(&schema).unwrap();

    let err = standardizer.validate(raw_dataset(), "fixture").unwrap_err();
    assert!(err.violations().contains("core genes present"));

    let mut relaxed = schema.clone();
    relaxed.validation.gene_intersection_threshold_frac = 0.0;
    let standardizer = Standardizer::new(&relaxed).unwrap();
    assert!(standardizer.validate(raw_dataset(), "fixture").is_ok());
}

// ==================== Standardization Tests ====================

#[test]
fn test_standardized_obs_columns() {
    let schema = schema();
    let dataset = standardized(&schema);
    assert!(dataset.is_standardized());

    let names: Vec<String> = dataset
        .obs()
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(
        names,
        vec![
            "barcode",
            "cell_type",
            "sample_name",
            "scrnaseq_protocol",
            "study_name",
            "nnz",
            "umi_counts",
            "pct_mito",
            "pct_ribo",
        ]
    );

    assert_eq!(
        dataset.obs_strings("cell_type").unwrap(),
        vec!["Unknown", "Unknown", "Unknown"]
    );
    assert!(matches!(
        dataset.obs().column_by_name("sample_name").unwrap().data_type(),
        DataType::Dictionary(_, _)
    ));
    assert_eq!(
        dataset.obs().column_by_name("barcode").unwrap().data_type(),
        &DataType::LargeUtf8
    );
}

#[test]
fn test_computed_columns_use_unfiltered_matrix() {
    let schema = schema();
    let dataset = standardized(&schema);

    let umi = dataset.obs().column_by_name("umi_counts").unwrap();
    let umi = umi.as_any().downcast_ref::<UInt32Array>().unwrap();
    assert_eq!(umi.values().to_vec(), vec![8, 4, 2]);

    let nnz = dataset.obs().column_by_name("nnz").unwrap();
    let nnz = nnz.as_any().downcast_ref::<UInt32Array>().unwrap();
    assert_eq!(nnz.values().to_vec(), vec![3, 2, 1]);

    let mito = dataset.obs().column_by_name("pct_mito").unwrap();
    let mito = mito.as_any().downcast_ref::<Float32Array>().unwrap();
    assert!((mito.value(0) - 12.5).abs() < 1e-5);
    assert_eq!(mito.value(1), 0.0);
    assert_eq!(mito.value(2), 100.0);

    let ribo = dataset.obs().column_by_name("pct_ribo").unwrap();
    let ribo = ribo.as_any().downcast_ref::<Float32Array>().unwrap();
    assert!((ribo.value(0) - 25.0).abs() < 1e-5);
    assert!((ribo.value(1) - 25.0).abs() < 1e-5);
}

#[test]
fn test_var_filtered_to_core_genes() {
    let schema = schema();
    let dataset = standardized(&schema);

    assert_eq!(dataset.num_vars(), 3);
    assert_eq!(dataset.var_strings("gene").unwrap(), vec!["MT-CO1", "A", "RPL3"]);
    assert_eq!(dataset.var_strings("ens").unwrap(), vec!["", "", ""]);
    assert_eq!(dataset.x(), &from_dense(3, 3, &[1.0, 0.0, 2.0, 0.0, 3.0, 1.0, 2.0, 0.0, 0.0]));
}

#[test]
fn test_duplicate_core_genes_keep_first() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let var = columns::batch_from_columns(
        vec![("gene".to_string(), strings(&["A", "A", "RPL3", "Z"]))],
        4,
    )
    .unwrap();
    let mut dataset = standardizer
        .validate(RawDataset::new(obs(), var, counts()), "dups")
        .unwrap();
    standardizer.standardize(&mut dataset).unwrap();

    assert_eq!(dataset.var_strings("gene").unwrap(), vec!["A", "RPL3", "Z"]);
    assert_eq!(dataset.x().get(0, 0), Some(&1.0));
}

#[test]
fn test_layers_built() {
    let schema = schema();
    let dataset = standardized(&schema);

    let names: Vec<&str> = dataset.layers().keys().map(String::as_str).collect();
    assert_eq!(names, vec!["col_norm", "col_raw", "row_norm"]);
    assert!(dataset.layer("col_raw").unwrap().is_csc());
    assert!(dataset.layer("col_norm").unwrap().is_csc());
    assert!(dataset.layer("row_norm").unwrap().is_csr());
    assert_eq!(dataset.layer("row_raw"), Some(dataset.x()));

    let row_norm = dataset.layer("row_norm").unwrap();
    let expected = (1.0f64 / 3.0 * 10_000.0).ln_1p();
    assert!((row_norm.get(0, 0).unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_standardize_is_idempotent() {
    let schema = schema();
    let standardizer = Standardizer::new(&schema).unwrap();
    let once = standardized(&schema);
    let mut twice = once.clone();
    // the standardized flag short-circuits the second pass
    assert!(twice.is_standardized());
    standardizer.standardize(&mut twice).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_conform_falls_back_to_filled_strings() {
    let source: ArrayRef = Arc::new(StringArray::from(vec![Some("12"), Some("abc"), None]));
    let column = columns::conform_column(Some(&source), 3, LogicalType::Int32, "Unknown").unwrap();
    assert_eq!(column.data_type(), &DataType::LargeUtf8);
    let values: Vec<_> = columns::as_large_strings(&column)
        .unwrap()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect();
    assert_eq!(
        values,
        vec![Some("12".to_string()), Some("abc".to_string()), Some("Unknown".to_string())]
    );

    // castable input keeps the target type and its nulls
    let source: ArrayRef = Arc::new(StringArray::from(vec![Some("12"), None, Some("7")]));
    let column = columns::conform_column(Some(&source), 3, LogicalType::Int32, "Unknown").unwrap();
    assert_eq!(column.data_type(), &DataType::Int32);
    assert_eq!(column.null_count(), 1);
}

#[test]
fn test_standardize_conforms_typed_obs_columns() {
    let mut schema = schema();
    schema
        .obs_cell_columns
        .push(ColumnSpec::new("age", LogicalType::Int32));
    schema
        .obs_cell_columns
        .push(ColumnSpec::new("tissue", LogicalType::Categorical));

    let mut columns_in: Vec<(String, ArrayRef)> = obs()
        .schema()
        .fields()
        .iter()
        .zip(obs().columns())
        .map(|(field, array)| (field.name().clone(), Arc::clone(array)))
        .collect();
    columns_in.push((
        "age".to_string(),
        Arc::new(StringArray::from(vec![Some("12"), Some("abc"), None])),
    ));
    columns_in.push((
        "tissue".to_string(),
        Arc::new(StringArray::from(vec![Some("lung"), None, Some("lung")])),
    ));
    let raw = RawDataset::new(
        columns::batch_from_columns(columns_in, 3).unwrap(),
        var(),
        counts(),
    );

    let standardizer = Standardizer::new(&schema).unwrap();
    let mut dataset = standardizer.validate(raw, "typed").unwrap();
    standardizer.standardize(&mut dataset).unwrap();

    let age = dataset.obs().column_by_name("age").unwrap();
    assert_eq!(age.data_type(), &DataType::LargeUtf8);
    assert_eq!(dataset.obs_strings("age").unwrap(), vec!["12", "abc", "Unknown"]);

    let tissue = dataset.obs().column_by_name("tissue").unwrap();
    assert_eq!(
        tissue.data_type(),
        &DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::LargeUtf8))
    );
    assert_eq!(tissue.null_count(), 0);
    assert_eq!(dataset.obs_strings("tissue").unwrap(), vec!["lung", "Unknown", "lung"]);
}

#[test]
fn test_unresolved_computed_column_is_skipped() {
    let mut schema = schema();
    schema
        .computed_column_functions
        .insert("pct_ribo".to_string(), "does_not_exist".to_string());
    let dataset = standardized(&schema);
    assert!(dataset.obs().column_by_name("pct_ribo").is_none());
    assert!(dataset.obs().column_by_name("pct_mito").is_some());
}

// ==================== Unit File Tests ====================

#[test]
fn test_unit_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(format!("study-s1.{UNIT_FILE_EXTENSION}"));
    let schema = schema();
    let dataset = standardized(&schema);

    let source = UnitSource {
        group: "study".to_string(),
        unit: "s1".to_string(),
    };
    let manifest = write_unit_file(&path, &dataset, "sample_name", Some(source.clone())).unwrap();
    assert_eq!(manifest.sample_names, vec!["s1"]);
    assert_eq!(manifest.n_vars, 3);

    let unit = read_unit_file(&path).unwrap();
    assert_eq!(unit.manifest.source, Some(source));
    assert!(unit.manifest.standardized);
    let restored = unit.into_cell_dataset().unwrap();
    assert_eq!(restored.x(), dataset.x());
    assert_eq!(restored.layers(), dataset.layers());
    assert_eq!(restored.obs_strings("barcode").unwrap(), vec!["AAA", "CCC", "GGG"]);
    assert_eq!(restored.obs().schema().fields(), dataset.obs().schema().fields());
}

#[test]
fn test_unit_file_mimetype_first() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("unit.scunit");
    let schema = schema();
    write_unit_file(&path, &standardized(&schema), "sample_name", None).unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), zip::CompressionMethod::Stored);
}

#[test]
fn test_raw_unit_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.scunit");
    let mut dataset = raw_dataset();
    dataset.raw_x = Some(counts().into());
    dataset.x = Some(ExpressionMatrix::Dense {
        rows: 3,
        cols: 4,
        values: vec![0.5; 12],
    });

    let manifest = write_raw_unit_file(&path, &dataset, "sample_name").unwrap();
    assert!(!manifest.standardized);
    assert!(manifest.dense_x);
    assert!(manifest.has_raw);

    let unit = read_unit_file(&path).unwrap();
    assert!(matches!(unit.x, ExpressionMatrix::Dense { .. }));
    let raw = unit.clone().into_raw_dataset();
    assert_eq!(raw.raw_x, Some(ExpressionMatrix::Sparse(counts())));
    assert!(unit.into_cell_dataset().is_err());
}

#[test]
fn test_not_a_unit_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bogus.scunit");
    std::fs::write(&path, b"not a zip").unwrap();
    assert!(read_unit_file(&path).is_err());
}
