use super::*;
use crate::dataset::columns;
use crate::schema::GeneUniverse;
use arrow::array::{Int64Array, StringArray};
use tempfile::tempdir;

fn schema() -> SchemaModel {
    SchemaModel::default().with_gene_universe(GeneUniverse::from_genes(["D", "B", "A", "C"]))
}

fn obs_batch(joinids: &[i64], barcodes: &[&str]) -> RecordBatch {
    let samples: Vec<&str> = barcodes.iter().map(|_| "s1").collect();
    RecordBatch::try_from_iter(vec![
        (
            SOMA_JOINID,
            Arc::new(Int64Array::from(joinids.to_vec())) as ArrayRef,
        ),
        (
            "barcode",
            Arc::new(StringArray::from(barcodes.to_vec())) as ArrayRef,
        ),
        ("sample_name", Arc::new(StringArray::from(samples)) as ArrayRef),
    ])
    .unwrap()
}

#[test]
fn test_create_writes_metadata_and_var() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("atlas");
    let experiment = Experiment::create(&root, &schema(), "atlas", StoreConfig::default()).unwrap();

    assert!(Experiment::exists(&root));
    let metadata = experiment.metadata();
    assert_eq!(metadata[keys::ATLAS_NAME], "atlas");
    assert_eq!(metadata[keys::NUM_GENES], "4");
    assert_eq!(metadata[keys::SCHEMA_VERSION], "1.0.0");
    assert_eq!(metadata[keys::OBJECT_VERSION], OBJECT_VERSION);
    assert!(chrono::DateTime::parse_from_rfc3339(&metadata[keys::CREATED_ON]).is_ok());
    assert!(metadata[keys::WRITER_VERSION].starts_with("scatlas"));

    let var = experiment.read_var().unwrap();
    assert_eq!(var.num_rows(), 4);
    assert_eq!(
        columns::column_strings(&var, "gene").unwrap(),
        vec!["A", "B", "C", "D"]
    );
    let joinids = var
        .column_by_name(SOMA_JOINID)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec();
    assert_eq!(joinids, vec![0, 1, 2, 3]);

    assert_eq!(experiment.obs_domain(), 0);
    assert_eq!(
        experiment.layer_names(),
        vec!["col_norm", "col_raw", "row_norm", "row_raw"]
    );
    for layer in experiment.layer_names() {
        assert_eq!(
            experiment.array_shape(&experiment.layer_array(&layer)).unwrap(),
            [0, 4]
        );
    }
    let presence = experiment.presence_array();
    assert_eq!(presence, "ms/RNA/feature_presence_matrix");
    assert_eq!(
        experiment.manifest().array(&presence).unwrap().dtype,
        crate::schema::LogicalType::UInt8
    );
}

#[test]
fn test_create_twice_fails() {
    let dir = tempdir().unwrap();
    Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    assert!(matches!(
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()),
        Err(StoreError::AlreadyExists(_))
    ));
}

#[test]
fn test_open_missing() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Experiment::open(&dir.path().join("nothing"), OpenMode::Read),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_resize_grows_and_refuses_to_shrink() {
    let dir = tempdir().unwrap();
    let mut experiment =
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    let raw = experiment.layer_array("row_raw");

    experiment.resize_obs(10).unwrap();
    experiment.resize_array(&raw, [10, 4]).unwrap();

    let reopened = Experiment::open(dir.path(), OpenMode::Read).unwrap();
    assert_eq!(reopened.obs_domain(), 10);
    assert_eq!(reopened.array_shape(&raw).unwrap(), [10, 4]);

    assert!(matches!(
        experiment.resize_obs(5),
        Err(StoreError::Shrink { .. })
    ));
    assert!(matches!(
        experiment.resize_array(&raw, [10, 3]),
        Err(StoreError::Shrink { .. })
    ));
    assert!(matches!(
        experiment.resize_array("ms/RNA/X/nope", [1, 1]),
        Err(StoreError::UnknownArray(_))
    ));
}

#[test]
fn test_read_only_handle_rejects_writes() {
    let dir = tempdir().unwrap();
    Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    let mut experiment = Experiment::open(dir.path(), OpenMode::Read).unwrap();

    assert!(matches!(
        experiment.resize_obs(1),
        Err(StoreError::ReadOnly(_))
    ));
    assert!(matches!(
        experiment.write_obs(&obs_batch(&[0], &["a"])),
        Err(StoreError::ReadOnly(_))
    ));
    assert!(matches!(
        experiment.set_metadata("key", "value"),
        Err(StoreError::ReadOnly(_))
    ));
}

#[test]
fn test_obs_writes_are_bounds_checked() {
    let dir = tempdir().unwrap();
    let mut experiment =
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    experiment.resize_obs(2).unwrap();

    assert!(matches!(
        experiment.write_obs(&obs_batch(&[1, 2], &["a", "b"])),
        Err(StoreError::RowOutOfBounds { joinid: 2, .. })
    ));

    let no_index = RecordBatch::try_from_iter(vec![(
        "barcode",
        Arc::new(StringArray::from(vec!["a"])) as ArrayRef,
    )])
    .unwrap();
    assert!(matches!(
        experiment.write_obs(&no_index),
        Err(StoreError::MissingColumn { .. })
    ));
}

#[test]
fn test_obs_last_write_wins() {
    let dir = tempdir().unwrap();
    let mut experiment =
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    experiment.resize_obs(3).unwrap();

    experiment
        .write_obs(&obs_batch(&[2, 0], &["c", "a"]))
        .unwrap();
    experiment.write_obs(&obs_batch(&[1], &["b"])).unwrap();
    experiment
        .write_obs(&obs_batch(&[0], &["a-again"]))
        .unwrap();

    let obs = experiment.read_obs().unwrap();
    assert_eq!(
        columns::column_strings(&obs, "barcode").unwrap(),
        vec!["a-again", "b", "c"]
    );
    // columns absent from the batch are stored as nulls
    assert_eq!(obs.column_by_name("cell_type").unwrap().null_count(), 3);
    assert_eq!(
        obs.schema().field_with_name("sample_name").unwrap().data_type(),
        &crate::schema::LogicalType::Categorical.data_type()
    );

    let projected = experiment.read_obs_columns(&["sample_name"]).unwrap();
    assert_eq!(projected.num_columns(), 2);
    assert_eq!(projected.num_rows(), 3);
    assert!(matches!(
        experiment.read_obs_columns(&["nope"]),
        Err(StoreError::MissingColumn { .. })
    ));
}

#[test]
fn test_coordinates_round_trip() {
    let dir = tempdir().unwrap();
    let mut experiment =
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    let norm = experiment.layer_array("row_norm");
    experiment.resize_array(&norm, [3, 4]).unwrap();

    assert_eq!(experiment.non_empty_domain(&norm).unwrap(), None);

    let mut first = CoordinateTable::new();
    first.push(2, 3, 0.5);
    first.push(0, 1, 1.0);
    experiment.write_coordinates(&norm, &first).unwrap();

    let mut second = CoordinateTable::new();
    second.push(0, 1, 2.0);
    experiment.write_coordinates(&norm, &second).unwrap();

    let table = experiment.read_coordinates(&norm).unwrap();
    assert_eq!(table.dim0, vec![0, 2]);
    assert_eq!(table.dim1, vec![1, 3]);
    assert_eq!(table.data, vec![2.0, 0.5]);
    assert_eq!(table.row(2), vec![(3, 0.5)]);

    assert_eq!(
        experiment.non_empty_domain(&norm).unwrap(),
        Some([(0, 2), (1, 3)])
    );
}

#[test]
fn test_coordinates_are_bounds_checked() {
    let dir = tempdir().unwrap();
    let mut experiment =
        Experiment::create(dir.path(), &schema(), "atlas", StoreConfig::default()).unwrap();
    let raw = experiment.layer_array("row_raw");
    experiment.resize_array(&raw, [2, 4]).unwrap();

    let mut table = CoordinateTable::new();
    table.push(2, 0, 1.0);
    assert!(matches!(
        experiment.write_coordinates(&raw, &table),
        Err(StoreError::OutOfBounds { row: 2, col: 0, .. })
    ));

    let mut negative = CoordinateTable::new();
    negative.push(0, -1, 1.0);
    assert!(experiment.write_coordinates(&raw, &negative).is_err());

    // integer layers reject values that do not fit their type
    let mut overflow = CoordinateTable::new();
    overflow.push(0, 0, -5.0);
    assert!(experiment.write_coordinates(&raw, &overflow).is_err());
}

#[test]
fn test_coordinate_table_matrix_mapping() {
    let local = crate::matrix::from_dense(2, 2, &[1.0, 0.0, 0.0, 3.0]);
    let table = CoordinateTable::from_matrix(&local, &[10, 11], &[5, 7]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.row(10), vec![(5, 1.0)]);
    assert_eq!(table.row(11), vec![(7, 3.0)]);

    let global = table.to_matrix((12, 8));
    assert_eq!(global.get(11, 7), Some(&3.0));
    assert_eq!(global.nnz(), 2);
}

#[test]
fn test_metadata_and_delete() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("atlas");
    let mut experiment =
        Experiment::create(&root, &schema(), "atlas", StoreConfig::fast_write()).unwrap();
    experiment.set_metadata("note", "hello").unwrap();

    let reopened = Experiment::open(&root, OpenMode::Read).unwrap();
    assert_eq!(reopened.metadata()["note"], "hello");
    assert_eq!(reopened.metadata()[keys::ATLAS_NAME], "atlas");

    Experiment::delete(&root).unwrap();
    assert!(!Experiment::exists(&root));
    assert!(matches!(
        Experiment::delete(&root),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_store_config_presets() {
    assert_eq!(StoreConfig::balanced(), StoreConfig::default());
    assert_eq!(
        StoreConfig::max_compression().compression,
        CompressionType::Zstd(22)
    );
    let hinted = StoreConfig::fast_write().with_hint(&serde_json::json!({"zstd_level": 9}));
    assert_eq!(hinted.compression, CompressionType::Zstd(9));
}
