use super::*;
use crate::collection::{create_demo_structure, MtxCollection, RawCollector};
use crate::dataset::{write_raw_unit_file, write_unit_file, Standardizer, UnitSource};
use crate::schema::GeneUniverse;
use crate::store::{StoreConfig, StoreError};
use tempfile::{tempdir, TempDir};

/// Demo tree standardized into one unit file per sample.
fn standardized_units(schema: &SchemaModel) -> (TempDir, Vec<PathBuf>) {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    create_demo_structure(&raw).unwrap();

    let collection = MtxCollection::new(&raw, schema);
    let standardizer = Standardizer::new(schema).unwrap();
    let mut paths = Vec::new();
    for (group, unit) in collection.list_all_units().unwrap() {
        let label = format!("{group}/{unit}");
        let dataset = collection.get_raw_unit(&group, &unit).unwrap();
        let mut dataset = standardizer.validate(dataset, &label).unwrap();
        standardizer.standardize(&mut dataset).unwrap();

        let path = dir.path().join("units").join(format!("{group}-{unit}.scunit"));
        let source = UnitSource { group, unit };
        write_unit_file(&path, &dataset, "sample_name", Some(source)).unwrap();
        paths.push(path);
    }
    (dir, paths)
}

#[test]
fn test_disjoint_barcodes_get_dense_indices() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let uri = dir.path().join("atlas");

    let mapping = create_registration_mapping(&uri, &paths, &schema).unwrap();
    assert_eq!(mapping.units.len(), 3);
    assert_eq!(mapping.existing_obs_count, 0);
    assert_eq!(mapping.required_obs_count(), 9);
    assert_eq!(mapping.new_obs_count(), 9);
    assert_eq!(mapping.required_var_count("RNA"), 3);

    let mut all: Vec<i64> = mapping
        .units
        .iter()
        .flat_map(|unit| unit.obs_joinids.clone())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..9).collect::<Vec<i64>>());

    // demo var order is [D, A]; universe is [A, D, F]
    assert_eq!(mapping.units[0].var_joinids, vec![1, 0]);
    assert_eq!(mapping.unit(&paths[2]).unwrap().obs_joinids, vec![6, 7, 8]);
}

#[test]
fn test_shared_barcode_fails() {
    let schema = SchemaModel::default();
    let (dir, mut paths) = standardized_units(&schema);
    let copy = dir.path().join("units").join("copy.scunit");
    std::fs::copy(&paths[0], &copy).unwrap();
    paths.push(copy);

    let err = create_registration_mapping(&dir.path().join("atlas"), &paths, &schema).unwrap_err();
    let RegistrationError::DuplicateLabel(err) = err else {
        panic!("expected duplicate barcodes");
    };
    assert_eq!(err.kind, "barcode");
    assert_eq!(err.collisions.len(), 3);
    for owners in err.collisions.values() {
        assert_eq!(owners.len(), 2);
    }
}

#[test]
fn test_unknown_gene_is_rejected() {
    let (dir, paths) = standardized_units(&SchemaModel::default());
    let narrow = SchemaModel::default().with_gene_universe(GeneUniverse::from_genes(["A"]));

    let err = create_registration_mapping(&dir.path().join("atlas"), &paths, &narrow).unwrap_err();
    assert!(matches!(err, RegistrationError::UnknownGene { ref gene, .. } if gene == "D"));
}

#[test]
fn test_raw_units_are_rejected() {
    let schema = SchemaModel::default();
    let dir = tempdir().unwrap();
    create_demo_structure(&dir.path().join("raw")).unwrap();
    let collection = MtxCollection::new(&dir.path().join("raw"), &schema);
    let raw = collection.get_raw_unit("study_0", "sample_0").unwrap();
    let path = dir.path().join("raw.scunit");
    write_raw_unit_file(&path, &raw, "sample_name").unwrap();

    assert!(matches!(
        create_registration_mapping(&dir.path().join("atlas"), &[path], &schema),
        Err(RegistrationError::NotStandardized(_))
    ));
}

#[test]
fn test_mapping_checkpoint_round_trip() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let mapping = create_registration_mapping(&dir.path().join("atlas"), &paths, &schema).unwrap();

    let checkpoint = dir.path().join("checkpoints").join("registration.json");
    mapping.save(&checkpoint).unwrap();
    assert_eq!(RegistrationMapping::load(&checkpoint).unwrap(), mapping);
}

#[test]
fn test_resize_then_write() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let uri = dir.path().join("atlas");
    Experiment::create(&uri, &schema, "atlas", StoreConfig::default()).unwrap();

    let mapping = create_registration_mapping(&uri, &paths, &schema).unwrap();
    resize_store(&uri, &mapping).unwrap();

    let experiment = Experiment::open(&uri, OpenMode::Read).unwrap();
    assert_eq!(experiment.obs_domain(), 9);
    for layer in experiment.layer_names() {
        assert_eq!(
            experiment.array_shape(&experiment.layer_array(&layer)).unwrap(),
            [9, 3]
        );
    }
    // presence grows separately
    assert_eq!(
        experiment.array_shape(&experiment.presence_array()).unwrap(),
        [0, 3]
    );

    for path in &paths {
        assert_eq!(
            write_unit(&uri, path, &mapping, &StoreConfig::default()).unwrap(),
            3
        );
    }

    let obs = experiment.read_obs().unwrap();
    assert_eq!(obs.num_rows(), 9);
    let samples = columns::column_strings(&obs, "sample_name").unwrap();
    assert_eq!(&samples[..3], &["sample_0", "sample_0", "sample_0"]);
    assert_eq!(&samples[6..], &["sample_2", "sample_2", "sample_2"]);
    let umi = columns::column_strings(&obs, "umi_counts").unwrap();
    assert_eq!(&umi[..3], &["2", "2", "1"]);

    // per sample: cell 0 keeps D, cells 1 and 2 keep A
    let raw = experiment
        .read_coordinates(&experiment.layer_array("row_raw"))
        .unwrap();
    assert_eq!(raw.len(), 9);
    assert_eq!(raw.row(0), vec![(1, 1.0)]);
    assert_eq!(raw.row(4), vec![(0, 1.0)]);

    let norm = experiment
        .read_coordinates(&experiment.layer_array("row_norm"))
        .unwrap();
    let expected = (1.0f64 + 10_000.0).ln();
    assert!(norm.data.iter().all(|v| (v - expected).abs() < 1e-2));
}

#[test]
fn test_reregistration_reuses_indices() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let uri = dir.path().join("atlas");
    Experiment::create(&uri, &schema, "atlas", StoreConfig::default()).unwrap();

    let first = create_registration_mapping(&uri, &paths, &schema).unwrap();
    resize_store(&uri, &first).unwrap();
    for path in &paths {
        write_unit(&uri, path, &first, &StoreConfig::default()).unwrap();
    }

    let second = create_registration_mapping(&uri, &paths, &schema).unwrap();
    assert_eq!(second.existing_obs_count, 9);
    assert_eq!(second.new_obs_count(), 0);
    assert_eq!(second.required_obs_count(), 9);
    for (a, b) in first.units.iter().zip(&second.units) {
        assert_eq!(a.obs_joinids, b.obs_joinids);
    }
}

#[test]
fn test_write_requires_resize_and_registration() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let uri = dir.path().join("atlas");
    Experiment::create(&uri, &schema, "atlas", StoreConfig::default()).unwrap();

    let mapping = create_registration_mapping(&uri, &paths[..1], &schema).unwrap();
    assert!(matches!(
        write_unit(&uri, &paths[0], &mapping, &StoreConfig::default()),
        Err(RegistrationError::StoreError(StoreError::OutOfBounds { .. }))
    ));
    assert!(matches!(
        write_unit(&uri, &paths[1], &mapping, &StoreConfig::default()),
        Err(RegistrationError::Unregistered(_))
    ));
}

#[test]
fn test_resize_rejects_other_measurement() {
    let schema = SchemaModel::default();
    let (dir, paths) = standardized_units(&schema);
    let uri = dir.path().join("atlas");
    Experiment::create(&uri, &schema, "atlas", StoreConfig::default()).unwrap();

    let mut mapping = create_registration_mapping(&uri, &paths, &schema).unwrap();
    mapping.measurement = "ATAC".to_string();
    assert!(matches!(
        resize_store(&uri, &mapping),
        Err(ResizeError::MeasurementMismatch { .. })
    ));
    assert!(matches!(
        resize_store(&dir.path().join("missing"), &mapping),
        Err(ResizeError::Rejected { .. })
    ));
}
