use super::*;
use crate::collection::{create_demo_structure, MtxCollection};
use crate::dataset::{write_unit_file, Standardizer};
use crate::executor::{ExecutorMode, SerialExecutor};
use crate::registration::{create_registration_mapping, resize_store, write_unit};
use tempfile::{tempdir, TempDir};

/// Demo tree ingested into `<tmp>/atlas`.
fn ingested_demo(schema: &SchemaModel) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    create_demo_structure(&raw).unwrap();
    let collection = MtxCollection::new(&raw, schema);
    let standardizer = Standardizer::new(schema).unwrap();

    let mut paths = Vec::new();
    for (group, unit) in collection.list_all_units().unwrap() {
        let dataset = collection.get_raw_unit(&group, &unit).unwrap();
        let mut dataset = standardizer.validate(dataset, &unit).unwrap();
        standardizer.standardize(&mut dataset).unwrap();
        let path = dir.path().join("units").join(format!("{group}-{unit}.scunit"));
        write_unit_file(&path, &dataset, "sample_name", None).unwrap();
        paths.push(path);
    }

    let uri = dir.path().join("atlas");
    Experiment::create(&uri, schema, "atlas", StoreConfig::default()).unwrap();
    let mapping = create_registration_mapping(&uri, &paths, schema).unwrap();
    resize_store(&uri, &mapping).unwrap();
    for path in &paths {
        write_unit(&uri, path, &mapping, &StoreConfig::default()).unwrap();
    }
    (dir, uri)
}

fn presence_rows(uri: &Path) -> Vec<Vec<u8>> {
    let experiment = Experiment::open(uri, OpenMode::Read).unwrap();
    let array = experiment.presence_array();
    let [rows, cols] = experiment.array_shape(&array).unwrap();
    let table = experiment.read_coordinates(&array).unwrap();
    (0..rows as i64)
        .map(|row| {
            let mut values = vec![0u8; cols as usize];
            for (col, value) in table.row(row) {
                values[col as usize] = value as u8;
            }
            values
        })
        .collect()
}

#[test]
fn test_presence_row() {
    let universe = GeneUniverse::from_genes(["C", "A", "B"]);
    assert_eq!(presence_row(&universe, ["A", "B"]), vec![1, 1, 0]);
    assert_eq!(presence_row(&universe, ["Z"]), vec![0, 0, 0]);
    assert_eq!(presence_row(&universe, ["C", "C"]), vec![0, 0, 1]);
}

#[test]
fn test_compute_fills_every_sample_once() {
    let schema = SchemaModel::default();
    let (dir, uri) = ingested_demo(&schema);
    let collection = MtxCollection::new(&dir.path().join("raw"), &schema);

    let computer = PresenceMatrixComputer::new(
        &schema,
        &collection,
        AnyExecutor::new(ExecutorMode::Parallel, 2),
    );
    let summary = computer.compute(&uri).unwrap();
    assert_eq!(summary.known_samples, 3);
    assert_eq!(summary.computed, 3);
    assert!(summary.failures.is_empty());

    // universe [A, D, F]; every demo sample lists D, A and G
    assert_eq!(presence_rows(&uri), vec![vec![1, 1, 0]; 3]);

    let again = computer.compute(&uri).unwrap();
    assert_eq!(again.computed, 0);
    assert_eq!(again.skipped, 3);
    assert_eq!(presence_rows(&uri).len(), 3);
}

#[test]
fn test_samples_missing_from_collection_are_reported() {
    let schema = SchemaModel::default();
    let (dir, uri) = ingested_demo(&schema);
    let partial = MtxCollection::new(&dir.path().join("raw"), &schema)
        .with_include(vec!["study_1".to_string()]);

    let summary = PresenceMatrixComputer::new(&schema, &partial, AnyExecutor::Serial(SerialExecutor))
        .compute(&uri)
        .unwrap();
    assert_eq!(summary.computed, 1);
    assert_eq!(summary.failures.len(), 2);
    assert_eq!(summary.failures[0].0, "sample_0");

    let rows = presence_rows(&uri);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec![0, 0, 0]);
    assert_eq!(rows[2], vec![1, 1, 0]);
}

#[test]
fn test_compute_requires_store() {
    let schema = SchemaModel::default();
    let dir = tempdir().unwrap();
    let collection = MtxCollection::new(dir.path(), &schema);
    let computer =
        PresenceMatrixComputer::new(&schema, &collection, AnyExecutor::Serial(SerialExecutor));
    assert!(matches!(
        computer.compute(&dir.path().join("atlas")),
        Err(PresenceError::StoreError(StoreError::NotFound(_)))
    ));
}

/// Demo collection where one sample's features miss the core universe entirely.
struct WithoutCoreGenes<'a> {
    inner: MtxCollection,
    sample: &'a str,
}

impl RawCollector for WithoutCoreGenes<'_> {
    fn list_groups(&self) -> Result<Vec<String>, CollectionError> {
        self.inner.list_groups()
    }

    fn list_units(&self, group: &str) -> Result<Vec<String>, CollectionError> {
        self.inner.list_units(group)
    }

    fn get_raw_unit(
        &self,
        group: &str,
        unit: &str,
    ) -> Result<crate::dataset::RawDataset, CollectionError> {
        self.inner.get_raw_unit(group, unit)
    }

    fn presence_genes(&self, group: &str, unit: &str) -> Result<HashSet<String>, CollectionError> {
        if unit == self.sample {
            return Ok(["G".to_string(), "Q".to_string()].into_iter().collect());
        }
        self.inner.presence_genes(group, unit)
    }
}

#[test]
fn test_sample_without_core_genes_is_recomputed() {
    let schema = SchemaModel::default();
    let (dir, uri) = ingested_demo(&schema);
    let collection = WithoutCoreGenes {
        inner: MtxCollection::new(&dir.path().join("raw"), &schema),
        sample: "sample_1",
    };
    let computer =
        PresenceMatrixComputer::new(&schema, &collection, AnyExecutor::Serial(SerialExecutor));

    let first = computer.compute(&uri).unwrap();
    assert_eq!(first.computed, 3);
    assert!(first.failures.is_empty());
    let rows = presence_rows(&uri);
    assert_eq!(rows[1], vec![0, 0, 0]);

    // nothing stored for sample_1, so only its row is computed again
    let second = computer.compute(&uri).unwrap();
    assert_eq!(second.computed, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(presence_rows(&uri), rows);
}
