//! Property tests for normalization, standardization and presence rows

use proptest::prelude::*;
use scatlas::dataset::{columns, RawDataset, Standardizer};
use scatlas::matrix::{from_dense, normalize};
use scatlas::presence::presence_row;
use scatlas::schema::{GeneUniverse, SchemaModel};

use arrow::array::{ArrayRef, StringArray};
use std::collections::BTreeSet;
use std::sync::Arc;

const GENE_POOL: [&str; 8] = ["A", "B", "MT-ND1", "RPS6", "RPL3", "X", "Y", "Z"];

fn strings(values: Vec<String>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

/// Row-major integer counts of the given shape.
fn counts(rows: usize, cols: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![3 => Just(0u32), 2 => 1u32..50], rows * cols)
        .prop_map(|values| values.into_iter().map(f64::from).collect())
}

/// A raw dataset over a random, duplicate-free subset of the gene pool.
fn raw_dataset() -> impl Strategy<Value = RawDataset> {
    (1usize..6, prop::sample::subsequence(GENE_POOL.to_vec(), 1..=GENE_POOL.len()))
        .prop_flat_map(|(cells, genes)| {
            let n_genes = genes.len();
            (Just(cells), Just(genes), counts(cells, n_genes))
        })
        .prop_map(|(cells, genes, values)| {
            let obs = columns::batch_from_columns(
                vec![
                    (
                        "barcode".to_string(),
                        strings((0..cells).map(|i| format!("cell-{i}")).collect()),
                    ),
                    ("sample_name".to_string(), strings(vec!["s1".to_string(); cells])),
                    ("study_name".to_string(), strings(vec!["st".to_string(); cells])),
                ],
                cells,
            )
            .unwrap();
            let var = columns::batch_from_columns(
                vec![(
                    "gene".to_string(),
                    strings(genes.iter().map(|g| g.to_string()).collect()),
                )],
                genes.len(),
            )
            .unwrap();
            RawDataset::new(obs, var, from_dense(cells, genes.len(), &values))
        })
}

fn permissive_schema() -> SchemaModel {
    let mut schema = SchemaModel::default()
        .with_gene_universe(GeneUniverse::from_genes(["RPL3", "A", "MT-ND1", "Q"]));
    schema.validation.gene_intersection_threshold_frac = 0.0;
    schema
}

proptest! {
    /// Nonzero rows sum back to the target after expm1; zero rows stay empty
    #[test]
    fn test_normalize_row_sums(
        (rows, cols, values) in (1usize..8, 1usize..8)
            .prop_flat_map(|(r, c)| (Just(r), Just(c), counts(r, c)))
    ) {
        let matrix = from_dense(rows, cols, &values);
        let normalized = normalize(&matrix, 10_000.0);
        prop_assert!(normalized.is_csr());

        for row in 0..rows {
            let original: f64 = values[row * cols..(row + 1) * cols].iter().sum();
            let restored: f64 = normalized
                .outer_view(row)
                .map(|view| view.iter().map(|(_, v)| v.exp_m1()).sum::<f64>())
                .unwrap_or(0.0);
            if original == 0.0 {
                prop_assert_eq!(restored, 0.0);
            } else {
                prop_assert!((restored - 10_000.0).abs() < 1e-6);
            }
        }
    }

    /// Standardization keeps only core genes, in input order, and is idempotent
    #[test]
    fn test_standardize_restricts_to_universe(dataset in raw_dataset()) {
        let schema = permissive_schema();
        let standardizer = Standardizer::new(&schema).unwrap();
        let input_genes = columns::column_strings(&dataset.var, "gene").unwrap();

        let mut once = standardizer.validate(dataset, "prop").unwrap();
        standardizer.standardize(&mut once).unwrap();

        let universe = schema.gene_universe().unwrap();
        let expected: Vec<String> = input_genes
            .into_iter()
            .filter(|g| universe.contains(g))
            .collect();
        prop_assert_eq!(once.var_strings("gene").unwrap(), expected.clone());
        prop_assert_eq!(once.num_vars(), expected.len());
        prop_assert_eq!(once.x().cols(), expected.len());

        let mut twice = once.clone();
        standardizer.standardize(&mut twice).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Presence rows mark exactly the universe genes seen
    #[test]
    fn test_presence_row_marks_seen_genes(
        genes in prop::collection::vec(prop::sample::select(GENE_POOL.to_vec()), 0..12)
    ) {
        let universe = GeneUniverse::from_genes(["Z", "A", "RPS6", "C"]);
        let row = presence_row(&universe, genes.iter().copied());
        prop_assert_eq!(row.len(), universe.num_genes());

        let seen: BTreeSet<&str> = genes.iter().copied().filter(|g| universe.contains(g)).collect();
        prop_assert_eq!(row.iter().filter(|v| **v == 1).count(), seen.len());
        for gene in seen {
            prop_assert_eq!(row[universe.index_of(gene).unwrap()], 1);
        }
    }
}
