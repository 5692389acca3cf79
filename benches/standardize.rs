use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scatlas::dataset::{columns, RawDataset, Standardizer};
use scatlas::matrix::{from_triplets, normalize, Compression};
use scatlas::schema::{GeneUniverse, SchemaModel};
use sprs::CsMat;

use arrow::array::{ArrayRef, StringArray};
use std::sync::Arc;

const NUM_GENES: usize = 2_000;

/// Deterministic sparse counts with roughly `density` stored entries per row
fn synthetic_counts(cells: usize, density: usize) -> CsMat<f64> {
    let entries = (0..cells).flat_map(|cell| {
        (0..density).map(move |k| {
            let gene = (cell * 7919 + k * 104_729) % NUM_GENES;
            (cell, gene, ((cell + k) % 9 + 1) as f64)
        })
    });
    from_triplets((cells, NUM_GENES), entries, Compression::Csr)
}

fn gene_names() -> Vec<String> {
    (0..NUM_GENES).map(|i| format!("GENE{i:05}")).collect()
}

fn synthetic_dataset(cells: usize) -> RawDataset {
    let strings = |values: Vec<String>| -> ArrayRef { Arc::new(StringArray::from(values)) };
    let obs = columns::batch_from_columns(
        vec![
            (
                "barcode".to_string(),
                strings((0..cells).map(|i| format!("BC{i:08}")).collect()),
            ),
            ("sample_name".to_string(), strings(vec!["s1".to_string(); cells])),
            ("study_name".to_string(), strings(vec!["bench".to_string(); cells])),
        ],
        cells,
    )
    .unwrap();
    let var = columns::batch_from_columns(vec![("gene".to_string(), strings(gene_names()))], NUM_GENES)
        .unwrap();
    RawDataset::new(obs, var, synthetic_counts(cells, 200))
}

/// Benchmark log-normalization of a cells x genes matrix
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for cells in [1_000, 5_000, 20_000] {
        let matrix = synthetic_counts(cells, 200);
        group.throughput(Throughput::Elements(matrix.nnz() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{}cells", cells)), &matrix, |b, m| {
            b.iter(|| black_box(normalize(black_box(m), 10_000.0)));
        });
    }

    group.finish();
}

/// Benchmark validate + standardize of one unit
fn bench_standardize(c: &mut Criterion) {
    let mut group = c.benchmark_group("standardize");

    // half the genes are in the universe
    let universe = GeneUniverse::from_genes(gene_names().into_iter().step_by(2));
    let schema = SchemaModel::default().with_gene_universe(universe);
    let standardizer = Standardizer::new(&schema).unwrap();

    for cells in [1_000, 5_000] {
        let dataset = synthetic_dataset(cells);
        group.throughput(Throughput::Elements(cells as u64));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{}cells", cells)), &dataset, |b, d| {
            b.iter(|| {
                let mut validated = standardizer.validate(d.clone(), "bench").unwrap();
                standardizer.standardize(&mut validated).unwrap();
                black_box(validated);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_standardize);
criterion_main!(benches);
