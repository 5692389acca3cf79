//! Synthetic directory-of-studies tree for demos and tests.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use super::CollectionError;

/// Demo counts, genes x cells, as written to every sample.
pub const DEMO_COUNTS: [[u32; 3]; 3] = [[1, 0, 0], [0, 1, 1], [1, 1, 0]];

/// Demo features as `(feature id, gene symbol)`.
pub const DEMO_FEATURES: [(&str, &str); 3] = [("A", "D"), ("B", "A"), ("C", "G")];

/// Studies and samples of the demo tree.
pub const DEMO_LAYOUT: &[(&str, &[&str])] = &[
    ("study_0", &["sample_0", "sample_1"]),
    ("study_1", &["sample_2"]),
];

const DEMO_CELL_TYPES: [&str; 3] = ["T-cell", "B-cell", "Monocyte"];

/// Create the demo tree under `base`: two studies, three samples of three cells each,
/// with cell and sample metadata. Barcodes are random and unique.
pub fn create_demo_structure(base: &Path) -> Result<Vec<PathBuf>, CollectionError> {
    let mut sample_dirs = Vec::new();
    for (study, samples) in DEMO_LAYOUT {
        let study_dir = base.join(study);

        let mut sample_rows = vec![vec![
            "sample_name".to_string(),
            "study_name".to_string(),
            "batch_name".to_string(),
        ]];
        let mut cell_rows = vec![vec![
            "barcode".to_string(),
            "standard_true_celltype".to_string(),
            "authors_celltype".to_string(),
        ]];

        for sample in samples.iter() {
            let barcodes: Vec<String> = (0..DEMO_CELL_TYPES.len())
                .map(|_| uuid::Uuid::new_v4().simple().to_string())
                .collect();
            let dir = study_dir.join("mtx").join(sample);
            write_mtx_sample(&dir, &DEMO_COUNTS, &barcodes, &DEMO_FEATURES)?;
            sample_dirs.push(dir);

            sample_rows.push(vec![
                sample.to_string(),
                study.to_string(),
                "Batch1".to_string(),
            ]);
            for (barcode, cell_type) in barcodes.iter().zip(DEMO_CELL_TYPES) {
                cell_rows.push(vec![barcode.clone(), cell_type.to_string(), cell_type.to_string()]);
            }
        }

        let file_name = format!("{study}.tsv.gz");
        write_tsv_gz(&study_dir.join("sample_metadata").join(&file_name), &sample_rows)?;
        write_tsv_gz(&study_dir.join("cell_metadata").join(&file_name), &cell_rows)?;
    }
    info!("Created demo collection under {}", base.display());
    Ok(sample_dirs)
}

/// Write one Matrix-Market sample directory. `counts` is genes x cells.
pub fn write_mtx_sample<R: AsRef<[u32]>>(
    dir: &Path,
    counts: &[R],
    barcodes: &[String],
    features: &[(&str, &str)],
) -> Result<(), CollectionError> {
    fs::create_dir_all(dir)?;

    let entries: Vec<(usize, usize, u32)> = counts
        .iter()
        .enumerate()
        .flat_map(|(gene, row)| {
            row.as_ref()
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0)
                .map(move |(cell, v)| (gene, cell, *v))
        })
        .collect();

    let mut matrix = gz_writer(&dir.join("matrix.mtx.gz"))?;
    writeln!(matrix, "%%MatrixMarket matrix coordinate integer general")?;
    writeln!(matrix, "{} {} {}", counts.len(), barcodes.len(), entries.len())?;
    for (gene, cell, value) in entries {
        writeln!(matrix, "{} {} {}", gene + 1, cell + 1, value)?;
    }
    matrix.finish()?.flush()?;

    let barcode_rows: Vec<Vec<String>> = barcodes.iter().map(|b| vec![b.clone()]).collect();
    write_tsv_gz(&dir.join("barcodes.tsv.gz"), &barcode_rows)?;

    let feature_rows: Vec<Vec<String>> = features
        .iter()
        .map(|(id, gene)| vec![id.to_string(), gene.to_string()])
        .collect();
    write_tsv_gz(&dir.join("features.tsv.gz"), &feature_rows)?;
    Ok(())
}

fn gz_writer(path: &Path) -> Result<GzEncoder<BufWriter<File>>, CollectionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(GzEncoder::new(
        BufWriter::new(File::create(path)?),
        Compression::default(),
    ))
}

fn write_tsv_gz(path: &Path, rows: &[Vec<String>]) -> Result<(), CollectionError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(gz_writer(path)?);
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CollectionError::IoError(e.into_error()))?
        .finish()?
        .flush()?;
    Ok(())
}
