//! Plain and gzip-compressed tab-separated text inputs.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

/// Open a text file, transparently decompressing it when the name ends in `.gz`.
pub(crate) fn open_text(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Tab-separated reader tolerant of ragged rows.
pub(crate) fn tsv_reader<R: Read>(reader: R, has_headers: bool) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(reader)
}

/// Locate `<dir>/<name>.gz` or `<dir>/<name>`, preferring the compressed file.
pub(crate) fn find_text_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let gz = dir.join(format!("{name}.gz"));
    if gz.is_file() {
        return Some(gz);
    }
    let plain = dir.join(name);
    plain.is_file().then_some(plain)
}

/// Read the first field of every non-empty line.
pub(crate) fn read_first_column(path: &Path) -> Result<Vec<String>, csv::Error> {
    let mut reader = tsv_reader(open_text(path)?, false);
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(field) = record.get(0) {
            let field = field.trim();
            if !field.is_empty() {
                values.push(field.to_string());
            }
        }
    }
    Ok(values)
}
