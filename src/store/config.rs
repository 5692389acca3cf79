use std::collections::HashMap;

use arrow::datatypes::Schema;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;
use parquet::schema::types::ColumnPath;
use serde_json::Value;

use super::{SOMA_DATA, SOMA_DIM_0, SOMA_DIM_1, SOMA_JOINID};

/// Codec of store fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// ZSTD at the given level (1-22)
    Zstd(i32),
    /// Snappy
    Snappy,
    /// Stored as is
    Uncompressed,
}

impl Default for CompressionType {
    fn default() -> Self {
        Self::Zstd(3)
    }
}

impl CompressionType {
    fn codec(self) -> Compression {
        match self {
            Self::Zstd(level) => Compression::ZSTD(ZstdLevel::try_new(level).unwrap_or_default()),
            Self::Snappy => Compression::SNAPPY,
            Self::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// Parquet settings shared by every fragment an experiment writes.
///
/// Per-array storage hints from the schema (`zstd_level`, `row_group_size`) are
/// layered on top with [`StoreConfig::with_hint`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Fragment codec
    pub compression: CompressionType,

    /// Maximum rows per row group
    pub row_group_size: usize,

    /// Chunk-level min/max statistics, used by readers to skip row groups
    pub write_statistics: bool,

    /// Dictionary-encode string columns of obs and var fragments
    pub dictionary_frames: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl StoreConfig {
    /// ZSTD 3, 100k-row groups
    pub fn balanced() -> Self {
        Self {
            compression: CompressionType::Zstd(3),
            row_group_size: 100_000,
            write_statistics: true,
            dictionary_frames: true,
        }
    }

    /// Snappy, small row groups, no statistics
    pub fn fast_write() -> Self {
        Self {
            compression: CompressionType::Snappy,
            row_group_size: 50_000,
            write_statistics: false,
            dictionary_frames: false,
        }
    }

    /// ZSTD 22, large row groups
    pub fn max_compression() -> Self {
        Self {
            compression: CompressionType::Zstd(22),
            row_group_size: 500_000,
            write_statistics: true,
            dictionary_frames: true,
        }
    }

    /// Copy with a per-array storage hint applied.
    pub fn with_hint(&self, hint: &Value) -> Self {
        let mut config = self.clone();
        if let Some(level) = hint.get("zstd_level").and_then(Value::as_i64) {
            config.compression = CompressionType::Zstd(level as i32);
        }
        if let Some(rows) = hint.get("row_group_size").and_then(Value::as_u64) {
            config.row_group_size = rows.max(1) as usize;
        }
        config
    }

    /// Writer properties for one fragment of `schema`.
    pub(super) fn writer_properties(
        &self,
        schema: &Schema,
        metadata: &HashMap<String, String>,
    ) -> WriterProperties {
        let statistics = if self.write_statistics {
            EnabledStatistics::Chunk
        } else {
            EnabledStatistics::None
        };
        let mut builder = WriterProperties::builder()
            .set_compression(self.compression.codec())
            .set_statistics_enabled(statistics)
            .set_max_row_group_size(self.row_group_size)
            .set_dictionary_enabled(self.dictionary_frames);

        // index and coordinate columns are unique or near unique
        for field in schema.fields() {
            let name = field.name().as_str();
            if [SOMA_JOINID, SOMA_DIM_0, SOMA_DIM_1, SOMA_DATA].contains(&name) {
                builder = builder.set_column_dictionary_enabled(ColumnPath::from(name), false);
            }
        }

        let kv: Vec<KeyValue> = metadata
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect();
        builder.set_key_value_metadata(Some(kv)).build()
    }
}
