//! Named store presets, so users pick a trade-off instead of Parquet knobs.

use std::fmt;

use scatlas::store::{CompressionType, StoreConfig};

/// Trade-off between ingestion speed and atlas size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    /// Snappy fragments in 50k-row groups, no statistics.
    Fast,
    /// ZSTD 3 in 100k-row groups.
    #[default]
    Balanced,
    /// ZSTD 22 in 500k-row groups. Slow to ingest, smallest atlas.
    MaxCompression,
}

impl Profile {
    fn name(self) -> &'static str {
        match self {
            Profile::Fast => "fast",
            Profile::Balanced => "balanced",
            Profile::MaxCompression => "max-compression",
        }
    }

    /// Store configuration of this preset, optionally forcing a ZSTD level.
    pub fn store_config(self, zstd_level: Option<i32>) -> StoreConfig {
        let mut config = match self {
            Profile::Fast => StoreConfig::fast_write(),
            Profile::Balanced => StoreConfig::balanced(),
            Profile::MaxCompression => StoreConfig::max_compression(),
        };
        if let Some(level) = zstd_level {
            config.compression = CompressionType::Zstd(level);
        }
        config
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
