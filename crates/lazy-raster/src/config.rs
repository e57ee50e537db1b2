//! Layout settings for newly written files.
//!
//! Every setting can come from the environment:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `LAZY_RASTER_CHUNK_SIZE` | `zarr_chunk_size` | 512 |
//! | `LAZY_RASTER_COMPRESSION` | `zarr_compression` | `blosc_zstd` |
//! | `LAZY_RASTER_COMPRESSION_LEVEL` | `zarr_compression_level` | 1 |
//! | `LAZY_RASTER_SHUFFLE` | `zarr_shuffle` | true |
//!
//! Values that do not parse are logged and leave the default in place;
//! range checks happen in [`RasterConfig::validate`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};

const CHUNK_SIZE_VAR: &str = "LAZY_RASTER_CHUNK_SIZE";
const COMPRESSION_VAR: &str = "LAZY_RASTER_COMPRESSION";
const COMPRESSION_LEVEL_VAR: &str = "LAZY_RASTER_COMPRESSION_LEVEL";
const SHUFFLE_VAR: &str = "LAZY_RASTER_SHUFFLE";

/// How backends lay out the files they create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Chunk edge length for Zarr arrays; shorter axes use their full length.
    pub zarr_chunk_size: usize,

    pub zarr_compression: ZarrCompression,

    /// Blosc level, 1 (fastest) to 9 (smallest).
    pub zarr_compression_level: u8,

    /// Byte-shuffle elements before compressing.
    pub zarr_shuffle: bool,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            zarr_chunk_size: 512,
            zarr_compression: ZarrCompression::default(),
            zarr_compression_level: 1,
            zarr_shuffle: true,
        }
    }
}

impl RasterConfig {
    /// Defaults overridden by `LAZY_RASTER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(size) = parsed(&lookup, CHUNK_SIZE_VAR) {
            config.zarr_chunk_size = size;
        }
        if let Some(compression) = parsed(&lookup, COMPRESSION_VAR) {
            config.zarr_compression = compression;
        }
        if let Some(level) = parsed(&lookup, COMPRESSION_LEVEL_VAR) {
            config.zarr_compression_level = level;
        }
        if let Some(raw) = lookup(SHUFFLE_VAR) {
            config.zarr_shuffle = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Reject settings no backend can honour.
    pub fn validate(&self) -> Result<()> {
        if self.zarr_chunk_size == 0 {
            return Err(RasterError::Config(
                "zarr chunk size must be at least 1".to_string(),
            ));
        }
        if !(1..=9).contains(&self.zarr_compression_level) {
            return Err(RasterError::Config(format!(
                "zarr compression level {} outside 1..=9",
                self.zarr_compression_level
            )));
        }
        Ok(())
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(variable = key, value = %raw, error = %e, "Ignoring unparseable setting");
            None
        }
    }
}

/// Codec applied to Zarr chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    None,
    Lz4,
    Zstd,
    BloscLz4,
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl FromStr for ZarrCompression {
    type Err = RasterError;

    /// Case-insensitive codec name.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            "blosc_lz4" => Ok(Self::BloscLz4),
            "blosc_zstd" => Ok(Self::BloscZstd),
            other => Err(RasterError::Config(format!(
                "unknown zarr compression '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
