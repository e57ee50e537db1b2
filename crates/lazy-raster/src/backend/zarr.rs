//! Zarr V3 backend on the local filesystem.
//!
//! A single array is stored at the root of the store. A collection is a group
//! at the root listing its layers in the `layers` attribute, with one array
//! per layer at `/<name>`.
//!
//! Labels travel as array attributes:
//! - `_ARRAY_DIMENSIONS`: dimension names
//! - `dimension_coords`: `[start, step]` per dimension
//! - `missing_value`: the no-data marker, absent when there is none

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{
    Array, ArrayBuilder, ChunkGrid, DataType as ZarrDataType, Element, ElementOwned, FillValue,
};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use super::{Backend, BackendResource};
use crate::config::{RasterConfig, ZarrCompression};
use crate::error::{RasterError, Result};
use crate::raster::RasterArray;
use crate::stack::RasterStack;
use crate::types::{
    full_block, missing_from_json, missing_to_json, ArrayMetadata, DataType, Dimension, Metadata,
    OpenMode,
};

const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";
const DIMENSION_COORDS: &str = "dimension_coords";
const MISSING_VALUE: &str = "missing_value";
const LAYERS: &str = "layers";
// Provenance attribute zarrs adds to every stored node.
const ZARRS_PROVENANCE: &str = "_zarrs";

/// Backend for `.zarr` directories. Supports collection writes.
#[derive(Debug, Clone)]
pub struct ZarrBackend {
    config: RasterConfig,
}

impl ZarrBackend {
    /// Create a backend writing chunks and codecs as configured.
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn store(path: &Path) -> Result<Arc<FilesystemStore>> {
        let store = FilesystemStore::new(path).map_err(|e| {
            RasterError::backend(format!("cannot open store {}: {}", path.display(), e))
        })?;
        Ok(Arc::new(store))
    }

    /// Create the array at `node` and store `array`'s values into it.
    fn create_array(
        &self,
        store: Arc<FilesystemStore>,
        node: &str,
        array: &RasterArray,
        values: &[f64],
    ) -> Result<()> {
        let shape = array.shape();
        let dtype = array.dtype();
        let chunk_size = self.config.zarr_chunk_size as u64;

        let chunk_grid: ChunkGrid = shape
            .iter()
            .map(|&len| len.min(chunk_size).max(1))
            .collect::<Vec<u64>>()
            .try_into()
            .map_err(|e| RasterError::Config(format!("{:?}", e)))?;

        let fill = array.missing_value().unwrap_or(f64::NAN);
        let (zarr_dtype, fill_value) = match dtype {
            DataType::UInt8 => (ZarrDataType::UInt8, FillValue::from(fill as u8)),
            DataType::Int16 => (ZarrDataType::Int16, FillValue::from(fill as i16)),
            DataType::Int32 => (ZarrDataType::Int32, FillValue::from(fill as i32)),
            DataType::Float32 => (ZarrDataType::Float32, FillValue::from(fill as f32)),
            DataType::Float64 => (ZarrDataType::Float64, FillValue::from(fill)),
        };

        let mut attrs = array.metadata().clone();
        let names: Vec<&str> = array.dims().iter().map(|d| d.name.as_str()).collect();
        let coords: Vec<[f64; 2]> = array.dims().iter().map(|d| [d.start, d.step]).collect();
        attrs.insert(ARRAY_DIMENSIONS.to_string(), serde_json::json!(names));
        attrs.insert(DIMENSION_COORDS.to_string(), serde_json::json!(coords));
        match array.missing_value() {
            Some(missing) => {
                attrs.insert(MISSING_VALUE.to_string(), missing_to_json(missing));
            }
            None => {
                attrs.remove(MISSING_VALUE);
            }
        }

        let mut binding = ArrayBuilder::new(shape.clone(), zarr_dtype, chunk_grid, fill_value);
        let mut builder = binding.attributes(attrs);
        if self.config.zarr_compression != ZarrCompression::None {
            builder = builder.bytes_to_bytes_codecs(vec![self.compression_codec(dtype)?]);
        }

        let zarr = builder
            .build(store, node)
            .map_err(|e| RasterError::backend(e.to_string()))?;
        zarr.store_metadata()
            .map_err(|e| RasterError::io(e.to_string()))?;

        let subset = ArraySubset::new_with_shape(shape);
        store_values(&zarr, &subset, dtype, values)
    }

    fn compression_codec(&self, dtype: DataType) -> Result<Arc<dyn BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| RasterError::Config("invalid compression level".to_string()))?;

        let (shuffle, typesize) = if self.config.zarr_shuffle {
            (BloscShuffleMode::Shuffle, Some(dtype.size_bytes()))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(RasterError::Config("no compression configured".to_string()))
            }
            ZarrCompression::Lz4 | ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::Zstd | ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| RasterError::Config(e.to_string()))?;
        Ok(Arc::new(codec))
    }
}

impl Backend for ZarrBackend {
    fn name(&self) -> &'static str {
        "zarr"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["zarr"]
    }

    fn open(
        &self,
        path: &Path,
        selector: Option<&str>,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendResource>> {
        let store = Self::store(path)?;
        let node = node_path(selector);
        let array = Array::open(store, &node).map_err(|e| {
            RasterError::backend(format!("cannot open {}{}: {}", path.display(), node, e))
        })?;
        let metadata = read_metadata(&array)?;

        tracing::debug!(
            path = %path.display(),
            node = %node,
            mode = ?mode,
            "Opened zarr array"
        );

        Ok(Box::new(ZarrResource {
            array: Some(array),
            metadata,
        }))
    }

    fn layers(&self, path: &Path) -> Result<Vec<String>> {
        let store = Self::store(path)?;
        let group = match Group::open(store, "/") {
            Ok(group) => group,
            Err(_) => return Ok(Vec::new()),
        };
        let names = match group.attributes().get(LAYERS) {
            Some(serde_json::Value::Array(names)) => names,
            _ => return Ok(Vec::new()),
        };
        names
            .iter()
            .map(|name| {
                name.as_str().map(str::to_string).ok_or_else(|| {
                    RasterError::invalid_metadata(format!("layer name {} is not a string", name))
                })
            })
            .collect()
    }

    fn supports_composite_write(&self) -> bool {
        true
    }

    fn write_single(&self, path: &Path, array: &RasterArray) -> Result<()> {
        let values = array.read_block(&full_block(&array.shape()))?;
        prepare_target(path)?;
        let store = Self::store(path)?;
        self.create_array(store, "/", array, &values)
    }

    fn write_composite(&self, path: &Path, stack: &RasterStack) -> Result<()> {
        let mut layers = Vec::with_capacity(stack.len());
        for (name, array) in stack.iter() {
            if name.is_empty() || name.contains('/') {
                return Err(RasterError::backend(format!(
                    "'{}' is not a valid zarr layer name",
                    name
                )));
            }
            let values = array.read_block(&full_block(&array.shape()))?;
            layers.push((name, array, values));
        }

        prepare_target(path)?;
        let store = Self::store(path)?;

        let mut attrs = stack.metadata().clone();
        let names: Vec<&str> = stack.names().collect();
        attrs.insert(LAYERS.to_string(), serde_json::json!(names));
        let mut binding = GroupBuilder::new();
        let group = binding
            .attributes(attrs)
            .build(store.clone(), "/")
            .map_err(|e| RasterError::backend(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| RasterError::io(e.to_string()))?;

        for (name, array, values) in layers {
            self.create_array(store.clone(), &node_path(Some(name)), array, &values)?;
        }
        Ok(())
    }
}

struct ZarrResource {
    array: Option<Array<FilesystemStore>>,
    metadata: ArrayMetadata,
}

impl ZarrResource {
    fn array(&self) -> Result<&Array<FilesystemStore>> {
        self.array
            .as_ref()
            .ok_or_else(|| RasterError::io("zarr array already closed"))
    }
}

impl BackendResource for ZarrResource {
    fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    fn read_block(&mut self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        let subset = ArraySubset::new_with_ranges(ranges);
        let array = self.array()?;
        match self.metadata.dtype {
            DataType::UInt8 => retrieve::<u8>(array, &subset),
            DataType::Int16 => retrieve::<i16>(array, &subset),
            DataType::Int32 => retrieve::<i32>(array, &subset),
            DataType::Float32 => retrieve::<f32>(array, &subset),
            DataType::Float64 => retrieve::<f64>(array, &subset),
        }
    }

    fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        let subset = ArraySubset::new_with_ranges(ranges);
        store_values(self.array()?, &subset, self.metadata.dtype, values)
    }

    fn close(&mut self) -> Result<()> {
        self.array = None;
        Ok(())
    }
}

fn node_path(selector: Option<&str>) -> String {
    match selector {
        Some(name) => format!("/{}", name),
        None => "/".to_string(),
    }
}

/// Remove whatever is at `path` and create an empty store directory.
fn prepare_target(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

fn read_metadata(array: &Array<FilesystemStore>) -> Result<ArrayMetadata> {
    let dtype = match array.data_type() {
        ZarrDataType::UInt8 => DataType::UInt8,
        ZarrDataType::Int16 => DataType::Int16,
        ZarrDataType::Int32 => DataType::Int32,
        ZarrDataType::Float32 => DataType::Float32,
        ZarrDataType::Float64 => DataType::Float64,
        other => {
            return Err(RasterError::backend(format!(
                "unsupported zarr data type {:?}",
                other
            )))
        }
    };
    let shape = array.shape().to_vec();

    let mut attributes: Metadata = array.attributes().clone();
    attributes.remove(ZARRS_PROVENANCE);
    let names = attributes.remove(ARRAY_DIMENSIONS);
    let coords = attributes.remove(DIMENSION_COORDS);
    let missing_value = attributes
        .remove(MISSING_VALUE)
        .as_ref()
        .and_then(missing_from_json);

    Ok(ArrayMetadata {
        dims: dims_from_attributes(&shape, names, coords),
        shape,
        dtype,
        missing_value,
        attributes,
    })
}

/// Dimensions described by the label attributes, or none if they are absent
/// or do not fit `shape`.
fn dims_from_attributes(
    shape: &[u64],
    names: Option<serde_json::Value>,
    coords: Option<serde_json::Value>,
) -> Vec<Dimension> {
    let names: Vec<String> = match names.map(serde_json::from_value) {
        Some(Ok(names)) => names,
        _ => return Vec::new(),
    };
    if names.len() != shape.len() {
        return Vec::new();
    }
    let coords: Vec<[f64; 2]> = coords
        .and_then(|c| serde_json::from_value(c).ok())
        .filter(|c: &Vec<[f64; 2]>| c.len() == shape.len())
        .unwrap_or_else(|| vec![[0.0, 1.0]; shape.len()]);

    names
        .into_iter()
        .zip(shape)
        .zip(coords)
        .map(|((name, &len), [start, step])| Dimension::new(name, len).with_coords(start, step))
        .collect()
}

fn retrieve<T: ElementOwned + Into<f64>>(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
) -> Result<Vec<f64>> {
    let values: Vec<T> = array
        .retrieve_array_subset_elements(subset)
        .map_err(|e| RasterError::io(e.to_string()))?;
    Ok(values.into_iter().map(Into::into).collect())
}

fn store<T: Element>(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
    values: Vec<T>,
) -> Result<()> {
    array
        .store_array_subset_elements(subset, &values)
        .map_err(|e| RasterError::io(e.to_string()))
}

fn store_values(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
    dtype: DataType,
    values: &[f64],
) -> Result<()> {
    match dtype {
        DataType::UInt8 => store(array, subset, values.iter().map(|&v| v as u8).collect()),
        DataType::Int16 => store(array, subset, values.iter().map(|&v| v as i16).collect()),
        DataType::Int32 => store(array, subset, values.iter().map(|&v| v as i32).collect()),
        DataType::Float32 => store(array, subset, values.iter().map(|&v| v as f32).collect()),
        DataType::Float64 => store(array, subset, values.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> ZarrBackend {
        ZarrBackend::new(&RasterConfig {
            zarr_chunk_size: 2,
            ..Default::default()
        })
    }

    fn elevation() -> RasterArray {
        let dims = vec![
            Dimension::new("lat", 3).with_coords(50.0, -0.5),
            Dimension::new("lon", 4).with_coords(10.0, 0.25),
        ];
        let data = (0..12).map(|v| v as f64).collect();
        let payload = crate::payload::MemoryArray::new(vec![3, 4], DataType::Int16, data).unwrap();
        let mut attrs = Metadata::new();
        attrs.insert("units".to_string(), serde_json::json!("m"));
        RasterArray::new(payload.into(), dims)
            .unwrap()
            .rebuild()
            .metadata(attrs)
            .missing_value(Some(-32768.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_array_labels_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elevation.zarr");
        let backend = backend();
        backend.write_single(&path, &elevation()).unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        let meta = resource.metadata().clone();
        assert_eq!(meta.shape, vec![3, 4]);
        assert_eq!(meta.dtype, DataType::Int16);
        assert_eq!(meta.missing_value, Some(-32768.0));
        assert_eq!(meta.dims[1].name, "lon");
        assert_eq!(meta.dims[0].start, 50.0);
        assert_eq!(meta.dims[0].step, -0.5);
        assert_eq!(meta.attributes.get("units"), Some(&serde_json::json!("m")));
        assert_eq!(meta.attributes.keys().collect::<Vec<_>>(), vec!["units"]);
        assert_eq!(
            resource.read_block(&[1..3, 2..4]).unwrap(),
            vec![6.0, 7.0, 10.0, 11.0]
        );
        assert!(backend.layers(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_block_across_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elevation.zarr");
        let backend = backend();
        backend.write_single(&path, &elevation()).unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Write).unwrap();
        resource.write_block(&[1..2, 1..4], &[-1.0, -2.0, -3.0]).unwrap();
        resource.close().unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        assert_eq!(
            resource.read_block(&[1..2, 0..4]).unwrap(),
            vec![4.0, -1.0, -2.0, -3.0]
        );
    }

    #[test]
    fn test_missing_layer_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elevation.zarr");
        backend().write_single(&path, &elevation()).unwrap();
        let err = backend()
            .open(&path, Some("slope"), OpenMode::Read)
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
    }

    #[test]
    fn test_rewrite_keeps_attributes_stable() {
        let dir = TempDir::new().unwrap();
        let backend = backend();
        let first = dir.path().join("first.zarr");
        backend.write_single(&first, &elevation()).unwrap();

        let registry = crate::BackendRegistry::with_defaults();
        let read = RasterArray::from_path(&registry, &first).unwrap();
        let second = dir.path().join("second.zarr");
        backend.write_single(&second, &read).unwrap();

        let resource = backend.open(&second, None, OpenMode::Read).unwrap();
        assert_eq!(resource.metadata().attributes, elevation().metadata().clone());
    }

    #[test]
    fn test_zero_chunk_size_still_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny_chunks.zarr");
        let backend = ZarrBackend::new(&RasterConfig {
            zarr_chunk_size: 0,
            ..Default::default()
        });
        backend.write_single(&path, &elevation()).unwrap();
        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        assert_eq!(resource.read_block(&[2..3, 3..4]).unwrap(), vec![11.0]);
    }

    #[test]
    fn test_uncompressed_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.zarr");
        let backend = ZarrBackend::new(&RasterConfig {
            zarr_compression: ZarrCompression::None,
            ..Default::default()
        });
        backend.write_single(&path, &elevation()).unwrap();
        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        assert_eq!(resource.read_block(&[0..1, 0..2]).unwrap(), vec![0.0, 1.0]);
    }
}
