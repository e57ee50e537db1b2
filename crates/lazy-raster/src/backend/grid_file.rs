//! Single-layer grid files: a JSON header followed by raw little-endian data.
//!
//! # Layout
//!
//! ```text
//! offset  size  contents
//! 0       8     magic "LRGRID01"
//! 8       4     header length N (u32, little-endian)
//! 12      N     JSON header {shape, dtype, missing_value, dims, attributes}
//! 12+N    ...   row-major element data, little-endian
//! ```
//!
//! Blocks are read and written in place by seeking to each contiguous run.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Backend, BackendResource};
use crate::error::{RasterError, Result};
use crate::raster::RasterArray;
use crate::types::{
    for_each_run, full_block, missing_from_json, missing_to_json, ArrayMetadata, DataType,
    Dimension, Metadata, OpenMode,
};

const MAGIC: &[u8; 8] = b"LRGRID01";
const PREAMBLE_LEN: u64 = 12;

#[derive(Debug, Serialize, Deserialize)]
struct GridHeader {
    shape: Vec<u64>,
    dtype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    missing_value: Option<serde_json::Value>,
    #[serde(default)]
    dims: Vec<Dimension>,
    #[serde(default)]
    attributes: Metadata,
}

/// Backend for `.grd` grid files. Does not support collection writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridFileBackend;

impl GridFileBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for GridFileBackend {
    fn name(&self) -> &'static str {
        "grd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["grd"]
    }

    fn open(
        &self,
        path: &Path,
        selector: Option<&str>,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendResource>> {
        if let Some(layer) = selector {
            return Err(RasterError::backend(format!(
                "{} holds a single layer, cannot select '{}'",
                path.display(),
                layer
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(mode.is_writable())
            .open(path)
            .map_err(|e| RasterError::backend(format!("cannot open {}: {}", path.display(), e)))?;

        let file_len = file.metadata()?.len();
        let (metadata, data_offset, data_len) = read_header(&mut file, file_len)
            .map_err(|e| RasterError::backend(format!("{}: {}", path.display(), e)))?;

        let needed = data_offset.saturating_add(data_len);
        if file_len < needed {
            return Err(RasterError::backend(format!(
                "{} is truncated: {} bytes, expected {}",
                path.display(),
                file_len,
                needed
            )));
        }

        Ok(Box::new(GridFileResource {
            file: Some(file),
            metadata,
            data_offset,
            dirty: false,
        }))
    }

    fn write_single(&self, path: &Path, array: &RasterArray) -> Result<()> {
        let shape = array.shape();
        let dtype = array.dtype();
        // Read everything before truncating: the source may be this very file.
        let values = array.read_block(&full_block(&shape))?;

        let header = GridHeader {
            shape,
            dtype,
            missing_value: array.missing_value().map(missing_to_json),
            dims: array.dims().to_vec(),
            attributes: array.metadata().clone(),
        };
        let header = serde_json::to_vec(&header)?;

        let mut bytes = Vec::with_capacity(
            PREAMBLE_LEN as usize + header.len() + values.len() * dtype.size_bytes(),
        );
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&header);
        for &value in &values {
            dtype.encode_le(value, &mut bytes);
        }

        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Parse the preamble and header; returns the metadata, the data offset and
/// the byte length of the data section.
fn read_header(file: &mut File, file_len: u64) -> Result<(ArrayMetadata, u64, u64)> {
    let mut preamble = [0u8; PREAMBLE_LEN as usize];
    file.read_exact(&mut preamble)
        .map_err(|_| RasterError::invalid_metadata("file too short for a grid header"))?;
    if &preamble[..8] != MAGIC {
        return Err(RasterError::invalid_metadata("not a grid file (bad magic)"));
    }
    let header_len = u32::from_le_bytes([preamble[8], preamble[9], preamble[10], preamble[11]]);
    let data_offset = PREAMBLE_LEN + header_len as u64;
    if data_offset > file_len {
        return Err(RasterError::invalid_metadata(format!(
            "header length {} exceeds file length {}",
            header_len, file_len
        )));
    }

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .map_err(|_| RasterError::invalid_metadata("grid header is truncated"))?;
    let header: GridHeader = serde_json::from_slice(&header)?;

    let dims = if header.dims.is_empty() {
        Vec::new()
    } else {
        let lens: Vec<u64> = header.dims.iter().map(|d| d.len).collect();
        if lens != header.shape {
            return Err(RasterError::invalid_metadata(format!(
                "dims {:?} disagree with shape {:?}",
                lens, header.shape
            )));
        }
        header.dims
    };

    let data_len = header
        .shape
        .iter()
        .try_fold(header.dtype.size_bytes() as u64, |acc, &len| acc.checked_mul(len))
        .ok_or_else(|| {
            RasterError::invalid_metadata(format!("shape {:?} is too large", header.shape))
        })?;

    let metadata = ArrayMetadata {
        shape: header.shape,
        dtype: header.dtype,
        missing_value: header.missing_value.as_ref().and_then(missing_from_json),
        dims,
        attributes: header.attributes,
    };
    Ok((metadata, data_offset, data_len))
}

struct GridFileResource {
    file: Option<File>,
    metadata: ArrayMetadata,
    data_offset: u64,
    dirty: bool,
}

impl GridFileResource {
    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| RasterError::io("grid file already closed"))
    }

    fn runs(&self, ranges: &[Range<u64>]) -> Vec<(u64, usize, usize)> {
        let mut runs = Vec::new();
        for_each_run(&self.metadata.shape, ranges, |offset, block_offset, len| {
            runs.push((offset, block_offset, len))
        });
        runs
    }
}

impl BackendResource for GridFileResource {
    fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    fn read_block(&mut self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        let dtype = self.metadata.dtype;
        let size = dtype.size_bytes();
        let data_offset = self.data_offset;
        let runs = self.runs(ranges);
        let total: usize = runs.iter().map(|&(_, _, len)| len).sum();

        let mut values = vec![0.0; total];
        let mut buf = Vec::new();
        let file = self.file()?;
        for (offset, block_offset, len) in runs {
            buf.resize(len * size, 0);
            file.seek(SeekFrom::Start(data_offset + offset * size as u64))?;
            file.read_exact(&mut buf)?;
            for (i, chunk) in buf.chunks_exact(size).enumerate() {
                values[block_offset + i] = dtype.decode_le(chunk)?;
            }
        }
        Ok(values)
    }

    fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        let dtype = self.metadata.dtype;
        let size = dtype.size_bytes();
        let data_offset = self.data_offset;
        let runs = self.runs(ranges);

        let mut buf = Vec::new();
        let file = self.file()?;
        for (offset, block_offset, len) in runs {
            buf.clear();
            for &value in &values[block_offset..block_offset + len] {
                dtype.encode_le(value, &mut buf);
            }
            file.seek(SeekFrom::Start(data_offset + offset * size as u64))?;
            file.write_all(&buf)?;
        }
        self.dirty = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            if self.dirty {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_array() -> RasterArray {
        let data = (0..6).map(|v| v as f64 * 1.5).collect();
        RasterArray::from_vec(vec![2, 3], DataType::Float32, data)
            .unwrap()
            .rebuild()
            .missing_value(Some(-9999.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_write_then_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.grd");
        let backend = GridFileBackend::new();
        backend.write_single(&path, &sample_array()).unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        let meta = resource.metadata().clone();
        assert_eq!(meta.shape, vec![2, 3]);
        assert_eq!(meta.dtype, DataType::Float32);
        assert_eq!(meta.missing_value, Some(-9999.0));
        assert_eq!(meta.dims[0].name, "y");
        assert_eq!(
            resource.read_block(&[1..2, 1..3]).unwrap(),
            vec![6.0, 7.5]
        );
        resource.close().unwrap();
    }

    #[test]
    fn test_block_write_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.grd");
        let backend = GridFileBackend::new();
        backend.write_single(&path, &sample_array()).unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Write).unwrap();
        resource.write_block(&[0..2, 2..3], &[-1.0, -2.0]).unwrap();
        resource.close().unwrap();

        let mut resource = backend.open(&path, None, OpenMode::Read).unwrap();
        assert_eq!(
            resource.read_block(&[0..2, 0..3]).unwrap(),
            vec![0.0, 1.5, -1.0, 4.5, 6.0, -2.0]
        );
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.grd");
        std::fs::write(&path, b"definitely not a grid").unwrap();
        let err = GridFileBackend::new()
            .open(&path, None, OpenMode::Read)
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_rejects_selector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.grd");
        let backend = GridFileBackend::new();
        backend.write_single(&path, &sample_array()).unwrap();
        let err = backend.open(&path, Some("band1"), OpenMode::Read).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
    }

    #[test]
    fn test_rejects_truncated_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.grd");
        GridFileBackend::new()
            .write_single(&path, &sample_array())
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let err = GridFileBackend::new()
            .open(&path, None, OpenMode::Read)
            .err()
            .unwrap();
        assert!(err.to_string().contains("truncated"));
    }

    fn write_raw(path: &Path, header: &[u8], declared_len: u32) {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&declared_len.to_le_bytes());
        bytes.extend_from_slice(header);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.grd");
        let header = br#"{"shape":[4294967296,4294967296,4294967296],"dtype":"float64"}"#;
        write_raw(&path, header, header.len() as u32);

        let registry = crate::BackendRegistry::with_defaults();
        let err = RasterArray::from_path(&registry, &path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_rejects_header_longer_than_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.grd");
        write_raw(&path, br#"{"shape":[1],"dtype":"uint8"}"#, u32::MAX);

        let err = GridFileBackend::new()
            .open(&path, None, OpenMode::Read)
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
        assert!(err.to_string().contains("exceeds file length"));
    }
}
