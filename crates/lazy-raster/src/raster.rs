//! The labelled raster array users manipulate.

use std::ops::Range;
use std::path::Path;

use crate::error::{RasterError, Result};
use crate::handle::FileHandle;
use crate::lazy::LazyArray;
use crate::payload::{MemoryArray, Payload, Window};
use crate::registry::BackendRegistry;
use crate::session::with_open;
use crate::structural::{find_files, Structural};
use crate::types::{full_block, DataType, Dimension, Metadata, OpenMode};

/// Options for constructing an array from a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOptions {
    /// Layer to select in a multi-layer source.
    pub layer: Option<String>,
    /// Allow direct block writes back to the file.
    pub writable: bool,
}

impl SourceOptions {
    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}

/// A raster array with named dimensions.
///
/// The data is either held in memory or backed by a file that stays closed
/// until it is read. Slices and selections are lazy views over the same data.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterArray {
    payload: Payload,
    dims: Vec<Dimension>,
    refdims: Vec<Dimension>,
    name: Option<String>,
    metadata: Metadata,
    missing_value: Option<f64>,
}

impl RasterArray {
    /// Wrap `payload` with the given dimensions.
    ///
    /// # Errors
    /// `DimensionMismatch` if `dims` does not describe the payload's shape.
    pub fn new(payload: Payload, dims: Vec<Dimension>) -> Result<Self> {
        check_dims(&dims, &payload.shape())?;
        Ok(Self {
            payload,
            dims,
            refdims: Vec::new(),
            name: None,
            metadata: Metadata::new(),
            missing_value: None,
        })
    }

    /// An in-memory array with default dimension names.
    pub fn from_vec(shape: Vec<u64>, dtype: DataType, data: Vec<f64>) -> Result<Self> {
        let dims = Dimension::defaults_for(&shape);
        Self::new(MemoryArray::new(shape, dtype, data)?.into(), dims)
    }

    /// A lazy, read-only array backed by the file at `path`.
    pub fn from_path(registry: &BackendRegistry, path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with(registry, path, &SourceOptions::default())
    }

    /// A lazy array backed by the file at `path`.
    ///
    /// The file is opened once to read its metadata and closed before this
    /// returns. The array is named after the selected layer, or the file stem.
    pub fn from_path_with(
        registry: &BackendRegistry,
        path: impl AsRef<Path>,
        options: &SourceOptions,
    ) -> Result<Self> {
        let lazy = LazyArray::open(registry, path, options.layer.as_deref(), options.writable)?;
        Self::from_lazy(lazy)
    }

    /// Wrap an already constructed lazy array, taking labels from its metadata.
    pub fn from_lazy(lazy: LazyArray) -> Result<Self> {
        let meta = lazy.metadata();
        let dims = if meta.dims.is_empty() {
            Dimension::defaults_for(&meta.shape)
        } else {
            meta.dims.clone()
        };
        let name = lazy
            .handle()
            .selector()
            .map(str::to_string)
            .or_else(|| file_stem(lazy.handle().path()));
        let metadata = meta.attributes.clone();
        let missing_value = meta.missing_value;

        Self::new(Payload::Lazy(lazy), dims)?
            .rebuild()
            .name(name)
            .metadata(metadata)
            .missing_value(missing_value)
            .build()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Dimensions removed by earlier selections, oldest first.
    pub fn refdims(&self) -> &[Dimension] {
        &self.refdims
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn missing_value(&self) -> Option<f64> {
        self.missing_value
    }

    pub fn shape(&self) -> Vec<u64> {
        self.dims.iter().map(|d| d.len).collect()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dtype(&self) -> DataType {
        self.payload.dtype()
    }

    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    /// Axis position of the dimension called `name`.
    pub fn dim_index(&self, name: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| RasterError::UnknownDimension(name.to_string()))
    }

    /// The file behind this array, if it is file-backed and not yet open.
    pub fn file_handle(&self) -> Option<&FileHandle> {
        find_files(self).into_iter().next().map(LazyArray::handle)
    }

    /// Whether reading this array requires opening a file.
    pub fn is_lazy(&self) -> bool {
        self.file_handle().is_some()
    }

    /// Start a copy of this array with some fields replaced.
    pub fn rebuild(&self) -> RasterBuilder {
        RasterBuilder {
            payload: self.payload.clone(),
            dims: self.dims.clone(),
            refdims: self.refdims.clone(),
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            missing_value: self.missing_value,
        }
    }

    /// A lazy view restricted to `range` along `dim`.
    pub fn slice(&self, dim: &str, range: Range<u64>) -> Result<Self> {
        let axis = self.dim_index(dim)?;
        let mut ranges = full_block(&self.shape());
        ranges[axis] = range.clone();
        let window = Window::new(self.payload.clone(), ranges, vec![false; self.ndim()])?;

        let mut dims = self.dims.clone();
        dims[axis] = dims[axis].slice(&range);
        self.rebuild().payload(window.into()).dims(dims).build()
    }

    /// A lazy view at `index` along `dim`, with that dimension removed.
    ///
    /// The removed dimension is recorded in [`refdims`](Self::refdims).
    pub fn select(&self, dim: &str, index: u64) -> Result<Self> {
        let axis = self.dim_index(dim)?;
        let end = index.checked_add(1).ok_or_else(|| {
            RasterError::out_of_bounds(format!("{}={}", dim, index), &self.shape())
        })?;
        let mut ranges = full_block(&self.shape());
        ranges[axis] = index..end;
        let mut dropped = vec![false; self.ndim()];
        dropped[axis] = true;
        let window = Window::new(self.payload.clone(), ranges, dropped)?;

        let mut dims = self.dims.clone();
        let removed = dims.remove(axis).slice(&(index..end));
        let mut refdims = self.refdims.clone();
        refdims.push(removed);
        self.rebuild()
            .payload(window.into())
            .dims(dims)
            .refdims(refdims)
            .build()
    }

    /// Read a row-major block.
    ///
    /// A file-backed array opens its file for the duration of the call unless
    /// it is inside a session.
    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        self.payload.read_block(ranges)
    }

    /// Write a row-major block.
    ///
    /// File-backed arrays need either a write session or `writable` sources.
    pub fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        self.payload.write_block(ranges, values)
    }

    /// Every value, in row-major order, read in one session.
    pub fn read_all(&self) -> Result<Vec<f64>> {
        with_open(self, OpenMode::Read, |array| {
            array.read_block(&full_block(&array.shape()))
        })
    }

    /// A copy of this array with its data loaded into memory.
    pub fn read(&self) -> Result<Self> {
        let values = self.read_all()?;
        let memory = MemoryArray::new(self.shape(), self.dtype(), values)?;
        self.rebuild().payload(memory.into()).build()
    }
}

impl Structural for RasterArray {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        self.payload.visit_files(visit);
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        Self {
            payload: self.payload.replace_files(open),
            dims: self.dims.clone(),
            refdims: self.refdims.clone(),
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            missing_value: self.missing_value,
        }
    }
}

/// Copy-with-changes builder returned by [`RasterArray::rebuild`].
#[derive(Debug, Clone)]
pub struct RasterBuilder {
    payload: Payload,
    dims: Vec<Dimension>,
    refdims: Vec<Dimension>,
    name: Option<String>,
    metadata: Metadata,
    missing_value: Option<f64>,
}

impl RasterBuilder {
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn dims(mut self, dims: Vec<Dimension>) -> Self {
        self.dims = dims;
        self
    }

    pub fn refdims(mut self, refdims: Vec<Dimension>) -> Self {
        self.refdims = refdims;
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn missing_value(mut self, missing_value: Option<f64>) -> Self {
        self.missing_value = missing_value;
        self
    }

    /// Finish the copy.
    ///
    /// # Errors
    /// `DimensionMismatch` if the dimensions do not describe the payload.
    pub fn build(self) -> Result<RasterArray> {
        check_dims(&self.dims, &self.payload.shape())?;
        Ok(RasterArray {
            payload: self.payload,
            dims: self.dims,
            refdims: self.refdims,
            name: self.name,
            metadata: self.metadata,
            missing_value: self.missing_value,
        })
    }
}

fn check_dims(dims: &[Dimension], shape: &[u64]) -> Result<()> {
    let lens: Vec<u64> = dims.iter().map(|d| d.len).collect();
    if lens != shape {
        return Err(RasterError::dimension_mismatch(format!(
            "dimension lengths {:?} do not match data shape {:?}",
            lens, shape
        )));
    }
    for (i, dim) in dims.iter().enumerate() {
        if dims[..i].iter().any(|other| other.name == dim.name) {
            return Err(RasterError::dimension_mismatch(format!(
                "dimension '{}' appears twice",
                dim.name
            )));
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}
