//! Format backends and the capability traits they implement.

mod grid_file;
mod zarr;

pub use grid_file::GridFileBackend;
pub use zarr::ZarrBackend;

use std::fmt;
use std::ops::Range;
use std::path::Path;

use crate::error::{RasterError, Result};
use crate::raster::RasterArray;
use crate::stack::RasterStack;
use crate::types::{ArrayMetadata, OpenMode};

/// An open, block-addressable resource produced by a [`Backend`].
///
/// Implementations may assume that every block passed in has already been
/// checked against `metadata().shape` and that write buffers have the block's
/// length; [`ResourceHandle`](crate::ResourceHandle) guarantees both.
pub trait BackendResource: Send {
    /// Shape, element type, missing value and attributes of the resource.
    fn metadata(&self) -> &ArrayMetadata;

    /// Read a row-major block.
    fn read_block(&mut self, ranges: &[Range<u64>]) -> Result<Vec<f64>>;

    /// Write a row-major block.
    fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()>;

    /// Release the resource. Called at most once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A format-specific collaborator that opens paths and writes arrays.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Registry tag of this backend.
    fn name(&self) -> &'static str;

    /// File extensions (without the dot) this backend handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Open the resource at `path`.
    ///
    /// # Arguments
    /// * `path` - Location of the resource; callers have checked it exists
    /// * `selector` - Layer name for sources holding several named arrays
    /// * `mode` - Read-only or write-enabled
    fn open(
        &self,
        path: &Path,
        selector: Option<&str>,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendResource>>;

    /// Names of the layers stored at `path`.
    ///
    /// An empty list means the path holds a single unnamed array.
    fn layers(&self, _path: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Whether [`write_composite`](Self::write_composite) is supported.
    fn supports_composite_write(&self) -> bool {
        false
    }

    /// Write one array to `path`, creating or overwriting it.
    ///
    /// `array` is either in memory or inside an open session, so reading it
    /// never reopens a file.
    fn write_single(&self, path: &Path, array: &RasterArray) -> Result<()>;

    /// Write a whole collection to `path` in one call.
    fn write_composite(&self, path: &Path, _stack: &RasterStack) -> Result<()> {
        Err(RasterError::unsupported_format(format!(
            "{} backend cannot write collections to {}",
            self.name(),
            path.display()
        )))
    }
}
