//! Writing arrays and collections through the backend registry.
//!
//! The backend is chosen from the destination's extension unless
//! [`WriteOptions::backend`] names one. Collections go to the backend in one
//! call when it supports composite writes; otherwise each member is written
//! to its own file, named by inserting a suffix before the extension:
//!
//! ```text
//! write("out.grd", {a, b, c})
//!      │
//!      ├─► grd backend: no composite write
//!      │
//!      └─► out_a.grd, out_b.grd, out_c.grd
//! ```

mod dispatcher;

pub use dispatcher::member_path;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::raster::RasterArray;
use crate::registry::BackendRegistry;
use crate::stack::RasterStack;

/// What to write: one array or a named collection.
#[derive(Debug, Clone, Copy)]
pub enum WriteSource<'a> {
    Array(&'a RasterArray),
    Stack(&'a RasterStack),
}

impl<'a> From<&'a RasterArray> for WriteSource<'a> {
    fn from(array: &'a RasterArray) -> Self {
        Self::Array(array)
    }
}

impl<'a> From<&'a RasterStack> for WriteSource<'a> {
    fn from(stack: &'a RasterStack) -> Self {
        Self::Stack(stack)
    }
}

/// Options for [`RasterWriter::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Registry tag to use instead of the extension lookup.
    pub backend: Option<String>,
    /// Per-member file suffixes for collections written one file per member.
    /// Must have one entry per member. Defaults to `"_" + name`.
    pub suffixes: Option<Vec<String>>,
}

impl WriteOptions {
    pub fn backend(mut self, tag: impl Into<String>) -> Self {
        self.backend = Some(tag.into());
        self
    }

    pub fn suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suffixes = Some(suffixes.into_iter().map(Into::into).collect());
        self
    }
}

/// Writes arrays and collections to paths.
#[derive(Debug, Clone)]
pub struct RasterWriter {
    registry: BackendRegistry,
}

impl RasterWriter {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Write `source` to `path`, creating or overwriting files.
    ///
    /// File-backed arrays are read inside a session. A write whose destination
    /// is the array's own file opens that file for writing.
    ///
    /// # Returns
    /// Every path written, in member order.
    ///
    /// # Errors
    /// * `UnsupportedFormat` if no backend matches the tag or extension
    /// * `ArgumentCount` if the suffix count differs from the member count;
    ///   nothing is written in that case
    /// * Any error from reading the source or from the backend
    pub fn write<'a>(
        &self,
        path: impl AsRef<Path>,
        source: impl Into<WriteSource<'a>>,
        options: &WriteOptions,
    ) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        let backend = match &options.backend {
            Some(tag) => self.registry.get(tag)?,
            None => self.registry.for_path(path)?,
        };

        let written = match source.into() {
            WriteSource::Array(array) => {
                dispatcher::write_array(backend.as_ref(), path, array)?;
                vec![path.to_path_buf()]
            }
            WriteSource::Stack(stack) => dispatcher::write_stack(
                backend.as_ref(),
                path,
                stack,
                options.suffixes.as_deref(),
            )?,
        };

        tracing::info!(
            path = %path.display(),
            backend = backend.name(),
            files = written.len(),
            "Write complete"
        );
        Ok(written)
    }
}

/// Write `source` to `path` with the backend registered for its extension.
pub fn write<'a>(
    registry: &BackendRegistry,
    path: impl AsRef<Path>,
    source: impl Into<WriteSource<'a>>,
) -> Result<Vec<PathBuf>> {
    RasterWriter::new(registry.clone()).write(path, source, &WriteOptions::default())
}
