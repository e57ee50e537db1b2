//! Deferred-open file handles and the resource handles they produce.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Backend, BackendResource};
use crate::error::{RasterError, Result};
use crate::types::{check_block, check_block_data, ArrayMetadata, DataType, OpenMode};

/// Reference to an on-disk resource that has not been opened.
///
/// Holds no OS resource. Every operation that needs the data opens the
/// resource, uses it and closes it before returning.
#[derive(Clone)]
pub struct FileHandle {
    path: PathBuf,
    selector: Option<String>,
    writable: bool,
    backend: Arc<dyn Backend>,
}

impl FileHandle {
    pub fn new(
        path: impl Into<PathBuf>,
        selector: Option<String>,
        writable: bool,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            path: path.into(),
            selector,
            writable,
            backend,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layer name inside a multi-layer source.
    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// Whether direct block writes are allowed outside a write session.
    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Open the resource.
    ///
    /// # Errors
    /// * `NotFound` if the path does not exist
    /// * `Backend` if the backend cannot open or parse it
    pub fn open(&self, mode: OpenMode) -> Result<ResourceHandle> {
        if !self.path.exists() {
            return Err(RasterError::not_found(&self.path));
        }

        tracing::debug!(
            path = %self.path.display(),
            selector = ?self.selector,
            mode = ?mode,
            backend = self.backend.name(),
            "Opening resource"
        );

        let inner = self
            .backend
            .open(&self.path, self.selector.as_deref(), mode)?;
        Ok(ResourceHandle::new(self.path.clone(), mode, inner))
    }

    /// Open read-only, read one block, close.
    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        let mut resource = self.open(OpenMode::Read)?;
        let result = resource.read_block(ranges);
        close_after(&mut resource, result)
    }

    /// Open for writing, write one block, close.
    pub fn write_block(&self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        let mut resource = self.open(OpenMode::Write)?;
        let result = resource.write_block(ranges, values);
        close_after(&mut resource, result)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("selector", &self.selector)
            .field("writable", &self.writable)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.selector == other.selector
            && self.writable == other.writable
            && self.backend.name() == other.backend.name()
    }
}

/// An open backend resource.
///
/// Checks blocks against the cached shape and refuses every operation once
/// closed. Closing twice is a no-op. A handle dropped while still open is
/// closed on drop.
pub struct ResourceHandle {
    path: PathBuf,
    mode: OpenMode,
    metadata: ArrayMetadata,
    inner: Option<Box<dyn BackendResource>>,
}

impl ResourceHandle {
    pub(crate) fn new(path: PathBuf, mode: OpenMode, inner: Box<dyn BackendResource>) -> Self {
        Self {
            path,
            mode,
            metadata: inner.metadata().clone(),
            inner: Some(inner),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn metadata(&self) -> Result<&ArrayMetadata> {
        self.live()?;
        Ok(&self.metadata)
    }

    pub fn shape(&self) -> Result<&[u64]> {
        Ok(&self.metadata()?.shape)
    }

    pub fn dtype(&self) -> Result<DataType> {
        Ok(self.metadata()?.dtype)
    }

    pub fn missing_value(&self) -> Result<Option<f64>> {
        Ok(self.metadata()?.missing_value)
    }

    pub fn read_block(&mut self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        self.live()?;
        check_block(ranges, &self.metadata.shape)?;
        self.live_mut()?.read_block(ranges)
    }

    pub fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        self.live()?;
        if !self.mode.is_writable() {
            return Err(RasterError::ReadOnly(self.path.clone()));
        }
        check_block(ranges, &self.metadata.shape)?;
        check_block_data(ranges, values)?;
        self.live_mut()?.write_block(ranges, values)
    }

    /// Close the resource. Later operations fail with `UseAfterClose`.
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut inner) => {
                tracing::debug!(path = %self.path.display(), "Closing resource");
                inner.close()
            }
            None => Ok(()),
        }
    }

    fn live(&self) -> Result<&dyn BackendResource> {
        self.inner
            .as_deref()
            .ok_or_else(|| RasterError::UseAfterClose(self.path.clone()))
    }

    fn live_mut(&mut self) -> Result<&mut (dyn BackendResource + 'static)> {
        match self.inner.as_deref_mut() {
            Some(inner) => Ok(inner),
            None => Err(RasterError::UseAfterClose(self.path.clone())),
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close resource on drop");
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Close `resource` and merge the outcome with the result of using it.
///
/// An error from `result` wins over a close error; the close error is logged.
pub(crate) fn close_after<T>(resource: &mut ResourceHandle, result: Result<T>) -> Result<T> {
    let closed = resource.close();
    merge_close(resource.path(), result, closed)
}

pub(crate) fn merge_close<T>(path: &Path, result: Result<T>, closed: Result<()>) -> Result<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!(
                path = %path.display(),
                error = %close_err,
                "Failed to close resource after an earlier error"
            );
            Err(err)
        }
    }
}
