//! File-backed arrays: closed (`LazyArray`) and session-open (`OpenArray`).

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{RasterError, Result};
use crate::handle::{close_after, FileHandle, ResourceHandle};
use crate::registry::BackendRegistry;
use crate::types::{check_block, ArrayMetadata, DataType, OpenMode};

/// An array backed by a closed [`FileHandle`].
///
/// Shape, element type, missing value and attributes are read once, when the
/// resource is briefly opened at construction, and answered from that cache
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LazyArray {
    handle: FileHandle,
    metadata: ArrayMetadata,
}

impl LazyArray {
    /// Resolve a backend for `path` and read its metadata.
    ///
    /// # Arguments
    /// * `registry` - Backend lookup by extension
    /// * `path` - File or directory to open
    /// * `selector` - Layer name for multi-layer sources
    /// * `writable` - Whether direct block writes may open the file for writing
    pub fn open(
        registry: &BackendRegistry,
        path: impl AsRef<Path>,
        selector: Option<&str>,
        writable: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let backend = registry.for_path(path)?;
        let handle = FileHandle::new(path, selector.map(str::to_string), writable, backend);
        Self::from_handle(handle)
    }

    /// Open `handle` just long enough to read its metadata.
    pub fn from_handle(handle: FileHandle) -> Result<Self> {
        let mut resource = handle.open(OpenMode::Read)?;
        let metadata = resource.metadata().cloned();
        let metadata = close_after(&mut resource, metadata)?;

        tracing::debug!(
            path = %handle.path().display(),
            shape = ?metadata.shape,
            dtype = %metadata.dtype,
            "Read lazy array metadata"
        );

        Ok(Self { handle, metadata })
    }

    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    pub fn dtype(&self) -> DataType {
        self.metadata.dtype
    }

    pub fn missing_value(&self) -> Option<f64> {
        self.metadata.missing_value
    }

    /// Read a block, opening the file for the duration of the call.
    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        check_block(ranges, self.shape())?;
        self.handle.read_block(ranges)
    }

    /// Write a block, opening the file for writing for the duration of the call.
    pub fn write_block(&self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        if !self.handle.writable() {
            return Err(RasterError::ReadOnly(self.handle.path().to_path_buf()));
        }
        check_block(ranges, self.shape())?;
        self.handle.write_block(ranges, values)
    }

    /// Open the file and wrap the live resource for a session.
    pub(crate) fn open_session(&self, mode: OpenMode) -> Result<OpenArray> {
        let resource = self.handle.open(mode)?;
        Ok(OpenArray {
            handle: self.handle.clone(),
            metadata: self.metadata.clone(),
            resource: Arc::new(Mutex::new(resource)),
        })
    }
}

/// A file-backed array whose resource is held open by a session.
///
/// Clones share the one resource. Once the session ends every clone fails
/// with `UseAfterClose`.
#[derive(Clone)]
pub struct OpenArray {
    handle: FileHandle,
    metadata: ArrayMetadata,
    resource: Arc<Mutex<ResourceHandle>>,
}

impl OpenArray {
    /// The handle this resource was opened from.
    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    pub fn dtype(&self) -> DataType {
        self.metadata.dtype
    }

    pub fn mode(&self) -> OpenMode {
        self.lock().mode()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        self.lock().read_block(ranges)
    }

    pub fn write_block(&self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        self.lock().write_block(ranges, values)
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.lock().close()
    }

    // A panic inside a backend call poisons the lock; the handle is still
    // usable for closing.
    fn lock(&self) -> MutexGuard<'_, ResourceHandle> {
        self.resource
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for OpenArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenArray")
            .field("handle", &self.handle)
            .field("shape", &self.metadata.shape)
            .field(
                "closed",
                &self.resource.try_lock().ok().map(|r| r.is_closed()),
            )
            .finish()
    }
}

impl PartialEq for OpenArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}
