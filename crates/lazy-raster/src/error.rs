//! Error types for raster access and writing.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while opening, reading or writing rasters.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The path does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The backend could not open or parse the resource.
    #[error("backend error: {0}")]
    Backend(String),

    /// Read or write failure on an already-open resource.
    #[error("I/O error: {0}")]
    Io(String),

    /// A block request exceeds the array shape.
    #[error("block {requested} is outside array shape {shape:?}")]
    OutOfBounds { requested: String, shape: Vec<u64> },

    /// No backend is registered for the extension or tag.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// More than one file handle was found inside one wrapper tree.
    #[error("found {count} file handles in one value; a session can only open one")]
    MultipleResources { count: usize },

    /// A caller supplied list has the wrong length.
    #[error("expected {expected} {what}, got {actual}")]
    ArgumentCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An operation was attempted on a resource after it was closed.
    #[error("resource {} used after close", .0.display())]
    UseAfterClose(PathBuf),

    /// A write was attempted on a resource opened read-only.
    #[error("resource {} is open read-only", .0.display())]
    ReadOnly(PathBuf),

    /// Header or attribute contents could not be interpreted.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// No dimension with this name exists on the array.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    /// Dimensions do not agree with the data or with each other.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Fieldless mirror of [`RasterError`] variants, for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Backend,
    Io,
    OutOfBounds,
    UnsupportedFormat,
    MultipleResources,
    ArgumentCount,
    UseAfterClose,
    ReadOnly,
    InvalidMetadata,
    UnknownDimension,
    DimensionMismatch,
    Config,
}

impl RasterError {
    /// Create a NotFound error.
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound(path.as_ref().to_path_buf())
    }

    /// Create a Backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, shape: &[u64]) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            shape: shape.to_vec(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Io(_) => ErrorKind::Io,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::MultipleResources { .. } => ErrorKind::MultipleResources,
            Self::ArgumentCount { .. } => ErrorKind::ArgumentCount,
            Self::UseAfterClose(_) => ErrorKind::UseAfterClose,
            Self::ReadOnly(_) => ErrorKind::ReadOnly,
            Self::InvalidMetadata(_) => ErrorKind::InvalidMetadata,
            Self::UnknownDimension(_) => ErrorKind::UnknownDimension,
            Self::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RasterError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
