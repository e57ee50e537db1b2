//! Lazily opened, file-backed raster arrays.
//!
//! An array built from a path reads its metadata once and then holds only a
//! closed [`FileHandle`]. The file is opened again when data is touched: for a
//! single block read, or for a whole session through [`with_open`]. Slices,
//! selections and rebuilt copies wrap the same handle, and the session
//! controller finds it at any depth.
//!
//! # Architecture
//!
//! ```text
//! RasterArray::from_path(registry, "dem.zarr")
//!      │
//!      ├─► BackendRegistry::for_path  (extension → Backend)
//!      │
//!      ├─► open, read shape/dtype/missing value, close
//!      │
//!      └─► RasterArray { payload: Lazy(FileHandle + metadata), dims, ... }
//!
//! with_open(&array.slice("x", 0..10)?, OpenMode::Read, |view| view.read_all())
//!      │
//!      ├─► find the one FileHandle inside the wrapper tree
//!      │
//!      ├─► open it, rebuild the view around the open resource
//!      │
//!      ├─► run the operation
//!      │
//!      └─► close, on success, error or panic
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use lazy_raster::{BackendRegistry, OpenMode, RasterArray, RasterWriter, WriteOptions, with_open};
//!
//! let registry = BackendRegistry::with_defaults();
//! let dem = RasterArray::from_path(&registry, "dem.zarr")?;
//!
//! // Metadata queries never touch the disk.
//! println!("{:?} {}", dem.shape(), dem.dtype());
//!
//! let north = dem.slice("y", 0..100)?;
//! let values = with_open(&north, OpenMode::Read, |view| view.read_all())?;
//!
//! RasterWriter::new(registry).write("north.grd", &north, &WriteOptions::default())?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod lazy;
pub mod payload;
pub mod raster;
pub mod registry;
pub mod session;
pub mod stack;
pub mod structural;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use backend::{Backend, BackendResource, GridFileBackend, ZarrBackend};
pub use config::{RasterConfig, ZarrCompression};
pub use error::{ErrorKind, RasterError, Result};
pub use handle::{FileHandle, ResourceHandle};
pub use lazy::{LazyArray, OpenArray};
pub use payload::{MemoryArray, Payload, Window};
pub use raster::{RasterArray, RasterBuilder, SourceOptions};
pub use registry::BackendRegistry;
pub use session::with_open;
pub use stack::RasterStack;
pub use structural::{file_count, find_files, Structural};
pub use types::{ArrayMetadata, DataType, Dimension, Metadata, OpenMode};
pub use writer::{write, RasterWriter, WriteOptions, WriteSource};
