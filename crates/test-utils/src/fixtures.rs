//! Common test fixtures for lazy-raster tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory that is removed when dropped.
///
/// # Example
///
/// ```
/// use test_utils::ScratchDir;
///
/// let scratch = ScratchDir::new();
/// let path = scratch.path("out.grd");
/// assert!(path.starts_with(scratch.root()));
/// ```
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a new scratch directory.
    ///
    /// # Panics
    /// If the directory cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create scratch directory");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the scratch directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Names of the entries in the scratch directory, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("Failed to list scratch directory")
            .map(|entry| {
                entry
                    .expect("Failed to read directory entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Common grid shapes for testing, as `(width, height)`.
pub mod shapes {
    /// Smallest grid with distinct rows and columns.
    pub const TINY: (usize, usize) = (3, 2);

    /// Simple 10x10 test grid.
    pub const SIMPLE_10X10: (usize, usize) = (10, 10);

    /// Grid that does not divide evenly into small chunks.
    pub const RAGGED: (usize, usize) = (17, 9);
}
