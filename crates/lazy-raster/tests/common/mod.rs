//! Shared helpers for lazy-raster integration tests.
//!
//! `CountingBackend` stores grid files like the `grd` backend but under the
//! `cgrd` extension, and counts every open and close so tests can assert
//! exactly when a file was held open.

#![allow(dead_code)]

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lazy_raster::{
    ArrayMetadata, Backend, BackendRegistry, BackendResource, DataType, GridFileBackend, OpenMode,
    RasterArray, RasterStack, Result,
};
use test_utils::create_test_grid;

/// Open and close counts shared by a backend and the test observing it.
#[derive(Debug, Default)]
pub struct Counters {
    opens: AtomicUsize,
    write_opens: AtomicUsize,
    closes: AtomicUsize,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn write_opens(&self) -> usize {
        self.write_opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Resources currently open.
    pub fn open_now(&self) -> usize {
        self.opens() - self.closes()
    }
}

#[derive(Debug, Clone)]
pub struct CountingBackend {
    inner: GridFileBackend,
    counters: Arc<Counters>,
}

impl Backend for CountingBackend {
    fn name(&self) -> &'static str {
        "counted"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cgrd"]
    }

    fn open(
        &self,
        path: &Path,
        selector: Option<&str>,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendResource>> {
        let inner = self.inner.open(path, selector, mode)?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if mode.is_writable() {
            self.counters.write_opens.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(CountingResource {
            inner,
            counters: self.counters.clone(),
        }))
    }

    fn write_single(&self, path: &Path, array: &RasterArray) -> Result<()> {
        self.inner.write_single(path, array)
    }
}

struct CountingResource {
    inner: Box<dyn BackendResource>,
    counters: Arc<Counters>,
}

impl BackendResource for CountingResource {
    fn metadata(&self) -> &ArrayMetadata {
        self.inner.metadata()
    }

    fn read_block(&mut self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        self.inner.read_block(ranges)
    }

    fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        self.inner.write_block(ranges, values)
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

/// Default registry plus the counting backend.
pub fn counting_registry() -> (BackendRegistry, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let mut registry = BackendRegistry::with_defaults();
    registry.register(Arc::new(CountingBackend {
        inner: GridFileBackend::new(),
        counters: counters.clone(),
    }));
    (registry, counters)
}

/// In-memory `(y, x)` test grid of `width` x `height`.
pub fn test_array(width: usize, height: usize) -> RasterArray {
    RasterArray::from_vec(
        vec![height as u64, width as u64],
        DataType::Float32,
        create_test_grid(width, height),
    )
    .expect("Failed to build test array")
}

/// Write a `width` x `height` test grid to `path` and return `path`.
pub fn write_test_file(
    registry: &BackendRegistry,
    path: PathBuf,
    width: usize,
    height: usize,
) -> PathBuf {
    let array = test_array(width, height)
        .rebuild()
        .missing_value(Some(-9999.0))
        .build()
        .expect("Failed to set missing value");
    lazy_raster::write(registry, &path, &array).expect("Failed to write test file");
    path
}

/// In-memory stack with layers named `names`, each a 3 x 2 grid offset by
/// its position times 100.
pub fn test_stack(names: &[&str]) -> RasterStack {
    let layers = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let data = create_test_grid(3, 2)
                .into_iter()
                .map(|v| v + (i * 100) as f64)
                .collect();
            let array = RasterArray::from_vec(vec![2, 3], DataType::Int32, data)
                .expect("Failed to build layer");
            (name.to_string(), array)
        })
        .collect();
    RasterStack::new(layers).expect("Failed to build stack")
}
