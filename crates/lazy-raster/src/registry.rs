//! Lookup of format backends by tag or file extension.
//!
//! # Example
//!
//! ```rust,ignore
//! use lazy_raster::{BackendRegistry, RasterConfig};
//!
//! let registry = BackendRegistry::from_config(&RasterConfig::from_env())?;
//! let backend = registry.for_path("elevation.zarr")?;
//! assert_eq!(backend.name(), "zarr");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{Backend, GridFileBackend, ZarrBackend};
use crate::config::RasterConfig;
use crate::error::{RasterError, Result};

/// Maps backend tags and file extensions to backends.
///
/// Holds no state beyond the mapping; cloning is cheap.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    extensions: HashMap<String, String>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in backends with default configuration.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GridFileBackend::new()));
        registry.register(Arc::new(ZarrBackend::new(&RasterConfig::default())));
        registry
    }

    /// The built-in backends configured from `config`.
    ///
    /// # Errors
    /// `Config` if `config` fails validation.
    pub fn from_config(config: &RasterConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();
        registry.register(Arc::new(GridFileBackend::new()));
        registry.register(Arc::new(ZarrBackend::new(config)));
        Ok(registry)
    }

    /// Add `backend` under its tag and extensions, replacing earlier entries.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let tag = backend.name().to_string();
        for ext in backend.extensions() {
            self.extensions.insert(ext.to_lowercase(), tag.clone());
        }
        tracing::debug!(
            backend = %tag,
            extensions = ?backend.extensions(),
            "Registered backend"
        );
        self.backends.insert(tag, backend);
    }

    /// Backend registered under `tag`.
    pub fn get(&self, tag: &str) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(tag)
            .cloned()
            .ok_or_else(|| RasterError::unsupported_format(format!("no backend named '{}'", tag)))
    }

    /// Tag of the backend handling `path`'s extension, if any.
    pub fn tag_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extensions.get(&ext).map(String::as_str)
    }

    /// Backend handling `path`'s extension.
    ///
    /// # Errors
    /// `UnsupportedFormat` if the path has no extension or none is registered.
    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        match self.tag_for_path(path) {
            Some(tag) => self.get(tag),
            None => Err(RasterError::unsupported_format(format!(
                "no backend for {}",
                path.display()
            ))),
        }
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.tags())
            .field("extensions", &self.extensions)
            .finish()
    }
}
