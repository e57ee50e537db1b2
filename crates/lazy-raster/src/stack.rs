//! Named collections of arrays sharing one dimension space.

use std::path::Path;

use crate::error::{RasterError, Result};
use crate::lazy::LazyArray;
use crate::payload::Payload;
use crate::raster::{RasterArray, SourceOptions};
use crate::registry::BackendRegistry;
use crate::structural::Structural;
use crate::types::{Dimension, Metadata};

/// An ordered collection of named arrays.
///
/// Layer names are unique. Dimensions shared by name between layers have the
/// same length; [`dims`](Self::dims) is their union in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStack {
    layers: Vec<(String, RasterArray)>,
    dims: Vec<Dimension>,
    metadata: Metadata,
}

impl RasterStack {
    /// Build a stack from `(name, array)` pairs.
    ///
    /// # Errors
    /// * `DimensionMismatch` if two layers share a name or disagree on the
    ///   length of a shared dimension
    pub fn new(layers: Vec<(String, RasterArray)>) -> Result<Self> {
        let mut dims: Vec<Dimension> = Vec::new();
        for (i, (name, array)) in layers.iter().enumerate() {
            if layers[..i].iter().any(|(other, _)| other == name) {
                return Err(RasterError::dimension_mismatch(format!(
                    "layer name '{}' is used twice",
                    name
                )));
            }
            for dim in array.dims() {
                match dims.iter().find(|d| d.name == dim.name) {
                    Some(existing) if existing.len != dim.len => {
                        return Err(RasterError::dimension_mismatch(format!(
                            "layer '{}' has {} = {}, expected {}",
                            name, dim.name, dim.len, existing.len
                        )));
                    }
                    Some(_) => {}
                    None => dims.push(dim.clone()),
                }
            }
        }

        Ok(Self {
            layers,
            dims,
            metadata: Metadata::new(),
        })
    }

    /// A stack of lazy layers read from a multi-layer source.
    ///
    /// Each layer gets its own file handle selecting that layer. A source
    /// holding a single unnamed array becomes a one-layer stack named after
    /// the file.
    pub fn from_path(registry: &BackendRegistry, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RasterError::not_found(path));
        }
        let backend = registry.for_path(path)?;
        let names = backend.layers(path)?;

        tracing::debug!(
            path = %path.display(),
            backend = backend.name(),
            layers = names.len(),
            "Opening raster stack"
        );

        let layers = if names.is_empty() {
            let array = RasterArray::from_path(registry, path)?;
            let name = array.name().unwrap_or("layer").to_string();
            vec![(name, array)]
        } else {
            names
                .into_iter()
                .map(|name| {
                    let options = SourceOptions::default().layer(name.clone());
                    RasterArray::from_path_with(registry, path, &options).map(|a| (name, a))
                })
                .collect::<Result<Vec<_>>>()?
        };
        Self::new(layers)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&RasterArray> {
        self.layers
            .iter()
            .find(|(layer, _)| layer == name)
            .map(|(_, array)| array)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RasterArray)> {
        self.layers.iter().map(|(name, array)| (name.as_str(), array))
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// A copy with every layer loaded into memory, one session per layer.
    pub fn read(&self) -> Result<Self> {
        let layers = self
            .layers
            .iter()
            .map(|(name, array)| array.read().map(|a| (name.clone(), a)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            dims: self.dims.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

impl Structural for RasterStack {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        for (_, array) in &self.layers {
            array.visit_files(visit);
        }
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|(name, array)| (name.clone(), array.replace_files(open)))
                .collect(),
            dims: self.dims.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn layer(shape: Vec<u64>, value: f64) -> RasterArray {
        let len = shape.iter().product::<u64>() as usize;
        RasterArray::from_vec(shape, DataType::Float32, vec![value; len]).unwrap()
    }

    #[test]
    fn test_stack_keeps_order_and_unions_dims() {
        let stack = RasterStack::new(vec![
            ("b".to_string(), layer(vec![2, 3], 1.0)),
            ("a".to_string(), layer(vec![3], 2.0)),
        ])
        .unwrap();
        assert_eq!(stack.names().collect::<Vec<_>>(), vec!["b", "a"]);
        let dims: Vec<&str> = stack.dims().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dims, vec!["y", "x"]);
        assert_eq!(stack.get("a").unwrap().read_all().unwrap(), vec![2.0; 3]);
        assert!(stack.get("c").is_none());
    }

    #[test]
    fn test_stack_rejects_duplicate_names() {
        let err = RasterStack::new(vec![
            ("a".to_string(), layer(vec![2], 1.0)),
            ("a".to_string(), layer(vec![2], 2.0)),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn test_stack_rejects_nonconformable_layers() {
        let err = RasterStack::new(vec![
            ("a".to_string(), layer(vec![2, 2], 1.0)),
            ("b".to_string(), layer(vec![2, 3], 2.0)),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DimensionMismatch);
    }
}
