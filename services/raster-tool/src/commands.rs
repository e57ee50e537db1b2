//! Command implementations.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use lazy_raster::{
    BackendRegistry, RasterArray, RasterStack, RasterWriter, SourceOptions, WriteOptions,
};

/// A source opened from the command line.
pub enum Source {
    Array(RasterArray),
    Stack(RasterStack),
}

/// Open `path` lazily: one layer if `layer` is given, every layer of a
/// multi-layer source, or the single array it holds.
pub fn open_source(registry: &BackendRegistry, path: &Path, layer: Option<&str>) -> Result<Source> {
    if let Some(layer) = layer {
        let options = SourceOptions::default().layer(layer);
        let array = RasterArray::from_path_with(registry, path, &options)
            .with_context(|| format!("Failed to open layer '{}' of {}", layer, path.display()))?;
        return Ok(Source::Array(array));
    }

    let backend = registry.for_path(path)?;
    let layers = if path.exists() {
        backend.layers(path)?
    } else {
        Vec::new()
    };

    if layers.is_empty() {
        let array = RasterArray::from_path(registry, path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Source::Array(array))
    } else {
        let stack = RasterStack::from_path(registry, path)
            .with_context(|| format!("Failed to open layers of {}", path.display()))?;
        Ok(Source::Stack(stack))
    }
}

/// Describe `path` from its metadata alone.
pub fn info(registry: &BackendRegistry, path: &Path, layer: Option<&str>) -> Result<String> {
    let mut out = String::new();
    match open_source(registry, path, layer)? {
        Source::Array(array) => describe(&mut out, &array, "")?,
        Source::Stack(stack) => {
            writeln!(out, "layers: {}", stack.len())?;
            for (name, array) in stack.iter() {
                writeln!(out, "[{}]", name)?;
                describe(&mut out, array, "  ")?;
            }
        }
    }
    Ok(out)
}

fn describe(out: &mut String, array: &RasterArray, indent: &str) -> std::fmt::Result {
    let missing = match array.missing_value() {
        Some(value) => value.to_string(),
        None => "none".to_string(),
    };
    writeln!(out, "{}name: {}", indent, array.name().unwrap_or("-"))?;
    writeln!(out, "{}shape: {:?}", indent, array.shape())?;
    writeln!(out, "{}dtype: {}", indent, array.dtype())?;
    writeln!(out, "{}missing_value: {}", indent, missing)?;
    writeln!(out, "{}dims:", indent)?;
    for dim in array.dims() {
        writeln!(
            out,
            "{}  {}: {} (start {}, step {})",
            indent, dim.name, dim.len, dim.start, dim.step
        )?;
    }
    Ok(())
}

/// Arguments of `convert`.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub layer: Option<String>,
    pub suffixes: Option<Vec<String>>,
    pub backend: Option<String>,
}

/// Write `request.src` to `request.dst`; returns every path written.
pub fn convert(registry: &BackendRegistry, request: &ConvertRequest) -> Result<Vec<PathBuf>> {
    let source = open_source(registry, &request.src, request.layer.as_deref())?;
    let options = WriteOptions {
        backend: request.backend.clone(),
        suffixes: request.suffixes.clone(),
    };
    let writer = RasterWriter::new(registry.clone());

    let written = match &source {
        Source::Array(array) => writer.write(&request.dst, array, &options),
        Source::Stack(stack) => writer.write(&request.dst, stack, &options),
    }
    .with_context(|| {
        format!(
            "Failed to write {} to {}",
            request.src.display(),
            request.dst.display()
        )
    })?;

    info!(
        src = %request.src.display(),
        dst = %request.dst.display(),
        files = written.len(),
        "Converted"
    );
    Ok(written)
}
