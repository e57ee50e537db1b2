//! Per-source write dispatch.

use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::error::{RasterError, Result};
use crate::raster::RasterArray;
use crate::session::with_open;
use crate::stack::RasterStack;
use crate::types::OpenMode;

/// Write one array through a session on its file, if it has one.
///
/// The session opens for writing only when `path` is the array's own file;
/// any other source file is opened read-only.
pub(super) fn write_array(backend: &dyn Backend, path: &Path, array: &RasterArray) -> Result<()> {
    let mode = match array.file_handle() {
        Some(handle) if same_file(handle.path(), path) => OpenMode::Write,
        _ => OpenMode::Read,
    };

    tracing::debug!(
        path = %path.display(),
        backend = backend.name(),
        mode = ?mode,
        "Writing array"
    );

    with_open(array, mode, |opened| backend.write_single(path, opened))
}

/// Write a collection in one composite call, or one file per member.
pub(super) fn write_stack(
    backend: &dyn Backend,
    path: &Path,
    stack: &RasterStack,
    suffixes: Option<&[String]>,
) -> Result<Vec<PathBuf>> {
    if backend.supports_composite_write() {
        tracing::debug!(
            path = %path.display(),
            backend = backend.name(),
            layers = stack.len(),
            "Writing collection in one call"
        );
        let loaded = stack.read()?;
        backend.write_composite(path, &loaded)?;
        return Ok(vec![path.to_path_buf()]);
    }

    let paths = member_paths(path, stack, suffixes)?;
    tracing::debug!(
        path = %path.display(),
        backend = backend.name(),
        layers = stack.len(),
        "Backend cannot write collections, writing one file per layer"
    );
    for ((_, array), member) in stack.iter().zip(&paths) {
        write_array(backend, member, array)?;
    }
    Ok(paths)
}

/// Destination of every member, checked before anything is written.
fn member_paths(
    path: &Path,
    stack: &RasterStack,
    suffixes: Option<&[String]>,
) -> Result<Vec<PathBuf>> {
    match suffixes {
        Some(suffixes) if suffixes.len() != stack.len() => Err(RasterError::ArgumentCount {
            what: "suffixes",
            expected: stack.len(),
            actual: suffixes.len(),
        }),
        Some(suffixes) => Ok(suffixes.iter().map(|s| member_path(path, s)).collect()),
        None => Ok(stack
            .names()
            .map(|name| member_path(path, &format!("_{}", name)))
            .collect()),
    }
}

/// `path` with `suffix` inserted between the file stem and the extension.
///
/// `member_path("out/stack.grd", "_a")` is `out/stack_a.grd`.
pub fn member_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(file_name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
