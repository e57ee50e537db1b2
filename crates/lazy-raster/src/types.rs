//! Core types shared by backends, lazy arrays and wrappers.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};

/// Free-form attribute mapping carried by arrays and files.
///
/// Treated as an opaque container: the resource search never looks inside it.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Mode a resource is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Read,
    Write,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// Element type of a raster.
///
/// Values cross the API as `f64`, which represents every variant exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "uint8" | "u8" => Some(Self::UInt8),
            "int16" | "i16" => Some(Self::Int16),
            "int32" | "i32" => Some(Self::Int32),
            "float32" | "f32" => Some(Self::Float32),
            "float64" | "f64" => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Append the little-endian encoding of `value` to `out`.
    ///
    /// Integer types saturate; NaN becomes zero.
    pub fn encode_le(&self, value: f64, out: &mut Vec<u8>) {
        match self {
            Self::UInt8 => out.push(value as u8),
            Self::Int16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            Self::Int32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            Self::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Self::Float64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    /// Decode one little-endian element. `bytes` must hold exactly `size_bytes()`.
    pub fn decode_le(&self, bytes: &[u8]) -> Result<f64> {
        let wrong_len = || {
            RasterError::io(format!(
                "expected {} bytes for {}, got {}",
                self.size_bytes(),
                self.as_str(),
                bytes.len()
            ))
        };
        Ok(match self {
            Self::UInt8 => *bytes.first().ok_or_else(wrong_len)? as f64,
            Self::Int16 => i16::from_le_bytes(bytes.try_into().map_err(|_| wrong_len())?) as f64,
            Self::Int32 => i32::from_le_bytes(bytes.try_into().map_err(|_| wrong_len())?) as f64,
            Self::Float32 => f32::from_le_bytes(bytes.try_into().map_err(|_| wrong_len())?) as f64,
            Self::Float64 => f64::from_le_bytes(bytes.try_into().map_err(|_| wrong_len())?),
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named axis with regularly spaced coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: u64,
    /// Coordinate of index 0.
    pub start: f64,
    /// Coordinate spacing between neighbouring indices.
    pub step: f64,
}

impl Dimension {
    /// Create a dimension with index coordinates (start 0, step 1).
    pub fn new(name: impl Into<String>, len: u64) -> Self {
        Self {
            name: name.into(),
            len,
            start: 0.0,
            step: 1.0,
        }
    }

    /// Set the coordinate origin and spacing.
    pub fn with_coords(mut self, start: f64, step: f64) -> Self {
        self.start = start;
        self.step = step;
        self
    }

    /// Coordinate value at `index`.
    pub fn coordinate(&self, index: u64) -> f64 {
        self.start + index as f64 * self.step
    }

    /// The sub-axis covering `range`.
    pub fn slice(&self, range: &Range<u64>) -> Self {
        Self {
            name: self.name.clone(),
            len: range.end.saturating_sub(range.start),
            start: self.coordinate(range.start),
            step: self.step,
        }
    }

    /// Default dimension list for a shape when the source carries no names.
    ///
    /// Follows raster conventions: `(y, x)` for 2-D, `(band, y, x)` for 3-D.
    pub fn defaults_for(shape: &[u64]) -> Vec<Self> {
        let names: Vec<String> = match shape.len() {
            1 => vec!["x".to_string()],
            2 => vec!["y".to_string(), "x".to_string()],
            3 => vec!["band".to_string(), "y".to_string(), "x".to_string()],
            n => (0..n).map(|i| format!("dim_{}", i)).collect(),
        };
        names
            .into_iter()
            .zip(shape)
            .map(|(name, &len)| Self::new(name, len))
            .collect()
    }
}

/// Metadata describing a stored array, read once when a resource is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    pub shape: Vec<u64>,
    pub dtype: DataType,
    pub missing_value: Option<f64>,
    pub dims: Vec<Dimension>,
    pub attributes: Metadata,
}

impl ArrayMetadata {
    /// Number of elements, saturating at `u64::MAX`.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.shape
            .iter()
            .try_fold(1u64, |acc, &len| acc.checked_mul(len))
            .unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }
}

/// Compare two optional missing values, treating NaN as equal to NaN.
pub fn same_missing(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => false,
    }
}

/// JSON encoding for a missing value; non-finite values become strings.
pub(crate) fn missing_to_json(value: f64) -> serde_json::Value {
    if value.is_finite() {
        serde_json::json!(value)
    } else {
        serde_json::json!(value.to_string())
    }
}

pub(crate) fn missing_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Full-extent block for `shape`.
pub fn full_block(shape: &[u64]) -> Vec<Range<u64>> {
    shape.iter().map(|&len| 0..len).collect()
}

/// Number of elements covered by a block.
pub fn block_len(ranges: &[Range<u64>]) -> usize {
    ranges
        .iter()
        .map(|r| r.end.saturating_sub(r.start) as usize)
        .product()
}

/// Check that `ranges` addresses a valid block of `shape`.
pub fn check_block(ranges: &[Range<u64>], shape: &[u64]) -> Result<()> {
    let valid = ranges.len() == shape.len()
        && ranges
            .iter()
            .zip(shape)
            .all(|(r, &len)| r.start <= r.end && r.end <= len);
    if valid {
        Ok(())
    } else {
        Err(RasterError::out_of_bounds(format!("{:?}", ranges), shape))
    }
}

/// Visit the contiguous runs of a row-major block.
///
/// Calls `f(array_offset, block_offset, run_len)` for every run along the
/// last axis, in block order. `ranges` must already be checked against `shape`.
pub(crate) fn for_each_run(
    shape: &[u64],
    ranges: &[Range<u64>],
    mut f: impl FnMut(u64, usize, usize),
) {
    let ndim = shape.len();
    if ndim == 0 {
        f(0, 0, 1);
        return;
    }
    if ranges.iter().any(|r| r.start >= r.end) {
        return;
    }

    let last = &ranges[ndim - 1];
    let run = (last.end - last.start) as usize;

    let mut strides = vec![1u64; ndim];
    for axis in (0..ndim - 1).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let mut index: Vec<u64> = ranges[..ndim - 1].iter().map(|r| r.start).collect();
    let mut block_offset = 0usize;
    loop {
        let offset = last.start
            + index
                .iter()
                .zip(&strides)
                .map(|(i, stride)| i * stride)
                .sum::<u64>();
        f(offset, block_offset, run);
        block_offset += run;

        // odometer over the leading axes
        let mut axis = ndim - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < ranges[axis].end {
                break;
            }
            index[axis] = ranges[axis].start;
        }
    }
}

/// Copy a block out of a row-major buffer.
pub(crate) fn extract_block(data: &[f64], shape: &[u64], ranges: &[Range<u64>]) -> Vec<f64> {
    let mut out = vec![0.0; block_len(ranges)];
    for_each_run(shape, ranges, |offset, block_offset, run| {
        let offset = offset as usize;
        out[block_offset..block_offset + run].copy_from_slice(&data[offset..offset + run]);
    });
    out
}

/// Copy `values` into a block of a row-major buffer.
pub(crate) fn insert_block(data: &mut [f64], shape: &[u64], ranges: &[Range<u64>], values: &[f64]) {
    for_each_run(shape, ranges, |offset, block_offset, run| {
        let offset = offset as usize;
        data[offset..offset + run].copy_from_slice(&values[block_offset..block_offset + run]);
    });
}

/// Check that a buffer matches the size of a block.
pub(crate) fn check_block_data(ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
    let expected = block_len(ranges);
    if values.len() == expected {
        Ok(())
    } else {
        Err(RasterError::ArgumentCount {
            what: "block values",
            expected,
            actual: values.len(),
        })
    }
}
