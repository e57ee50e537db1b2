//! Data payloads: in-memory buffers, file-backed arrays and lazy windows.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{RasterError, Result};
use crate::lazy::{LazyArray, OpenArray};
use crate::types::{check_block, check_block_data, extract_block, insert_block, DataType};

/// A row-major buffer held in memory.
///
/// The buffer is shared between clones and copied on first write.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryArray {
    shape: Vec<u64>,
    dtype: DataType,
    data: Arc<Vec<f64>>,
}

impl MemoryArray {
    pub fn new(shape: Vec<u64>, dtype: DataType, data: Vec<f64>) -> Result<Self> {
        let expected: u64 = shape.iter().product();
        if data.len() as u64 != expected {
            return Err(RasterError::dimension_mismatch(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            shape,
            dtype,
            data: Arc::new(data),
        })
    }

    /// A buffer of `shape` filled with `value`.
    pub fn filled(shape: Vec<u64>, dtype: DataType, value: f64) -> Self {
        let len = shape.iter().product::<u64>() as usize;
        Self {
            shape,
            dtype,
            data: Arc::new(vec![value; len]),
        }
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        check_block(ranges, &self.shape)?;
        Ok(extract_block(&self.data, &self.shape, ranges))
    }

    pub fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        check_block(ranges, &self.shape)?;
        check_block_data(ranges, values)?;
        insert_block(Arc::make_mut(&mut self.data).as_mut_slice(), &self.shape, ranges, values);
        Ok(())
    }
}

/// A rectangular view into another payload.
///
/// `ranges` are in the source's index space, one per source axis. Axes marked
/// in `dropped` have length one and do not appear in the view's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    source: Payload,
    ranges: Vec<Range<u64>>,
    dropped: Vec<bool>,
}

impl Window {
    pub fn new(source: Payload, ranges: Vec<Range<u64>>, dropped: Vec<bool>) -> Result<Self> {
        check_block(&ranges, &source.shape())?;
        if dropped.len() != ranges.len() {
            return Err(RasterError::ArgumentCount {
                what: "dropped-axis flags",
                expected: ranges.len(),
                actual: dropped.len(),
            });
        }
        if let Some(axis) = ranges
            .iter()
            .zip(&dropped)
            .position(|(r, &drop)| drop && r.end - r.start != 1)
        {
            return Err(RasterError::dimension_mismatch(format!(
                "dropped axis {} must have length 1",
                axis
            )));
        }
        Ok(Self {
            source,
            ranges,
            dropped,
        })
    }

    pub fn source(&self) -> &Payload {
        &self.source
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    pub fn shape(&self) -> Vec<u64> {
        self.ranges
            .iter()
            .zip(&self.dropped)
            .filter(|(_, &drop)| !drop)
            .map(|(r, _)| r.end - r.start)
            .collect()
    }

    /// Map a block in view coordinates to the source's coordinates.
    fn to_source(&self, ranges: &[Range<u64>]) -> Result<Vec<Range<u64>>> {
        check_block(ranges, &self.shape())?;
        let mut requested = ranges.iter();
        let mut source = Vec::with_capacity(self.ranges.len());
        for (window, &drop) in self.ranges.iter().zip(&self.dropped) {
            let next = if drop { None } else { requested.next() };
            match next {
                Some(r) => source.push(window.start + r.start..window.start + r.end),
                None => source.push(window.clone()),
            }
        }
        Ok(source)
    }

    fn with_source(&self, source: Payload) -> Self {
        Self {
            source,
            ranges: self.ranges.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

/// The data behind a [`RasterArray`](crate::RasterArray).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Values held in memory.
    Memory(MemoryArray),
    /// A closed file; each access opens and closes it.
    Lazy(LazyArray),
    /// A file held open by an active session.
    Open(OpenArray),
    /// A lazy sub-block of another payload.
    Window(Box<Window>),
}

impl Payload {
    pub fn shape(&self) -> Vec<u64> {
        match self {
            Self::Memory(m) => m.shape().to_vec(),
            Self::Lazy(l) => l.shape().to_vec(),
            Self::Open(o) => o.shape().to_vec(),
            Self::Window(w) => w.shape(),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::Memory(m) => m.dtype(),
            Self::Lazy(l) => l.dtype(),
            Self::Open(o) => o.dtype(),
            Self::Window(w) => w.source.dtype(),
        }
    }

    pub fn read_block(&self, ranges: &[Range<u64>]) -> Result<Vec<f64>> {
        match self {
            Self::Memory(m) => m.read_block(ranges),
            Self::Lazy(l) => l.read_block(ranges),
            Self::Open(o) => o.read_block(ranges),
            Self::Window(w) => w.source.read_block(&w.to_source(ranges)?),
        }
    }

    pub fn write_block(&mut self, ranges: &[Range<u64>], values: &[f64]) -> Result<()> {
        match self {
            Self::Memory(m) => m.write_block(ranges, values),
            Self::Lazy(l) => l.write_block(ranges, values),
            Self::Open(o) => o.write_block(ranges, values),
            Self::Window(w) => {
                let source_ranges = w.to_source(ranges)?;
                w.source.write_block(&source_ranges, values)
            }
        }
    }

    /// Copy of this payload with every `Lazy` leaf replaced by `replace(leaf)`.
    pub(crate) fn map_lazy(&self, replace: &mut dyn FnMut(&LazyArray) -> Payload) -> Payload {
        match self {
            Self::Lazy(l) => replace(l),
            Self::Window(w) => Self::Window(Box::new(w.with_source(w.source.map_lazy(replace)))),
            Self::Memory(_) | Self::Open(_) => self.clone(),
        }
    }

    pub(crate) fn visit_lazy<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        match self {
            Self::Lazy(l) => visit(l),
            Self::Window(w) => w.source.visit_lazy(visit),
            Self::Memory(_) | Self::Open(_) => {}
        }
    }
}

impl From<MemoryArray> for Payload {
    fn from(memory: MemoryArray) -> Self {
        Self::Memory(memory)
    }
}

impl From<LazyArray> for Payload {
    fn from(lazy: LazyArray) -> Self {
        Self::Lazy(lazy)
    }
}

impl From<Window> for Payload {
    fn from(window: Window) -> Self {
        Self::Window(Box::new(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_3x4() -> MemoryArray {
        let data = (0..3)
            .flat_map(|r| (0..4).map(move |c| (r * 10 + c) as f64))
            .collect();
        MemoryArray::new(vec![3, 4], DataType::Float64, data).unwrap()
    }

    #[test]
    fn test_memory_rejects_wrong_length() {
        let err = MemoryArray::new(vec![2, 2], DataType::UInt8, vec![1.0; 3]).unwrap_err();
        assert!(err.to_string().contains("needs 4 values"));
    }

    #[test]
    fn test_memory_copy_on_write() {
        let original = grid_3x4();
        let mut copy = original.clone();
        copy.write_block(&[0..1, 0..1], &[99.0]).unwrap();
        assert_eq!(copy.values()[0], 99.0);
        assert_eq!(original.values()[0], 0.0);
    }

    #[test]
    fn test_window_reads_offset_block() {
        let window = Window::new(grid_3x4().into(), vec![1..3, 1..4], vec![false, false]).unwrap();
        let payload = Payload::from(window);
        assert_eq!(payload.shape(), vec![2, 3]);
        assert_eq!(
            payload.read_block(&[0..1, 0..3]).unwrap(),
            vec![11.0, 12.0, 13.0]
        );
    }

    #[test]
    fn test_window_drops_axis() {
        let window = Window::new(grid_3x4().into(), vec![2..3, 0..4], vec![true, false]).unwrap();
        let payload = Payload::from(window);
        assert_eq!(payload.shape(), vec![4]);
        assert_eq!(payload.read_block(&[1..3]).unwrap(), vec![21.0, 22.0]);
    }

    #[test]
    fn test_nested_windows_compose() {
        let inner = Window::new(grid_3x4().into(), vec![1..3, 0..4], vec![false, false]).unwrap();
        let outer = Window::new(inner.into(), vec![1..2, 2..4], vec![false, false]).unwrap();
        let payload = Payload::from(outer);
        assert_eq!(payload.read_block(&[0..1, 0..2]).unwrap(), vec![22.0, 23.0]);
    }

    #[test]
    fn test_window_write_reaches_source() {
        let window = Window::new(grid_3x4().into(), vec![0..3, 3..4], vec![false, true]).unwrap();
        let mut payload = Payload::from(window);
        payload.write_block(&[0..3], &[-1.0, -2.0, -3.0]).unwrap();
        match &payload {
            Payload::Window(w) => match w.source() {
                Payload::Memory(m) => {
                    assert_eq!(m.values()[3], -1.0);
                    assert_eq!(m.values()[11], -3.0);
                }
                other => panic!("unexpected source {:?}", other),
            },
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_window_bounds_checked() {
        let window = Window::new(grid_3x4().into(), vec![0..2, 0..2], vec![false, false]).unwrap();
        assert!(Payload::from(window).read_block(&[0..3, 0..1]).is_err());
        assert!(Window::new(grid_3x4().into(), vec![0..5, 0..1], vec![false, false]).is_err());
    }
}
