//! Test data generators for creating synthetic raster data.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
///
/// # Returns
///
/// A `Vec<f64>` in row-major order (row 0 first, then row 1, etc.)
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Expected value of [`create_test_grid`] at `(col, row)`.
pub fn test_grid_value(col: usize, row: usize) -> f64 {
    (col * 1000 + row) as f64
}

/// Creates a band-interleaved cube of `bands` test grids.
///
/// Band `b` holds [`create_test_grid`] values plus `b * 1_000_000`, so every
/// cell of the cube is distinct.
pub fn create_band_stack(bands: usize, width: usize, height: usize) -> Vec<f64> {
    let grid = create_test_grid(width, height);
    let mut data = Vec::with_capacity(bands * grid.len());
    for band in 0..bands {
        let offset = (band * 1_000_000) as f64;
        data.extend(grid.iter().map(|v| v + offset));
    }
    data
}

/// Creates a test grid with elevation-like values in metres.
///
/// Values follow a smooth ridge running diagonally across the grid,
/// between 0 and about 3000.
pub fn create_elevation_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = col as f64 / width.max(1) as f64;
            let y = row as f64 / height.max(1) as f64;
            let ridge = 1.0 - (x - y).abs();
            data.push((ridge * 3000.0).round());
        }
    }
    data
}

/// Creates a grid with a checkerboard of missing values.
///
/// Cells where `(row + col) % 2 == 1` hold `missing`; the rest hold their
/// [`create_test_grid`] value.
pub fn create_grid_with_missing(width: usize, height: usize, missing: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            if (row + col) % 2 == 1 {
                data.push(missing);
            } else {
                data.push(test_grid_value(col, row));
            }
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[1], 1000.0);
        assert_eq!(grid[10], 1.0);
        assert_eq!(grid[2 * 10 + 3], test_grid_value(3, 2));
    }

    #[test]
    fn test_band_stack_offsets() {
        let cube = create_band_stack(3, 4, 2);
        assert_eq!(cube.len(), 24);
        assert_eq!(cube[8], 1_000_000.0);
        assert_eq!(cube[16 + 5], 2_000_000.0 + test_grid_value(1, 1));
    }

    #[test]
    fn test_elevation_range() {
        let grid = create_elevation_grid(20, 20);
        assert!(grid.iter().all(|&v| (0.0..=3000.0).contains(&v)));
        assert_eq!(grid[0], 3000.0);
    }

    #[test]
    fn test_grid_with_missing() {
        let grid = create_grid_with_missing(3, 2, -9999.0);
        assert_eq!(grid, vec![0.0, -9999.0, 2000.0, -9999.0, 1001.0, -9999.0]);
    }
}
