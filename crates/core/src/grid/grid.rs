//! Dense elevation grid

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Geographic extent of a grid.
///
/// Edge coordinates of the raster; whether they run through cell centres or
/// cell corners is decided by [`Grid::pixel_is_area`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            north: 1.0,
            south: 0.0,
            east: 1.0,
            west: 0.0,
        }
    }
}

/// A dense 2-D grid of f64 values with nodata semantics.
///
/// Out-of-range reads return the nodata sentinel, or a reflected in-range
/// value when `reflect_at_boundaries` is set. Nodata comparison uses bit
/// equality, so any finite or infinite sentinel works, including negative
/// zero.
#[derive(Debug, Clone)]
pub struct Grid {
    data: Array2<f64>,
    nodata: f64,
    envelope: Envelope,
    pixel_is_area: bool,
    reflect_at_boundaries: bool,
    min_max: OnceLock<Option<(f64, f64)>>,
}

impl Grid {
    /// Create a grid filled with the nodata sentinel.
    pub fn new(rows: usize, columns: usize, nodata: f64) -> Self {
        Self::filled(rows, columns, nodata, nodata)
    }

    /// Create a grid filled with a constant value.
    pub fn filled(rows: usize, columns: usize, nodata: f64, value: f64) -> Self {
        Self {
            data: Array2::from_elem((rows, columns), value),
            nodata,
            envelope: Envelope::default(),
            pixel_is_area: true,
            reflect_at_boundaries: false,
            min_max: OnceLock::new(),
        }
    }

    /// Create a grid from row-major data.
    pub fn from_vec(data: Vec<f64>, rows: usize, columns: usize, nodata: f64) -> Result<Self> {
        if data.len() != rows * columns {
            return Err(Error::InvalidDimensions { rows, columns });
        }
        let array = Array2::from_shape_vec((rows, columns), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            data: array,
            nodata,
            envelope: Envelope::default(),
            pixel_is_area: true,
            reflect_at_boundaries: false,
            min_max: OnceLock::new(),
        })
    }

    /// Create a grid with the same shape, envelope and nodata as `self`,
    /// filled with `value`.
    pub fn like(&self, value: f64) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), value),
            nodata: self.nodata,
            envelope: self.envelope,
            pixel_is_area: self.pixel_is_area,
            reflect_at_boundaries: false,
            min_max: OnceLock::new(),
        }
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn columns(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn num_cells(&self) -> usize {
        self.data.len()
    }

    // Value access

    /// Read a cell. Signed indices: out-of-range reads return nodata, or a
    /// reflected value when reflection is enabled.
    pub fn value(&self, row: isize, col: isize) -> f64 {
        let (rows, cols) = (self.rows() as isize, self.columns() as isize);
        if row >= 0 && row < rows && col >= 0 && col < cols {
            return self.data[(row as usize, col as usize)];
        }
        if !self.reflect_at_boundaries {
            return self.nodata;
        }
        // Mirror once into the interior; indices still outside after one
        // reflection are too far off grid.
        let mut r = row;
        let mut c = col;
        if r < 0 {
            r = -r - 1;
        }
        if r >= rows {
            r = rows - (r - rows) - 1;
        }
        if c < 0 {
            c = -c - 1;
        }
        if c >= cols {
            c = cols - (c - cols) - 1;
        }
        if r >= 0 && r < rows && c >= 0 && c < cols {
            self.data[(r as usize, c as usize)]
        } else {
            self.nodata
        }
    }

    /// Write a cell. Out-of-range writes are silently ignored.
    pub fn set_value(&mut self, row: isize, col: isize, value: f64) {
        if row >= 0 && (row as usize) < self.rows() && col >= 0 && (col as usize) < self.columns()
        {
            self.data[(row as usize, col as usize)] = value;
            self.min_max = OnceLock::new();
        }
    }

    /// Borrow one row.
    pub fn row_values(&self, row: usize) -> ArrayView1<'_, f64> {
        self.data.row(row)
    }

    /// Replace one row.
    pub fn set_row_values(&mut self, row: usize, values: &[f64]) -> Result<()> {
        if row >= self.rows() || values.len() != self.columns() {
            return Err(Error::DimensionMismatch {
                er: self.rows(),
                ec: self.columns(),
                ar: row,
                ac: values.len(),
            });
        }
        self.data
            .row_mut(row)
            .iter_mut()
            .zip(values)
            .for_each(|(d, &v)| *d = v);
        self.min_max = OnceLock::new();
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        self.min_max = OnceLock::new();
        self.data.view_mut()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        self.min_max = OnceLock::new();
        &mut self.data
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    // Nodata

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: f64) {
        self.nodata = nodata;
        self.min_max = OnceLock::new();
    }

    /// A cell is nodata iff its bits equal the sentinel's bits.
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.to_bits() == self.nodata.to_bits()
    }

    // Metadata

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    /// Whether edge coordinates register cell corners (area pixels) or cell
    /// centres (point pixels).
    pub fn pixel_is_area(&self) -> bool {
        self.pixel_is_area
    }

    pub fn set_pixel_is_area(&mut self, pixel_is_area: bool) {
        self.pixel_is_area = pixel_is_area;
    }

    pub fn reflect_at_boundaries(&self) -> bool {
        self.reflect_at_boundaries
    }

    pub fn set_reflect_at_boundaries(&mut self, reflect: bool) {
        self.reflect_at_boundaries = reflect;
    }

    pub fn cell_size_x(&self) -> f64 {
        let e = &self.envelope;
        if self.pixel_is_area {
            (e.east - e.west) / self.columns() as f64
        } else {
            (e.east - e.west) / (self.columns() - 1) as f64
        }
    }

    pub fn cell_size_y(&self) -> f64 {
        let e = &self.envelope;
        if self.pixel_is_area {
            (e.north - e.south) / self.rows() as f64
        } else {
            (e.north - e.south) / (self.rows() - 1) as f64
        }
    }

    // Statistics

    /// Minimum and maximum of the valid cells, or `None` when every cell is
    /// nodata. Single scan, cached until the grid is mutated.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        *self.min_max.get_or_init(|| {
            let mut min = f64::MAX;
            let mut max = f64::MIN;
            let mut any = false;
            for &v in self.data.iter() {
                if self.is_nodata(v) {
                    continue;
                }
                if v < min {
                    min = v;
                }
                if v > max {
                    max = v;
                }
                any = true;
            }
            any.then_some((min, max))
        })
    }

    /// Number of valid (non-nodata) cells.
    pub fn num_valid_cells(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(10, 20, -9999.0);
        assert_eq!(grid.rows(), 10);
        assert_eq!(grid.columns(), 20);
        assert_eq!(grid.num_cells(), 200);
        assert!(grid.is_nodata(grid.value(0, 0)));
    }

    #[test]
    fn test_out_of_range_reads_return_nodata() {
        let grid = Grid::filled(4, 4, -9999.0, 1.0);
        assert_eq!(grid.value(-1, 0), -9999.0);
        assert_eq!(grid.value(0, -1), -9999.0);
        assert_eq!(grid.value(4, 0), -9999.0);
        assert_eq!(grid.value(0, 4), -9999.0);
    }

    #[test]
    fn test_out_of_range_writes_ignored() {
        let mut grid = Grid::filled(4, 4, -9999.0, 1.0);
        grid.set_value(-1, 0, 5.0);
        grid.set_value(4, 4, 5.0);
        assert!(grid.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_reflection_at_boundaries() {
        let mut grid = Grid::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2, -9999.0).unwrap();
        grid.set_reflect_at_boundaries(true);

        // row -1 mirrors to row 0, col -1 mirrors to col 0
        assert_eq!(grid.value(-1, 0), 1.0);
        assert_eq!(grid.value(0, -1), 1.0);
        // row 2 mirrors to row 1 (rows - (r - rows) - 1)
        assert_eq!(grid.value(2, 1), 4.0);
        assert_eq!(grid.value(1, 2), 4.0);
        // far outside even after one reflection
        assert_eq!(grid.value(-5, 0), -9999.0);
    }

    #[test]
    fn test_nodata_bit_equality() {
        let grid = Grid::new(2, 2, f64::NEG_INFINITY);
        assert!(grid.is_nodata(f64::NEG_INFINITY));
        assert!(!grid.is_nodata(f64::INFINITY));
        assert!(!grid.is_nodata(f64::MIN));
    }

    #[test]
    fn test_min_max_ignores_nodata() {
        let mut grid = Grid::new(3, 3, -9999.0);
        grid.set_value(0, 0, 5.0);
        grid.set_value(1, 1, -2.0);
        grid.set_value(2, 2, 11.0);
        assert_eq!(grid.min_max(), Some((-2.0, 11.0)));

        // cache invalidated on write
        grid.set_value(0, 1, 20.0);
        assert_eq!(grid.min_max(), Some((-2.0, 20.0)));
    }

    #[test]
    fn test_min_max_all_nodata() {
        let grid = Grid::new(3, 3, -9999.0);
        assert_eq!(grid.min_max(), None);
    }

    #[test]
    fn test_cell_sizes() {
        let mut grid = Grid::new(10, 20, -9999.0);
        grid.set_envelope(Envelope {
            north: 100.0,
            south: 0.0,
            east: 200.0,
            west: 0.0,
        });
        assert_eq!(grid.cell_size_x(), 10.0);
        assert_eq!(grid.cell_size_y(), 10.0);

        grid.set_pixel_is_area(false);
        assert!((grid.cell_size_x() - 200.0 / 19.0).abs() < 1e-12);
    }

    #[test]
    fn test_row_access() {
        let mut grid = Grid::new(2, 3, -9999.0);
        grid.set_row_values(1, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(grid.row_values(1).to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(grid.set_row_values(1, &[1.0]).is_err());
        assert!(grid.set_row_values(5, &[1.0, 2.0, 3.0]).is_err());
    }
}
