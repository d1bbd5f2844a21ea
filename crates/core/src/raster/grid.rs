//! Georeferenced value grid

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// A `(row, col)` grid of values with its geotransform and no-data value.
///
/// Layer pixel buffers, elevation grids, terrain derivatives and label
/// grids are all `Raster`s; only the element type differs.
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Zero-filled grid
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Grid from row-major samples; `data.len()` must equal `rows * cols`
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        let array = Array2::from_shape_vec((rows, cols), data).map_err(|_| Error::InvalidDimensions {
            width: cols,
            height: rows,
        })?;
        Ok(Self::from_array(array))
    }

    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            nodata: None,
        }
    }

    /// Zero-filled grid of another element type on this grid's geotransform
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            nodata: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data.get((row, col)).copied().ok_or(Error::IndexOutOfBounds {
            row,
            col,
            rows: self.rows(),
            cols: self.cols(),
        })
    }

    /// Value at a signed position, `None` outside the grid
    pub fn get_signed(&self, row: isize, col: isize) -> Option<T> {
        if row < 0 || col < 0 {
            return None;
        }
        self.data.get((row as usize, col as usize)).copied()
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        let cell = self.data.get_mut((row, col)).ok_or(Error::IndexOutOfBounds { row, col, rows, cols })?;
        *cell = value;
        Ok(())
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Pixel width in map units (square cells assumed)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Whether `value` is NaN or equals this grid's no-data value
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Number of cells holding data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access() {
        let mut raster: Raster<f32> = Raster::new(10, 20);
        assert_eq!(raster.shape(), (10, 20));
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
        assert!(raster.set(0, 20, 1.0).is_err());
        assert_eq!(raster.get_signed(-1, 0), None);
        assert_eq!(raster.get_signed(5, 5), Some(42.0));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Raster::<u8>::from_vec(vec![0; 5], 2, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { width: 3, height: 2 }));
    }

    #[test]
    fn test_valid_count() {
        let mut labels = Raster::from_vec(vec![1u8, 9, 2, 9], 2, 2).unwrap();
        assert_eq!(labels.valid_count(), 4);
        labels.set_nodata(Some(9));
        assert_eq!(labels.valid_count(), 2);

        let heights = Raster::from_vec(vec![1.0, f64::NAN, 3.0], 1, 3).unwrap();
        assert_eq!(heights.valid_count(), 2);
    }
}
