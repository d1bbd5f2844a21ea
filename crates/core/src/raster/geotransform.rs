//! GDAL-style affine georeferencing of a grid

use crate::transform::Extent;
use serde::{Deserialize, Serialize};

/// Six-coefficient geotransform mapping grid corners to map coordinates:
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row)` here are corner based: `(0, 0)` is the upper-left corner of
/// the first pixel. North-up grids have zero rotations and a negative
/// `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// From GDAL coefficient order
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    fn at(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinates of the centre of pixel `(col, row)`
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.at(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map coordinates of the upper-left corner of pixel `(col, row)`
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.at(col as f64, row as f64)
    }

    /// Pixel width in map units
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Transform of the sub-grid whose upper-left pixel is `(col_off, row_off)`
    pub fn window(&self, col_off: usize, row_off: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(col_off, row_off);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Transform of a `width x height` grid resampled to `cols x rows` over
    /// the same footprint
    pub fn resampled(&self, width: usize, height: usize, cols: usize, rows: usize) -> Self {
        let sx = width as f64 / cols.max(1) as f64;
        let sy = height as f64 / rows.max(1) as f64;
        Self {
            pixel_width: self.pixel_width * sx,
            pixel_height: self.pixel_height * sy,
            row_rotation: self.row_rotation * sy,
            col_rotation: self.col_rotation * sx,
            ..*self
        }
    }

    /// Axis-aligned footprint of a `width x height` grid
    pub fn extent(&self, width: usize, height: usize) -> Extent {
        let corners = [(0, 0), (width, 0), (0, height), (width, height)].map(|(c, r)| self.pixel_to_geo_corner(c, r));
        let xs = corners.map(|p| p.0);
        let ys = corners.map(|p| p.1);
        let min = |v: [f64; 4]| v.into_iter().fold(f64::INFINITY, f64::min);
        let max = |v: [f64; 4]| v.into_iter().fold(f64::NEG_INFINITY, f64::max);
        Extent::new(min(xs), min(ys), max(xs), max(ys))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
