//! 16-bit heightmap aligned with a classification grid

use super::masks::resample_nearest;
use terraclass_core::raster::{GeoTransform, Raster};
use terraclass_core::{RasterLayer, Result};
use terraclass_parallel::{ParallelStrategy, ProcessingMode};
use tracing::warn;

/// Elevation at the centre of every cell of a grid with geotransform `gt`.
///
/// Cells where the DEM cannot be sampled are NaN.
pub fn sample_dem(dem: &RasterLayer, gt: &GeoTransform, rows: usize, cols: usize, mode: ProcessingMode) -> Result<Raster<f64>> {
    let values: Vec<Vec<f64>> = mode.par_map(0..rows, |row| {
        (0..cols)
            .map(|col| {
                let (x, y) = dem.world_to_image().apply(gt.pixel_to_geo(col, row));
                dem.sample_or_fail(x, y).unwrap_or(f64::NAN)
            })
            .collect()
    });
    let mut grid = Raster::from_vec(values.into_iter().flatten().collect(), rows, cols)?;
    grid.set_transform(*gt);
    grid.set_nodata(Some(f64::NAN));
    Ok(grid)
}

/// Linear stretch of the finite range `[min, max]` onto `[0, 65535]`.
///
/// NaN cells become 0. A flat surface maps to 0 everywhere.
pub fn stretch_to_u16(heights: &Raster<f64>) -> Raster<u16> {
    let (min, max) = heights
        .data()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let (rows, cols) = heights.shape();
    let mut out = heights.with_same_meta::<u16>(rows, cols);
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        warn!(min, max, "heightmap has no elevation range");
        return out;
    }
    for (dst, &v) in out.data_mut().iter_mut().zip(heights.data().iter()) {
        if v.is_finite() {
            *dst = (((v - min) / range) * 65535.0).round().clamp(0.0, 65535.0) as u16;
        }
    }
    out
}

/// DEM sampled onto the grid `gt` (`rows x cols`), resampled to
/// `width x height` and stretched to 16 bits
pub fn heightmap(
    dem: &RasterLayer,
    gt: &GeoTransform,
    rows: usize,
    cols: usize,
    width: usize,
    height: usize,
    mode: ProcessingMode,
) -> Result<Raster<u16>> {
    let sampled = sample_dem(dem, gt, rows, cols, mode)?;
    let resized = resample_nearest(&sampled, width, height);
    Ok(stretch_to_u16(&resized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclass_core::io::{RawBuffer, RawRaster};
    use terraclass_core::CutoffParams;

    /// 4x4 DEM, pixel 1, origin (0, 4); z = 10 * col, one no-data cell
    fn dem() -> RasterLayer {
        let mut values: Vec<f32> = (0..16).map(|i| (i % 4) as f32 * 10.0).collect();
        values[15] = -9999.0;
        RasterLayer::from_raw(
            "dem".into(),
            RawRaster {
                buffer: RawBuffer::Gray32Float(values),
                width: 4,
                height: 4,
                geotransform: GeoTransform::new(0.0, 4.0, 1.0, -1.0),
                nodata: Some(-9999.0),
                projection: String::new(),
            },
            &CutoffParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_sample_at_cell_centres() {
        let gt = GeoTransform::new(1.0, 3.0, 1.0, -1.0);
        let grid = sample_dem(&dem(), &gt, 3, 3, ProcessingMode::Sequential).unwrap();
        assert_eq!(grid.get(0, 0).unwrap(), 10.0);
        assert_eq!(grid.get(0, 2).unwrap(), 30.0);
        assert!(grid.get(2, 2).unwrap().is_nan());
    }

    #[test]
    fn test_stretch_full_range() {
        let gt = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let hm = heightmap(&dem(), &gt, 4, 4, 4, 4, ProcessingMode::Sequential).unwrap();
        assert_eq!(hm.get(0, 0).unwrap(), 0);
        assert_eq!(hm.get(0, 3).unwrap(), 65535);
        assert_eq!(hm.get(1, 1).unwrap(), 21845);
        assert_eq!(hm.get(3, 3).unwrap(), 0);
    }

    #[test]
    fn test_flat_surface() {
        let flat = Raster::filled(2, 2, 12.5);
        let out = stretch_to_u16(&flat);
        assert!(out.data().iter().all(|&v| v == 0));
    }
}
