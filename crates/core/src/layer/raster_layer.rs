//! A single loaded raster band

use super::LayerId;
use super::histogram::{CutoffParams, LayerStatistics, compute_statistics};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{RawBuffer, RawRaster};
use crate::raster::{GeoTransform, Raster};
use crate::transform::{AffineTransform, Extent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sample format of a layer's pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Gray16,
    Gray32Float,
}

/// Pixel buffer in its native sample type
#[derive(Debug, Clone)]
pub enum LayerPixels {
    Gray8(Raster<u8>),
    Gray16(Raster<u16>),
    Gray32Float(Raster<f32>),
}

impl LayerPixels {
    pub fn format(&self) -> PixelFormat {
        match self {
            LayerPixels::Gray8(_) => PixelFormat::Gray8,
            LayerPixels::Gray16(_) => PixelFormat::Gray16,
            LayerPixels::Gray32Float(_) => PixelFormat::Gray32Float,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            LayerPixels::Gray8(r) => r.shape(),
            LayerPixels::Gray16(r) => r.shape(),
            LayerPixels::Gray32Float(r) => r.shape(),
        }
    }

    /// Value at an in-bounds cell
    fn value(&self, row: usize, col: usize) -> f64 {
        match self {
            LayerPixels::Gray8(r) => r.data()[(row, col)] as f64,
            LayerPixels::Gray16(r) => r.data()[(row, col)] as f64,
            LayerPixels::Gray32Float(r) => r.data()[(row, col)] as f64,
        }
    }

    fn iter_f64(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            LayerPixels::Gray8(r) => Box::new(r.data().iter().map(|&v| v as f64)),
            LayerPixels::Gray16(r) => Box::new(r.data().iter().map(|&v| v as f64)),
            LayerPixels::Gray32Float(r) => Box::new(r.data().iter().map(|&v| v as f64)),
        }
    }

    fn from_raw(raw: RawRaster) -> Result<Self> {
        let (rows, cols) = (raw.height, raw.width);
        let mut pixels = match raw.buffer {
            RawBuffer::Gray8(v) => LayerPixels::Gray8(Raster::from_vec(v, rows, cols)?),
            RawBuffer::Gray16(v) => LayerPixels::Gray16(Raster::from_vec(v, rows, cols)?),
            RawBuffer::Gray32Float(v) => LayerPixels::Gray32Float(Raster::from_vec(v, rows, cols)?),
        };
        match &mut pixels {
            LayerPixels::Gray8(r) => r.set_transform(raw.geotransform),
            LayerPixels::Gray16(r) => r.set_transform(raw.geotransform),
            LayerPixels::Gray32Float(r) => r.set_transform(raw.geotransform),
        }
        Ok(pixels)
    }
}

/// How band samples become classifier inputs.
///
/// Part of a trained model's band-set descriptor: a model trained with one
/// scaling rejects vectors assembled with the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityScaling {
    /// 16-bit samples as stored; float samples mapped from the layer's data
    /// range onto `0..=65535`
    #[default]
    Raw,
    /// `[min_cutoff, max_cutoff]` mapped onto `0..=65535`, clamped
    ContrastStretch,
}

/// One raster band with its georeferencing and contrast statistics.
///
/// Image coordinates are pixel-centre based: `(i, j)` is the centre of column
/// `i`, row `j`. The layer is immutable once constructed, so the cached
/// world → image transform can never drift from `image_to_world`.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    id: LayerId,
    pixels: LayerPixels,
    geotransform: GeoTransform,
    image_to_world: AffineTransform,
    world_to_image: AffineTransform,
    nodata: Option<f64>,
    crs: Option<CRS>,
    statistics: LayerStatistics,
    source: Option<PathBuf>,
}

impl RasterLayer {
    /// Build a layer from a reader's output, running the histogram scan.
    pub fn from_raw(id: LayerId, raw: RawRaster, cutoffs: &CutoffParams) -> Result<Self> {
        raw.validate()?;
        let geotransform = raw.geotransform;
        let image_to_world = AffineTransform::translation(0.5, 0.5)
            .then(&AffineTransform::from_geotransform(&geotransform));
        let world_to_image = image_to_world.invert()?;
        let nodata = raw.nodata;
        let crs = CRS::parse(&raw.projection);
        let pixels = LayerPixels::from_raw(raw)?;

        let integer_samples = pixels.format() != PixelFormat::Gray32Float;
        let valid = || {
            pixels
                .iter_f64()
                .filter(|v| !v.is_nan() && nodata.is_none_or(|nd| *v != nd))
        };
        let statistics = compute_statistics(valid, integer_samples, cutoffs)?;

        if statistics.valid_count == 0 {
            warn!(layer = %id, "layer has no valid samples");
        } else if statistics.max_cutoff <= statistics.min_cutoff {
            warn!(layer = %id, cutoff = statistics.min_cutoff, "layer has a zero contrast range");
        }
        let (rows, cols) = pixels.shape();
        debug!(
            layer = %id,
            format = ?pixels.format(),
            cols,
            rows,
            min_cutoff = statistics.min_cutoff,
            max_cutoff = statistics.max_cutoff,
            "layer constructed"
        );

        Ok(Self {
            id,
            pixels,
            geotransform,
            image_to_world,
            world_to_image,
            nodata,
            crs,
            statistics,
            source: None,
        })
    }

    /// Attach the file the layer came from
    pub fn with_source(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(path.as_ref().to_path_buf());
        self
    }

    // Metadata

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn format(&self) -> PixelFormat {
        self.pixels.format()
    }

    pub fn pixels(&self) -> &LayerPixels {
        &self.pixels
    }

    pub fn width(&self) -> usize {
        self.pixels.shape().1
    }

    pub fn height(&self) -> usize {
        self.pixels.shape().0
    }

    pub fn geotransform(&self) -> &GeoTransform {
        &self.geotransform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn statistics(&self) -> &LayerStatistics {
        &self.statistics
    }

    pub fn min_cutoff(&self) -> f64 {
        self.statistics.min_cutoff
    }

    pub fn max_cutoff(&self) -> f64 {
        self.statistics.max_cutoff
    }

    /// Samples widened to `f64` on the layer's grid; no-data cells become NaN
    pub fn to_grid(&self) -> Result<Raster<f64>> {
        let (rows, cols) = self.pixels.shape();
        let nodata = self.nodata;
        let values: Vec<f64> = self
            .pixels
            .iter_f64()
            .map(|v| if nodata.is_some_and(|nd| v == nd) { f64::NAN } else { v })
            .collect();
        let mut grid = Raster::from_vec(values, rows, cols)?;
        grid.set_transform(self.geotransform);
        grid.set_nodata(Some(f64::NAN));
        Ok(grid)
    }

    // Georeferencing

    /// Pixel-centre image coordinates → world
    pub fn image_to_world(&self) -> &AffineTransform {
        &self.image_to_world
    }

    /// World → pixel-centre image coordinates
    pub fn world_to_image(&self) -> &AffineTransform {
        &self.world_to_image
    }

    /// World units per pixel along the image x axis
    pub fn scale_x(&self) -> f64 {
        self.image_to_world.scale_x()
    }

    /// World units per pixel along the image y axis
    pub fn scale_y(&self) -> f64 {
        self.image_to_world.scale_y()
    }

    /// World-space bounding rectangle of the full pixel footprint
    pub fn world_bounds(&self) -> Extent {
        self.image_to_world.map_rect(
            -0.5,
            -0.5,
            self.width() as f64 - 0.5,
            self.height() as f64 - 0.5,
        )
    }

    pub fn upper_left_world(&self) -> (f64, f64) {
        self.world_bounds().upper_left()
    }

    pub fn bottom_right_world(&self) -> (f64, f64) {
        self.world_bounds().bottom_right()
    }

    // Sampling

    /// Nearest pixel `(row, col)` for image coordinates, `None` outside
    pub fn pixel_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = (x.round(), y.round());
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.width() && row < self.height()).then_some((row, col))
    }

    /// Lenient nearest-neighbour sample: 0 outside the raster.
    ///
    /// For previews only; classification goes through [`Self::sample_or_fail`].
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        match self.pixel_index(x, y) {
            Some((row, col)) => self.pixels.value(row, col),
            None => 0.0,
        }
    }

    /// Strict nearest-neighbour sample.
    ///
    /// Fails with `OutOfExtent` outside the raster and `NoData` on NaN or
    /// no-data cells.
    pub fn sample_or_fail(&self, x: f64, y: f64) -> Result<f64> {
        let (row, col) = self.pixel_index(x, y).ok_or_else(|| Error::OutOfExtent {
            layer: self.id.to_string(),
            x,
            y,
        })?;
        let v = self.pixels.value(row, col);
        if v.is_nan() || self.nodata.is_some_and(|nd| v == nd) {
            return Err(Error::NoData {
                layer: self.id.to_string(),
                x,
                y,
            });
        }
        Ok(v)
    }

    /// Strict sample normalised to the 16-bit range.
    ///
    /// Only Gray16 and Gray32Float layers qualify; Gray8 fails with
    /// `UnsupportedFormat`.
    pub fn scaled_to_unsigned_short(&self, x: f64, y: f64, scaling: IntensityScaling) -> Result<u16> {
        self.check_scalable()?;
        let v = self.sample_or_fail(x, y)?;
        Ok(self.scale_value(v, scaling))
    }

    /// [`Self::scaled_to_unsigned_short`] reduced to 8 bits
    pub fn scaled_to_byte(&self, x: f64, y: f64, scaling: IntensityScaling) -> Result<u8> {
        Ok((self.scaled_to_unsigned_short(x, y, scaling)? >> 8) as u8)
    }

    fn check_scalable(&self) -> Result<()> {
        match self.format() {
            PixelFormat::Gray16 | PixelFormat::Gray32Float => Ok(()),
            PixelFormat::Gray8 => Err(Error::UnsupportedFormat(format!(
                "layer '{}' is Gray8; only Gray16 and Gray32Float can be scaled",
                self.id
            ))),
        }
    }

    /// Map a valid sample onto `0..=65535` under `scaling`
    fn scale_value(&self, v: f64, scaling: IntensityScaling) -> u16 {
        let (lo, hi) = match (scaling, self.format()) {
            (IntensityScaling::Raw, PixelFormat::Gray16) => return v as u16,
            (IntensityScaling::Raw, _) => (self.statistics.data_min, self.statistics.data_max),
            (IntensityScaling::ContrastStretch, _) => (self.statistics.min_cutoff, self.statistics.max_cutoff),
        };
        stretch(v, lo, hi)
    }
}

/// Linear map of `[lo, hi]` onto `0..=65535`, clamped; a degenerate range maps
/// everything to 0
fn stretch(v: f64, lo: f64, hi: f64) -> u16 {
    if hi <= lo {
        return 0;
    }
    let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    (t * u16::MAX as f64).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(buffer: RawBuffer, width: usize, height: usize) -> RawRaster {
        RawRaster {
            buffer,
            width,
            height,
            geotransform: GeoTransform::new(100.0, 200.0, 10.0, -10.0),
            nodata: None,
            projection: "EPSG:32633".into(),
        }
    }

    fn layer(buffer: RawBuffer, width: usize, height: usize) -> RasterLayer {
        RasterLayer::from_raw("b1".into(), raw(buffer, width, height), &CutoffParams::default()).unwrap()
    }

    #[test]
    fn test_transforms_are_pixel_centre_based() {
        let l = layer(RawBuffer::Gray16(vec![0; 6]), 3, 2);
        let (x, y) = l.image_to_world().apply((0.0, 0.0));
        assert_relative_eq!(x, 105.0);
        assert_relative_eq!(y, 195.0);
        let (i, j) = l.world_to_image().apply((125.0, 185.0));
        assert_relative_eq!(i, 2.0, epsilon = 1e-9);
        assert_relative_eq!(j, 1.0, epsilon = 1e-9);

        let bounds = l.world_bounds();
        assert_relative_eq!(bounds.min_x, 100.0);
        assert_relative_eq!(bounds.max_x, 130.0);
        assert_relative_eq!(bounds.min_y, 180.0);
        assert_relative_eq!(bounds.max_y, 200.0);
        assert_relative_eq!(l.scale_x(), 10.0);
        assert_eq!(l.crs().and_then(|c| c.epsg()), Some(32633));
    }

    #[test]
    fn test_singular_geotransform_is_rejected() {
        let mut r = raw(RawBuffer::Gray16(vec![0; 4]), 2, 2);
        r.geotransform = GeoTransform::new(0.0, 0.0, 0.0, -1.0);
        let err = RasterLayer::from_raw("b1".into(), r, &CutoffParams::default()).unwrap_err();
        assert!(matches!(err, Error::SingularMatrix { .. }));
    }

    #[test]
    fn test_lenient_and_strict_sampling() {
        let l = layer(RawBuffer::Gray16(vec![1, 2, 3, 4]), 2, 2);
        assert_eq!(l.sample(1.0, 1.0), 4.0);
        assert_eq!(l.sample(0.4, 0.6), 3.0);
        assert_eq!(l.sample(-1.0, 0.0), 0.0);
        assert_eq!(l.sample(2.0, 0.0), 0.0);
        assert_eq!(l.sample_or_fail(1.0, 0.0).unwrap(), 2.0);
        assert!(matches!(l.sample_or_fail(1.6, 0.0), Err(Error::OutOfExtent { .. })));
        assert!(matches!(l.sample_or_fail(f64::NAN, 0.0), Err(Error::OutOfExtent { .. })));
    }

    #[test]
    fn test_nodata_is_strict_failure() {
        let mut r = raw(RawBuffer::Gray32Float(vec![1.0, f32::NAN, -9999.0, 4.0]), 2, 2);
        r.nodata = Some(-9999.0);
        let l = RasterLayer::from_raw("dem".into(), r, &CutoffParams::default()).unwrap();
        assert!(matches!(l.sample_or_fail(1.0, 0.0), Err(Error::NoData { .. })));
        assert!(matches!(l.sample_or_fail(0.0, 1.0), Err(Error::NoData { .. })));
        assert_eq!(l.statistics().valid_count, 2);
        assert_eq!(l.statistics().data_min, 1.0);
        assert_eq!(l.statistics().data_max, 4.0);
    }

    #[test]
    fn test_to_grid_marks_nodata() {
        let mut r = raw(RawBuffer::Gray16(vec![5, 0, 7, 9]), 2, 2);
        r.nodata = Some(0.0);
        let l = RasterLayer::from_raw("dem".into(), r, &CutoffParams::default()).unwrap();
        let grid = l.to_grid().unwrap();
        assert_eq!(grid.shape(), (2, 2));
        assert_eq!(grid.get(0, 0).unwrap(), 5.0);
        assert!(grid.get(0, 1).unwrap().is_nan());
        assert_eq!(grid.transform(), l.geotransform());
    }

    #[test]
    fn test_raw_scaling() {
        let l = layer(RawBuffer::Gray16(vec![0, 1000, 40000, 65535]), 2, 2);
        assert_eq!(l.scaled_to_unsigned_short(0.0, 1.0, IntensityScaling::Raw).unwrap(), 40000);
        assert_eq!(l.scaled_to_byte(0.0, 1.0, IntensityScaling::Raw).unwrap(), (40000u16 >> 8) as u8);

        let f = layer(RawBuffer::Gray32Float(vec![-1.0, 0.0, 1.0, 3.0]), 2, 2);
        assert_eq!(f.scaled_to_unsigned_short(0.0, 0.0, IntensityScaling::Raw).unwrap(), 0);
        assert_eq!(f.scaled_to_unsigned_short(1.0, 1.0, IntensityScaling::Raw).unwrap(), 65535);
        assert_eq!(f.scaled_to_unsigned_short(1.0, 0.0, IntensityScaling::Raw).unwrap(), 16384);
    }

    #[test]
    fn test_contrast_stretch_clamps() {
        let values: Vec<u16> = (0..100).collect();
        let l = layer(RawBuffer::Gray16(values), 10, 10);
        assert_eq!(l.min_cutoff(), 2.0);
        assert_eq!(l.max_cutoff(), 97.0);
        let s = IntensityScaling::ContrastStretch;
        assert_eq!(l.scaled_to_unsigned_short(0.0, 0.0, s).unwrap(), 0);
        assert_eq!(l.scaled_to_unsigned_short(9.0, 9.0, s).unwrap(), 65535);
        assert_eq!(l.scaled_to_byte(9.0, 9.0, s).unwrap(), 255);
    }

    #[test]
    fn test_gray8_rejects_scaling() {
        let l = layer(RawBuffer::Gray8(vec![7; 4]), 2, 2);
        assert_eq!(l.sample_or_fail(0.0, 0.0).unwrap(), 7.0);
        assert!(matches!(
            l.scaled_to_unsigned_short(0.0, 0.0, IntensityScaling::Raw),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            l.scaled_to_byte(0.0, 0.0, IntensityScaling::ContrastStretch),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
