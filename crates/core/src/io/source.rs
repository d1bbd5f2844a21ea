//! Raster-reading collaborator interface
//!
//! A reader turns a file into a [`RawRaster`]: the pixel buffer in its native
//! sample format plus the geotransform, the no-data value and the projection
//! name. Everything above this layer works on `RawRaster` and never touches a
//! file format directly.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::path::Path;

/// Pixel samples as delivered by a reader
#[derive(Debug, Clone, PartialEq)]
pub enum RawBuffer {
    Gray8(Vec<u8>),
    Gray16(Vec<u16>),
    Gray32Float(Vec<f32>),
}

impl RawBuffer {
    pub fn len(&self) -> usize {
        match self {
            RawBuffer::Gray8(v) => v.len(),
            RawBuffer::Gray16(v) => v.len(),
            RawBuffer::Gray32Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short format name used in logs and error messages
    pub fn format_name(&self) -> &'static str {
        match self {
            RawBuffer::Gray8(_) => "Gray8",
            RawBuffer::Gray16(_) => "Gray16",
            RawBuffer::Gray32Float(_) => "Gray32Float",
        }
    }
}

/// One band as read from disk
#[derive(Debug, Clone)]
pub struct RawRaster {
    pub buffer: RawBuffer,
    pub width: usize,
    pub height: usize,
    pub geotransform: GeoTransform,
    pub nodata: Option<f64>,
    /// Projection identifier (`EPSG:xxxx`, WKT, or empty when unknown)
    pub projection: String,
}

impl RawRaster {
    /// Validate that the buffer matches the declared dimensions
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.buffer.len() != self.width * self.height {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Convert the samples into a typed grid carrying the same
    /// georeferencing. No-data cells become `T::default_nodata()`.
    pub fn to_raster<T: RasterElement>(&self) -> Result<Raster<T>> {
        self.validate()?;
        let nodata = self.nodata;
        let convert = |v: f64| {
            if v.is_nan() || nodata.is_some_and(|nd| v == nd) {
                T::default_nodata()
            } else {
                T::from_f64_saturating(v)
            }
        };
        let data: Vec<T> = match &self.buffer {
            RawBuffer::Gray8(v) => v.iter().map(|&x| convert(x as f64)).collect(),
            RawBuffer::Gray16(v) => v.iter().map(|&x| convert(x as f64)).collect(),
            RawBuffer::Gray32Float(v) => v.iter().map(|&x| convert(x as f64)).collect(),
        };
        let mut raster = Raster::from_vec(data, self.height, self.width)?;
        raster.set_transform(self.geotransform);
        if nodata.is_some() {
            raster.set_nodata(Some(T::default_nodata()));
        }
        Ok(raster)
    }
}

/// Something that can read a raster band from a path
pub trait RasterReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<RawRaster>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(buffer: RawBuffer, width: usize, height: usize) -> RawRaster {
        RawRaster {
            buffer,
            width,
            height,
            geotransform: GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            nodata: Some(0.0),
            projection: String::new(),
        }
    }

    #[test]
    fn test_validate_length() {
        assert!(raw(RawBuffer::Gray8(vec![0; 4]), 2, 2).validate().is_ok());
        assert!(raw(RawBuffer::Gray8(vec![0; 3]), 2, 2).validate().is_err());
        assert!(raw(RawBuffer::Gray8(vec![]), 0, 0).validate().is_err());
    }

    #[test]
    fn test_to_raster_maps_nodata() {
        let r: Raster<f64> = raw(RawBuffer::Gray16(vec![0, 10, 20, 30]), 2, 2)
            .to_raster()
            .unwrap();
        assert!(r.get(0, 0).unwrap().is_nan());
        assert_eq!(r.get(1, 1).unwrap(), 30.0);
        assert_eq!(r.transform().origin_y, 2.0);
    }
}
