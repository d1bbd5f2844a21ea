//! I/O operations for reading and writing geospatial data

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;
mod source;

pub use source::{RasterReader, RawBuffer, RawRaster};

#[cfg(feature = "gdal")]
pub use gdal_io::{GdalReader, GeoTiffOptions, write_geotiff};

#[cfg(not(feature = "gdal"))]
pub use native::{GeoTiffOptions, write_geotiff};

// Native TIFF reading is always available, GDAL or not
pub use native::{TiffReader, read_raw, read_raw_from_buffer, write_geotiff_to_buffer};

/// The reader the current build prefers: GDAL when enabled, native TIFF
/// otherwise
pub fn default_reader() -> Box<dyn RasterReader> {
    #[cfg(feature = "gdal")]
    {
        Box::new(GdalReader)
    }
    #[cfg(not(feature = "gdal"))]
    {
        Box::new(TiffReader)
    }
}
