//! GeoTIFF reading and writing using GDAL

use crate::error::{Error, Result};
use crate::io::source::{RasterReader, RawBuffer, RawRaster};
use crate::raster::{GeoTransform, Raster, RasterElement};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::Path;
use tracing::{debug, warn};

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// EPSG code assigned to the output
    pub epsg: Option<u32>,
    /// Compression type: "DEFLATE", "LZW", "ZSTD", "NONE"
    pub compression: String,
    /// Tile size for tiled TIFFs (0 for strips)
    pub tile_size: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            epsg: None,
            compression: "DEFLATE".to_string(),
            tile_size: 256,
        }
    }
}

/// Reader that opens anything GDAL can open
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalReader;

impl RasterReader for GdalReader {
    fn read(&self, path: &Path) -> Result<RawRaster> {
        read_raw(path)
    }
}

/// Read band 1 of a GDAL dataset in its native sample format
pub fn read_raw<P: AsRef<Path>>(path: P) -> Result<RawRaster> {
    let dataset = Dataset::open(path.as_ref())?;
    let band = dataset.rasterband(1)?;
    let (cols, rows) = dataset.raster_size();
    let window = ((0, 0), (cols, rows), (cols, rows));

    let buffer = match band.band_type() {
        GdalDataType::UInt8 => {
            let b = band.read_as::<u8>(window.0, window.1, window.2, None)?;
            RawBuffer::Gray8(b.data().to_vec())
        }
        GdalDataType::UInt16 => {
            let b = band.read_as::<u16>(window.0, window.1, window.2, None)?;
            RawBuffer::Gray16(b.data().to_vec())
        }
        _ => {
            let b = band.read_as::<f32>(window.0, window.1, window.2, None)?;
            RawBuffer::Gray32Float(b.data().to_vec())
        }
    };

    let geotransform = match dataset.geo_transform() {
        Ok(c) => GeoTransform::from_gdal(c),
        Err(e) => {
            warn!(path = %path.as_ref().display(), "no geotransform ({}); placing the raster at the origin with unit pixels", e);
            GeoTransform::default()
        }
    };

    let projection = match dataset.spatial_ref() {
        Ok(srs) => match srs.auth_code() {
            Ok(code) => format!("EPSG:{}", code),
            Err(_) => dataset.projection(),
        },
        Err(_) => dataset.projection(),
    };

    let raw = RawRaster {
        buffer,
        width: cols,
        height: rows,
        geotransform,
        nodata: band.no_data_value(),
        projection,
    };
    raw.validate()?;
    debug!(path = %path.as_ref().display(), format = raw.buffer.format_name(), "read raster via GDAL");
    Ok(raw)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    let opts = options.unwrap_or_default();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let (rows, cols) = raster.shape();

    let mut create_options = CslStringList::new();
    create_options.set_name_value("COMPRESS", &opts.compression)?;
    if opts.tile_size > 0 {
        create_options.set_name_value("TILED", "YES")?;
        create_options.set_name_value("BLOCKXSIZE", &opts.tile_size.to_string())?;
        create_options.set_name_value("BLOCKYSIZE", &opts.tile_size.to_string())?;
    }

    let mut dataset =
        driver.create_with_band_type_with_options::<T, _>(path.as_ref(), cols, rows, 1, &create_options)?;

    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(epsg) = opts.epsg {
        let srs = SpatialRef::from_epsg(epsg)?;
        dataset.set_spatial_ref(&srs)?;
    }

    let mut band = dataset.rasterband(1)?;

    if let Some(nodata) = raster.nodata() {
        let nd = nodata
            .to_f64()
            .ok_or_else(|| Error::Other("no-data value not representable".into()))?;
        band.set_no_data_value(Some(nd))?;
    }

    let data: Vec<T> = raster.data().iter().copied().collect();
    let mut buffer = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &mut buffer)?;

    Ok(())
}
