//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate for basic TIFF I/O: pixel data, the
//! ModelPixelScale/ModelTiepoint georeferencing pair, the GDAL no-data tag
//! and the EPSG code from the GeoKey directory. For anything beyond that,
//! enable the `gdal` feature.

use crate::error::{Error, Result};
use crate::io::source::{RasterReader, RawBuffer, RawRaster};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;
use tracing::{debug, warn};

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// EPSG code recorded in the GeoKey directory
    pub epsg: Option<u32>,
}

/// Reader backed by the `tiff` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffReader;

impl RasterReader for TiffReader {
    fn read(&self, path: &Path) -> Result<RawRaster> {
        read_raw(path)
    }
}

/// Read the first band of a GeoTIFF file
pub fn read_raw<P: AsRef<Path>>(path: P) -> Result<RawRaster> {
    let file = File::open(path.as_ref())?;
    let raw = decode_raw(file)?;
    debug!(
        path = %path.as_ref().display(),
        format = raw.buffer.format_name(),
        width = raw.width,
        height = raw.height,
        "read raster"
    );
    Ok(raw)
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_raw_from_buffer(data: &[u8]) -> Result<RawRaster> {
    decode_raw(Cursor::new(data))
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_raw<R>(reader: R) -> Result<RawRaster>
where
    R: std::io::Read + std::io::Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    // 8/16-bit unsigned and 32-bit float stay native; every other sample type
    // widens to float, which is what elevation grids usually need
    let buffer = match result {
        DecodingResult::U8(buf) => RawBuffer::Gray8(buf),
        DecodingResult::U16(buf) => RawBuffer::Gray16(buf),
        DecodingResult::F32(buf) => RawBuffer::Gray32Float(buf),
        DecodingResult::F64(buf) => RawBuffer::Gray32Float(buf.iter().map(|&v| v as f32).collect()),
        DecodingResult::I8(buf) => RawBuffer::Gray32Float(buf.iter().map(|&v| v as f32).collect()),
        DecodingResult::I16(buf) => RawBuffer::Gray32Float(buf.iter().map(|&v| v as f32).collect()),
        DecodingResult::I32(buf) => RawBuffer::Gray32Float(buf.iter().map(|&v| v as f32).collect()),
        DecodingResult::U32(buf) => RawBuffer::Gray32Float(buf.iter().map(|&v| v as f32).collect()),
        _ => {
            return Err(Error::UnsupportedFormat(
                "unsupported TIFF sample type".to_string(),
            ));
        }
    };

    let geotransform = match read_geotransform(&mut decoder) {
        Ok(gt) => gt,
        Err(e) => {
            warn!("{}; placing the raster at the origin with unit pixels", e);
            GeoTransform::default()
        }
    };
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    let projection = read_epsg(&mut decoder)
        .map(|code| format!("EPSG:{}", code))
        .unwrap_or_default();

    let raw = RawRaster {
        buffer,
        width: width as usize,
        height: height as usize,
        geotransform,
        nodata,
        projection,
    };
    raw.validate()?;
    Ok(raw)
}

/// Attempt to read GeoTransform from TIFF tags
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("no ModelPixelScale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("no ModelTiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("incomplete georeferencing tags".into()))
}

/// EPSG code of the projected or geographic CRS, when stored inline
fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    let entries = keys.get(4..)?;
    let mut geographic = None;
    for entry in entries.chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == USER_DEFINED {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_KEY => return Some(value as u32),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value as u32),
            _ => {}
        }
    }
    geographic
}

/// Write a Raster to a GeoTIFF file
///
/// Writes as 32-bit float. For other sample types, enable the `gdal` feature.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    // GTModelTypeGeoKey=1 (Projected), GTRasterTypeGeoKey=1 (PixelIsArea),
    // plus ProjectedCSTypeGeoKey when an EPSG code is known
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    if let Some(epsg) = options.epsg.and_then(|c| u16::try_from(c).ok()) {
        geokeys[3] = 3;
        geokeys.extend_from_slice(&[PROJECTED_CS_TYPE_KEY, 0, 1, epsg]);
    }
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if raster.nodata().is_some() || T::is_float() {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, "nan")
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}
