//! Label grids and bands to display buffers

use crate::image::{ImageBuffer, ImageFormat};
use terraclass_core::error::{Error, Result};
use terraclass_core::layer::{IntensityScaling, LayerPixels, RasterLayer};
use terraclass_core::{LandcoverType, Raster};

/// Render a label grid with the canonical land-cover colours.
///
/// Classified pixels are opaque; `None` and indices outside the class table
/// are fully transparent.
pub fn classes_to_rgba(labels: &Raster<u8>) -> ImageBuffer {
    let (rows, cols) = labels.shape();
    let mut image = ImageBuffer::new(cols, rows, ImageFormat::Rgba8);
    for (dst, &index) in image.data.chunks_exact_mut(4).zip(labels.data().iter()) {
        let class = LandcoverType::from_index(index).unwrap_or(LandcoverType::None);
        dst.copy_from_slice(&class.rgba());
    }
    image
}

/// 8-bit grayscale preview of a band.
///
/// Gray16 and float layers go through [`RasterLayer::scaled_to_byte`];
/// Gray8 layers are shown as stored. No-data cells render black.
pub fn band_to_gray(layer: &RasterLayer, scaling: IntensityScaling) -> Result<ImageBuffer> {
    let (width, height) = (layer.width(), layer.height());
    let mut image = ImageBuffer::new(width, height, ImageFormat::Gray8);
    if let LayerPixels::Gray8(raster) = layer.pixels() {
        for (dst, &v) in image.data.iter_mut().zip(raster.data().iter()) {
            *dst = v;
        }
        return Ok(image);
    }
    for row in 0..height {
        for col in 0..width {
            let value = match layer.scaled_to_byte(col as f64, row as f64, scaling) {
                Ok(v) => v,
                Err(e) if e.is_recoverable_per_pixel() => 0,
                Err(e) => return Err(e),
            };
            image.data[row * width + col] = value;
        }
    }
    Ok(image)
}

/// Binary mask (0 / 255) as a Gray8 image
pub fn mask_to_gray(mask: &Raster<u8>) -> ImageBuffer {
    let (rows, cols) = mask.shape();
    let mut image = ImageBuffer::new(cols, rows, ImageFormat::Gray8);
    for (dst, &v) in image.data.iter_mut().zip(mask.data().iter()) {
        *dst = v;
    }
    image
}

/// 16-bit heights as a Gray16 image
pub fn heights_to_gray16(heights: &Raster<u16>) -> Result<ImageBuffer> {
    let (rows, cols) = heights.shape();
    let samples = heights
        .data()
        .as_slice()
        .ok_or_else(|| Error::Other("heightmap grid is not contiguous".into()))?;
    Ok(ImageBuffer::from_gray16(cols, rows, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclass_core::io::{RawBuffer, RawRaster};
    use terraclass_core::layer::CutoffParams;
    use terraclass_core::GeoTransform;

    #[test]
    fn test_all_water_renders_water_colour() {
        let labels = Raster::filled(3, 4, LandcoverType::Water.index());
        let image = classes_to_rgba(&labels);
        assert_eq!((image.width, image.height), (4, 3));
        for px in image.data.chunks_exact(4) {
            assert_eq!(px, [0, 0, 255, 255]);
        }
    }

    #[test]
    fn test_unclassified_is_transparent() {
        let mut labels = Raster::filled(1, 3, LandcoverType::Snow.index());
        labels.set(0, 1, LandcoverType::None.index()).unwrap();
        labels.set(0, 2, 200).unwrap();
        let image = classes_to_rgba(&labels);
        assert_eq!(image.pixel(0, 0), Some(&[255, 250, 250, 255][..]));
        assert_eq!(image.pixel(1, 0).map(|p| p[3]), Some(0));
        assert_eq!(image.pixel(2, 0).map(|p| p[3]), Some(0));
    }

    #[test]
    fn test_band_to_gray_float_layer() {
        let raw = RawRaster {
            buffer: RawBuffer::Gray32Float(vec![0.0, 5.0, 10.0, f32::NAN]),
            width: 2,
            height: 2,
            geotransform: GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            nodata: None,
            projection: String::new(),
        };
        let layer = RasterLayer::from_raw("b1".into(), raw, &CutoffParams::default()).unwrap();
        let image = band_to_gray(&layer, IntensityScaling::Raw).unwrap();
        assert_eq!(image.data[0], 0);
        assert_eq!(image.data[2], 255);
        assert_eq!(image.data[3], 0);
    }

    #[test]
    fn test_heights_to_gray16() {
        let heights = Raster::from_vec(vec![1u16, 2, 3, 65535], 2, 2).unwrap();
        let image = heights_to_gray16(&heights).unwrap();
        assert_eq!(image.format, ImageFormat::Gray16);
        assert_eq!(image.pixel(1, 1), Some(&65535u16.to_ne_bytes()[..]));
    }
}
