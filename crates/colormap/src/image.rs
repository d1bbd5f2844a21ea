//! Pixel buffers and the image-encoding collaborator

use std::path::Path;
use thiserror::Error;

/// Sample layout of an [`ImageBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Gray8,
    /// Native-endian 16-bit samples
    Gray16,
    Rgba8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Gray8 => 1,
            ImageFormat::Gray16 => 2,
            ImageFormat::Rgba8 => 4,
        }
    }
}

/// Errors raised while encoding an image
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid image buffer: {0}")]
    InvalidBuffer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding failed: {0}")]
    Encoding(#[from] ::image::ImageError),
}

impl From<EncodeError> for terraclass_core::Error {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Io(io) => terraclass_core::Error::Io(io),
            other => terraclass_core::Error::Other(other.to_string()),
        }
    }
}

/// Row-major pixel buffer with an explicit stride in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: usize,
    pub height: usize,
    pub format: ImageFormat,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    /// Zeroed, tightly packed buffer
    pub fn new(width: usize, height: usize, format: ImageFormat) -> Self {
        let stride = width * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            stride,
            data: vec![0; stride * height],
        }
    }

    pub fn from_gray16(width: usize, height: usize, samples: &[u16]) -> Self {
        let mut buf = Self::new(width, height, ImageFormat::Gray16);
        for (dst, v) in buf.data.chunks_exact_mut(2).zip(samples) {
            dst.copy_from_slice(&v.to_ne_bytes());
        }
        buf
    }

    /// Bytes of pixel `(x, y)`
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y * self.stride + x * bpp;
        self.data.get(start..start + bpp)
    }

    pub fn validate(&self) -> Result<(), EncodeError> {
        let row = self.width * self.format.bytes_per_pixel();
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::InvalidBuffer(format!(
                "empty image {}x{}",
                self.width, self.height
            )));
        }
        if self.stride < row {
            return Err(EncodeError::InvalidBuffer(format!(
                "stride {} shorter than a row of {} bytes",
                self.stride, row
            )));
        }
        if self.data.len() < self.stride * (self.height - 1) + row {
            return Err(EncodeError::InvalidBuffer(format!(
                "buffer of {} bytes too small for {}x{} with stride {}",
                self.data.len(),
                self.width,
                self.height,
                self.stride
            )));
        }
        Ok(())
    }

    /// Rows without stride padding
    fn packed(&self) -> Vec<u8> {
        let row = self.width * self.format.bytes_per_pixel();
        if row == self.stride {
            return self.data[..row * self.height].to_vec();
        }
        let mut out = Vec::with_capacity(row * self.height);
        for y in 0..self.height {
            let start = y * self.stride;
            out.extend_from_slice(&self.data[start..start + row]);
        }
        out
    }
}

/// Writes pixel buffers to files
pub trait ImageEncoder: Send + Sync {
    /// File extension of the produced images, without the dot
    fn extension(&self) -> &'static str;

    fn encode(&self, image: &ImageBuffer, path: &Path) -> Result<(), EncodeError>;
}

/// PNG writer backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, image: &ImageBuffer, path: &Path) -> Result<(), EncodeError> {
        image.validate()?;
        let (w, h) = (image.width as u32, image.height as u32);
        let packed = image.packed();
        let too_small = || EncodeError::InvalidBuffer("buffer does not match dimensions".into());
        match image.format {
            ImageFormat::Gray8 => {
                ::image::GrayImage::from_raw(w, h, packed).ok_or_else(too_small)?.save(path)?
            }
            ImageFormat::Rgba8 => {
                ::image::RgbaImage::from_raw(w, h, packed).ok_or_else(too_small)?.save(path)?
            }
            ImageFormat::Gray16 => {
                let samples: Vec<u16> = packed
                    .chunks_exact(2)
                    .map(|b| u16::from_ne_bytes([b[0], b[1]]))
                    .collect();
                ::image::ImageBuffer::<::image::Luma<u16>, _>::from_raw(w, h, samples)
                    .ok_or_else(too_small)?
                    .save(path)?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_buffer() {
        let mut buf = ImageBuffer::new(4, 3, ImageFormat::Rgba8);
        assert!(buf.validate().is_ok());
        buf.data.truncate(20);
        assert!(buf.validate().is_err());
        buf.stride = 3;
        assert!(buf.validate().is_err());
    }

    #[test]
    fn test_png_roundtrip_with_padded_stride() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");

        // 3x2 gray image, rows padded to 4 bytes
        let buf = ImageBuffer {
            width: 3,
            height: 2,
            format: ImageFormat::Gray8,
            stride: 4,
            data: vec![0, 255, 0, 9, 255, 0, 255, 9],
        };
        PngEncoder.encode(&buf, &path).unwrap();

        let decoded = ::image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.into_raw(), vec![0, 255, 0, 255, 0, 255]);
    }

    #[test]
    fn test_png_gray16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.png");
        let buf = ImageBuffer::from_gray16(2, 1, &[0, 65535]);
        PngEncoder.encode(&buf, &path).unwrap();

        let decoded = ::image::open(&path).unwrap().to_luma16();
        assert_eq!(decoded.into_raw(), vec![0, 65535]);
    }
}
