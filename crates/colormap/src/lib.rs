//! # terraclass colormap
//!
//! Rendering of label grids and bands into display buffers, and the
//! image-encoding collaborator used by the export pipeline.
//!
//! - [`classes_to_rgba`]: label grid → canonical land-cover colours
//! - [`band_to_gray`]: one band → 8-bit grayscale preview
//! - [`ImageEncoder`] / [`PngEncoder`]: `(width, height, format, buffer, stride)` → file

pub mod image;
pub mod render;

pub use crate::image::{EncodeError, ImageBuffer, ImageEncoder, ImageFormat, PngEncoder};
pub use render::{band_to_gray, classes_to_rgba, heights_to_gray16, mask_to_gray};
