//! # terraclass core
//!
//! Core types, traits and I/O for land-cover classification.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `GeoTransform` / `AffineTransform`: georeferencing and the
//!   screen ↔ world ↔ band-pixel transform stack
//! - `RasterLayer` / `LayerStack`: loaded bands with contrast statistics
//! - `LandcoverType`: the class set and its canonical colours
//! - I/O through the `RasterReader` collaborator (native TIFF, GDAL optional)

pub mod crs;
pub mod error;
pub mod io;
pub mod landcover;
pub mod layer;
pub mod raster;
pub mod transform;

pub use crs::CRS;
pub use error::{Error, Result};
pub use landcover::LandcoverType;
pub use layer::{
    CutoffParams, IntensityScaling, LayerId, LayerSource, LayerStack, LayerStatistics,
    PixelFormat, RasterLayer,
};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use transform::{AffineTransform, Extent, Viewport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::landcover::LandcoverType;
    pub use crate::layer::{IntensityScaling, LayerId, LayerStack, RasterLayer};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::transform::{AffineTransform, Extent};
    pub use crate::Algorithm;
}

/// A whole-grid computation with a parameter struct.
///
/// Terrain passes implement it so drivers can run them uniformly; the free
/// functions they wrap remain the primary API.
pub trait Algorithm {
    type Input;
    type Output;
    type Params: Default;
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    /// One-line summary for listings
    fn description(&self) -> &'static str;

    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
