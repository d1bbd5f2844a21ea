//! Terrain derivatives from elevation grids
//!
//! - Slope and aspect (3x3 Sobel-weighted differences), per pixel of an
//!   elevation layer or over a whole DEM grid
//! - Curvature at power-of-two decimation levels

mod curvature;
mod derivatives;

pub use curvature::{CurvatureParams, MultiscaleCurvature, curvature, multiscale_curvature};
pub use derivatives::{
    AspectSlope, FLAT_EPSILON, SlopeAspect, SlopeAspectGrids, SlopeAspectParams, aspect_slope,
    layer_aspect_slope, layer_window, slope_aspect_grid,
};
