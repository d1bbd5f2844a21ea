//! Surface curvature at several decimation levels
//!
//! ```text
//! z1 z2 z3
//! z4 z5 z6
//! z7 z8 z9
//! ```
//!
//! `curvature = 2*((z4 + z6)/2 - z5)/L² + 2*((z2 + z8)/2 - z5)/L²`
//!
//! Level `k` reads the neighbours `2^k` cells away, so `L` becomes
//! `cell_size * 2^k`. Positive values are concave (bowls), negative convex.

use super::derivatives::grid_window;
use ndarray::Array2;
use terraclass_core::raster::Raster;
use terraclass_core::{Algorithm, Error, Result};
use terraclass_parallel::{ParallelStrategy, ProcessingMode};
use tracing::debug;

/// Curvature of a complete 3x3 neighbourhood with spacing `l`
pub fn curvature(z: &[f64; 9], l: f64) -> f64 {
    let l2 = l * l;
    2.0 * ((z[3] + z[5]) / 2.0 - z[4]) / l2 + 2.0 * ((z[1] + z[7]) / 2.0 - z[4]) / l2
}

/// Parameters for multiscale curvature
#[derive(Debug, Clone)]
pub struct CurvatureParams {
    /// Number of levels; level `k` uses a step of `2^k` cells
    pub levels: usize,
    pub mode: ProcessingMode,
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self {
            levels: 3,
            mode: ProcessingMode::default(),
        }
    }
}

/// Multiscale curvature algorithm
#[derive(Debug, Clone, Default)]
pub struct MultiscaleCurvature;

impl Algorithm for MultiscaleCurvature {
    type Input = Raster<f64>;
    type Output = Vec<Raster<f64>>;
    type Params = CurvatureParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MultiscaleCurvature"
    }

    fn description(&self) -> &'static str {
        "Laplacian-style surface curvature at power-of-two neighbour spacings"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        multiscale_curvature(&input, &params)
    }
}

/// One curvature grid per level, each the size of the DEM.
///
/// No-data centres stay NaN; cells whose neighbours at that level fall off
/// the grid or hold no data are flat (0).
pub fn multiscale_curvature(dem: &Raster<f64>, params: &CurvatureParams) -> Result<Vec<Raster<f64>>> {
    if params.levels == 0 || params.levels > 16 {
        return Err(Error::InvalidParameter {
            name: "levels",
            value: params.levels.to_string(),
            reason: "must be between 1 and 16".into(),
        });
    }
    (0..params.levels)
        .map(|level| curvature_level(dem, level, params.mode))
        .collect()
}

fn curvature_level(dem: &Raster<f64>, level: usize, mode: ProcessingMode) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let step = 1usize << level;
    let l = dem.cell_size() * step as f64;

    let output_data: Vec<f64> = mode
        .par_map(0..rows, |row| {
            (0..cols)
                .map(|col| {
                    if dem.is_nodata(dem.data()[(row, col)]) {
                        return f64::NAN;
                    }
                    grid_window(dem, row, col, step).map_or(0.0, |z| curvature(&z, l))
                })
                .collect::<Vec<f64>>()
        })
        .into_iter()
        .flatten()
        .collect();

    let mut output = dem.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    debug!(level, step, "curvature level computed");
    Ok(output)
}
