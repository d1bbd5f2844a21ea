//! Slope and aspect from a 3x3 elevation neighbourhood
//!
//! Neighbourhood layout, row-major with `z5` at the centre and row 0 to the
//! north:
//!
//! ```text
//! z1 z2 z3
//! z4 z5 z6
//! z7 z8 z9
//! ```
//!
//! With cell size `L`:
//!
//! ```text
//! b = (z3 + 2*z6 + z9 - z1 - 2*z4 - z7) / (8*L)
//! c = (z1 + 2*z2 + z3 - z7 - 2*z8 - z9) / (8*L)
//! slope  = atan(sqrt(b² + c²))
//! aspect = 0                  if |c| < FLAT_EPSILON
//!        = atan(b/c) + π      if c > 0
//!        = atan(b/c) + 2π     if c < 0 and b > 0
//!        = atan(b/c)          otherwise
//! ```
//!
//! Cells without a complete neighbourhood (raster edge or a no-data
//! neighbour) are reported flat: slope 0, aspect 0.

use ndarray::Array2;
use std::f64::consts::PI;
use terraclass_core::raster::Raster;
use terraclass_core::{Algorithm, Error, RasterLayer, Result};
use terraclass_parallel::{ParallelStrategy, ProcessingMode};

/// `|c|` below this counts as flat for aspect
pub const FLAT_EPSILON: f64 = 1e-4;

/// Slope and aspect in radians. Aspect lies in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AspectSlope {
    pub slope: f64,
    pub aspect: f64,
}

impl AspectSlope {
    pub const FLAT: AspectSlope = AspectSlope { slope: 0.0, aspect: 0.0 };

    pub fn slope_degrees(&self) -> f64 {
        self.slope.to_degrees()
    }

    pub fn aspect_degrees(&self) -> f64 {
        self.aspect.to_degrees()
    }
}

/// Slope and aspect of a complete 3x3 neighbourhood
pub fn aspect_slope(z: &[f64; 9], cell_size: f64) -> AspectSlope {
    let [z1, z2, z3, z4, _, z6, z7, z8, z9] = *z;
    let eight_l = 8.0 * cell_size;
    let b = (z3 + 2.0 * z6 + z9 - z1 - 2.0 * z4 - z7) / eight_l;
    let c = (z1 + 2.0 * z2 + z3 - z7 - 2.0 * z8 - z9) / eight_l;

    let slope = (b * b + c * c).sqrt().atan();
    let aspect = if c.abs() < FLAT_EPSILON {
        0.0
    } else if c > 0.0 {
        (b / c).atan() + PI
    } else if b > 0.0 {
        // atan of a vanishing ratio rounds up to a full turn
        let a = (b / c).atan() + 2.0 * PI;
        if a >= 2.0 * PI { a - 2.0 * PI } else { a }
    } else {
        (b / c).atan()
    };

    AspectSlope { slope, aspect }
}

/// Neighbourhood of image pixel `(col, row)` in a layer, read with the strict
/// sampler. `None` when any cell is outside the layer or holds no data.
pub fn layer_window(layer: &RasterLayer, col: f64, row: f64, step: f64) -> Option<[f64; 9]> {
    let mut z = [0.0; 9];
    for (k, cell) in z.iter_mut().enumerate() {
        let dx = (k % 3) as f64 - 1.0;
        let dy = (k / 3) as f64 - 1.0;
        *cell = layer.sample_or_fail(col + dx * step, row + dy * step).ok()?;
    }
    Some(z)
}

/// Slope and aspect at image position `(col, row)` of an elevation layer,
/// flat when the neighbourhood is incomplete
pub fn layer_aspect_slope(layer: &RasterLayer, col: f64, row: f64) -> AspectSlope {
    match layer_window(layer, col.round(), row.round(), 1.0) {
        Some(z) => aspect_slope(&z, layer.scale_x()),
        None => AspectSlope::FLAT,
    }
}

/// Neighbourhood at `step` cells distance in a grid, `None` when incomplete
pub(crate) fn grid_window(dem: &Raster<f64>, row: usize, col: usize, step: usize) -> Option<[f64; 9]> {
    let mut z = [0.0; 9];
    let (row, col, step) = (row as isize, col as isize, step as isize);
    for (k, cell) in z.iter_mut().enumerate() {
        let dr = (k / 3) as isize - 1;
        let dc = (k % 3) as isize - 1;
        let v = dem.get_signed(row + dr * step, col + dc * step)?;
        if dem.is_nodata(v) {
            return None;
        }
        *cell = v;
    }
    Some(z)
}

/// Slope and aspect grids in radians
#[derive(Debug, Clone)]
pub struct SlopeAspectGrids {
    pub slope: Raster<f64>,
    pub aspect: Raster<f64>,
}

/// Parameters for the whole-DEM pass
#[derive(Debug, Clone, Default)]
pub struct SlopeAspectParams {
    /// Z-factor applied to the cell size (elevation units per map unit)
    pub z_factor: Option<f64>,
    pub mode: ProcessingMode,
}

/// Slope/aspect over a DEM grid
#[derive(Debug, Clone, Default)]
pub struct SlopeAspect;

impl Algorithm for SlopeAspect {
    type Input = Raster<f64>;
    type Output = SlopeAspectGrids;
    type Params = SlopeAspectParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SlopeAspect"
    }

    fn description(&self) -> &'static str {
        "Slope and aspect from a DEM using a 3x3 Sobel-weighted finite difference"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope_aspect_grid(&input, &params)
    }
}

/// Slope and aspect for every DEM cell, rows in parallel.
///
/// No-data centres stay NaN in both outputs; edge cells are flat.
pub fn slope_aspect_grid(dem: &Raster<f64>, params: &SlopeAspectParams) -> Result<SlopeAspectGrids> {
    let (rows, cols) = dem.shape();
    let cell_size = dem.cell_size() * params.z_factor.unwrap_or(1.0);
    if cell_size.is_nan() || cell_size <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: cell_size.to_string(),
            reason: "must be positive".into(),
        });
    }

    let row_results: Vec<Vec<AspectSlope>> = params.mode.par_map(0..rows, |row| {
        (0..cols)
            .map(|col| {
                let centre = dem.data()[(row, col)];
                if dem.is_nodata(centre) {
                    return AspectSlope { slope: f64::NAN, aspect: f64::NAN };
                }
                match grid_window(dem, row, col, 1) {
                    Some(z) => aspect_slope(&z, cell_size),
                    None => AspectSlope::FLAT,
                }
            })
            .collect()
    });

    let flat: Vec<AspectSlope> = row_results.into_iter().flatten().collect();
    let slope_data: Vec<f64> = flat.iter().map(|v| v.slope).collect();
    let aspect_data: Vec<f64> = flat.iter().map(|v| v.aspect).collect();

    let mut slope = dem.with_same_meta::<f64>(rows, cols);
    slope.set_nodata(Some(f64::NAN));
    *slope.data_mut() =
        Array2::from_shape_vec((rows, cols), slope_data).map_err(|e| Error::Other(e.to_string()))?;

    let mut aspect = dem.with_same_meta::<f64>(rows, cols);
    aspect.set_nodata(Some(f64::NAN));
    *aspect.data_mut() =
        Array2::from_shape_vec((rows, cols), aspect_data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(SlopeAspectGrids { slope, aspect })
}
