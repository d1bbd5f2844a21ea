//! Binary class masks and nearest-neighbour resampling

use crate::prediction::ProbabilityGrid;
use terraclass_core::raster::{Raster, RasterElement};
use terraclass_core::{Error, LandcoverType, Result};

/// Mask value for selected pixels
pub const MASK_SET: u8 = 255;

/// 255 where the label is one of `classes`, 0 elsewhere
pub fn class_mask(labels: &Raster<u8>, classes: &[LandcoverType]) -> Raster<u8> {
    let mut selected = [false; LandcoverType::COUNT];
    for class in classes {
        selected[class.index() as usize] = true;
    }
    let mut mask = labels.clone();
    mask.set_nodata(None);
    mask.data_mut().mapv_inplace(|v| {
        if selected.get(v as usize).copied().unwrap_or(false) { MASK_SET } else { 0 }
    });
    mask
}

/// [`class_mask`], additionally setting pixels whose summed probability of
/// `classes` reaches `threshold`
pub fn probability_mask(
    labels: &Raster<u8>,
    probabilities: &ProbabilityGrid,
    classes: &[LandcoverType],
    threshold: f32,
) -> Result<Raster<u8>> {
    if probabilities.rows() != labels.rows() || probabilities.cols() != labels.cols() {
        return Err(Error::InvalidDimensions {
            width: probabilities.cols(),
            height: probabilities.rows(),
        });
    }
    let mut mask = class_mask(labels, classes);
    let cumulative = probabilities.cumulative(classes);
    for (m, &p) in mask.data_mut().iter_mut().zip(cumulative.iter()) {
        if p >= threshold {
            *m = MASK_SET;
        }
    }
    Ok(mask)
}

/// Nearest-neighbour resample of `src` to `cols x rows` over the same footprint
pub fn resample_nearest<T: RasterElement>(src: &Raster<T>, cols: usize, rows: usize) -> Raster<T> {
    let (src_rows, src_cols) = src.shape();
    if (rows, cols) == (src_rows, src_cols) {
        return src.clone();
    }
    let mut out = src.with_same_meta::<T>(rows, cols);
    out.set_transform(src.transform().resampled(src_cols, src_rows, cols, rows));
    out.set_nodata(src.nodata());
    if src_rows == 0 || src_cols == 0 {
        return out;
    }
    let pick = |i: usize, dst: usize, n: usize| (((i as f64 + 0.5) * n as f64 / dst as f64) as usize).min(n - 1);
    let data = src.data();
    for ((r, c), v) in out.data_mut().indexed_iter_mut() {
        *v = data[(pick(r, rows, src_rows), pick(c, cols, src_cols))];
    }
    out
}
