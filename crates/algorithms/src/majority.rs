//! Majority (mode) filter for classified grids
//!
//! Each interior pixel takes the most frequent label among its 8 neighbours;
//! the centre itself is not counted. Ties go to the lowest class index.
//! Border pixels, which lack a full neighbourhood, are copied unchanged.

use ndarray::Array2;
use terraclass_core::LandcoverType;
use terraclass_core::raster::{Neighborhood, Raster};
use terraclass_parallel::{ParallelStrategy, ProcessingMode};

/// Apply one pass of the majority filter to a grid of class indices.
///
/// Values outside `0..LandcoverType::COUNT` are counted as `None`.
pub fn majority_filter(labels: &Raster<u8>, mode: ProcessingMode) -> Raster<u8> {
    let (rows, cols) = labels.shape();
    if rows < 3 || cols < 3 {
        return labels.clone();
    }
    let window = Neighborhood::Queen3x3;
    let offsets = window.offsets_no_center();
    let data = labels.data();
    let none = LandcoverType::None.index();

    let filtered: Vec<Vec<u8>> = mode.par_map(0..rows, |row| {
        (0..cols)
            .map(|col| {
                if !window.fits(rows, cols, row, col) {
                    return data[(row, col)];
                }
                let mut counts = [0u8; LandcoverType::COUNT];
                for &(dr, dc) in &offsets {
                    let v = data[((row as isize + dr) as usize, (col as isize + dc) as usize)];
                    let class = if (v as usize) < LandcoverType::COUNT { v } else { none };
                    counts[class as usize] += 1;
                }
                mode_of(&counts)
            })
            .collect()
    });

    let mut result = labels.clone();
    let flat: Vec<u8> = filtered.into_iter().flatten().collect();
    if let Ok(array) = Array2::from_shape_vec((rows, cols), flat) {
        *result.data_mut() = array;
    }
    result
}

/// Most frequent class, lowest index on ties
fn mode_of(counts: &[u8; LandcoverType::COUNT]) -> u8 {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclass_core::GeoTransform;

    fn grid(values: &[&[u8]]) -> Raster<u8> {
        let rows = values.len();
        let cols = values[0].len();
        let flat: Vec<u8> = values.iter().flat_map(|r| r.iter().copied()).collect();
        let mut r = Raster::from_vec(flat, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_plurality_wins() {
        // centre Rock surrounded mostly by Water
        let g = grid(&[&[5, 5, 5], &[5, 2, 4], &[4, 5, 5]]);
        let out = majority_filter(&g, ProcessingMode::Sequential);
        assert_eq!(out.get(1, 1).unwrap(), 5);
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        // four Tree (4) and four Grass (0) neighbours
        let g = grid(&[&[4, 0, 4], &[0, 7, 0], &[4, 0, 4]]);
        for _ in 0..3 {
            let out = majority_filter(&g, ProcessingMode::Parallel);
            assert_eq!(out.get(1, 1).unwrap(), 0);
        }
    }

    #[test]
    fn test_centre_not_counted() {
        // three Snow neighbours beat the centre's own Water vote
        let g = grid(&[&[3, 3, 3], &[1, 5, 2], &[6, 7, 8]]);
        let out = majority_filter(&g, ProcessingMode::Sequential);
        assert_eq!(out.get(1, 1).unwrap(), 3);
    }

    #[test]
    fn test_borders_unchanged() {
        let g = grid(&[
            &[1, 2, 3, 4],
            &[5, 5, 5, 6],
            &[5, 5, 5, 7],
            &[8, 0, 1, 2],
        ]);
        let out = majority_filter(&g, ProcessingMode::Sequential);
        for col in 0..4 {
            assert_eq!(out.get(0, col).unwrap(), g.get(0, col).unwrap());
            assert_eq!(out.get(3, col).unwrap(), g.get(3, col).unwrap());
        }
        for row in 0..4 {
            assert_eq!(out.get(row, 0).unwrap(), g.get(row, 0).unwrap());
            assert_eq!(out.get(row, 3).unwrap(), g.get(row, 3).unwrap());
        }
        assert_eq!(out.get(1, 1).unwrap(), 5);
        assert_eq!(out.transform(), g.transform());
    }

    #[test]
    fn test_small_grid_passes_through() {
        let g = grid(&[&[1, 2], &[3, 4]]);
        let out = majority_filter(&g, ProcessingMode::Sequential);
        assert_eq!(out.data(), g.data());
    }
}
