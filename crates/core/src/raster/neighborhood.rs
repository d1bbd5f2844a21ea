//! Square windows around a cell

/// Window shape used by the smoothing and majority passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// The 8 neighbours of a cell plus the cell itself
    Queen3x3,
    /// `(2r+1)²` cells centred on the cell
    Square(usize),
}

impl Neighborhood {
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 => 1,
            Neighborhood::Square(r) => *r,
        }
    }

    /// Window edge length in cells
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// `(d_row, d_col)` offsets in row-major order, centre included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        (-r..=r).flat_map(|dr| (-r..=r).map(move |dc| (dr, dc))).collect()
    }

    pub fn offsets_no_center(&self) -> Vec<(isize, isize)> {
        self.offsets()
            .into_iter()
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .collect()
    }

    /// Whether the whole window around `(row, col)` lies inside a
    /// `rows x cols` grid
    pub fn fits(&self, rows: usize, cols: usize, row: usize, col: usize) -> bool {
        let r = self.radius();
        row >= r && col >= r && row + r < rows && col + r < cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        assert_eq!(Neighborhood::Queen3x3.offsets().len(), 9);
        assert_eq!(Neighborhood::Queen3x3.offsets_no_center().len(), 8);
        assert_eq!(Neighborhood::Square(0).offsets(), vec![(0, 0)]);
        let five = Neighborhood::Square(2).offsets();
        assert_eq!(five.len(), 25);
        assert_eq!(five[0], (-2, -2));
        assert_eq!(five[24], (2, 2));
    }

    #[test]
    fn test_fits() {
        let n = Neighborhood::Queen3x3;
        assert!(!n.fits(3, 3, 0, 1));
        assert!(n.fits(3, 3, 1, 1));
        assert!(!n.fits(3, 3, 2, 1));
        assert!(Neighborhood::Square(0).fits(1, 1, 0, 0));
    }
}
