//! Affine transforms between screen, world and band-pixel space
//!
//! All transforms use the column-vector convention:
//!
//! ```text
//! | x' |   | a  b  c |   | x |
//! | y' | = | d  e  f | · | y |
//! | 1  |   | 0  0  1 |   | 1 |
//! ```
//!
//! Composition reads left to right: `a.then(&b)` applies `a` first, then `b`,
//! and is the matrix product `B · A`. Raw matrices are never built at call
//! sites; use the named constructors and [`AffineTransform::then`].

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Determinants smaller than this are treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-9;

/// A 2D affine transform stored as a homogeneous 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    m: [[f64; 3]; 3],
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    fn from_rows(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self {
            m: [[a, b, c], [d, e, f], [0.0, 0.0, 1.0]],
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_rows(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::from_rows(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// Counter-clockwise rotation about the origin
    pub fn rotation(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_rows(c, -s, 0.0, s, c, 0.0)
    }

    /// Pixel-corner → world transform described by a GDAL geotransform.
    ///
    /// Pixel `(col, row)` here addresses the upper-left corner of the cell.
    pub fn from_geotransform(gt: &GeoTransform) -> Self {
        Self::from_rows(
            gt.pixel_width,
            gt.row_rotation,
            gt.origin_x,
            gt.col_rotation,
            gt.pixel_height,
            gt.origin_y,
        )
    }

    /// Apply `self`, then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        let a = &next.m;
        let b = &self.m;
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        AffineTransform { m: out }
    }

    /// Transform a point.
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let m = &self.m;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Transform a direction (translation ignored).
    pub fn apply_vector(&self, (dx, dy): (f64, f64)) -> (f64, f64) {
        let m = &self.m;
        (m[0][0] * dx + m[0][1] * dy, m[1][0] * dx + m[1][1] * dy)
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// Inverse transform.
    ///
    /// Fails with [`Error::SingularMatrix`] when `|det| < 1e-9`; there is no
    /// identity fallback.
    pub fn invert(&self) -> Result<AffineTransform> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPSILON || !det.is_finite() {
            return Err(Error::SingularMatrix { det });
        }
        let [[a, b, c], [d, e, f], _] = self.m;
        let ia = e / det;
        let ib = -b / det;
        let id = -d / det;
        let ie = a / det;
        Ok(Self::from_rows(
            ia,
            ib,
            -(ia * c + ib * f),
            id,
            ie,
            -(id * c + ie * f),
        ))
    }

    /// Length of the transformed x unit vector
    pub fn scale_x(&self) -> f64 {
        self.m[0][0].hypot(self.m[1][0])
    }

    /// Length of the transformed y unit vector
    pub fn scale_y(&self) -> f64 {
        self.m[0][1].hypot(self.m[1][1])
    }

    /// Element-wise comparison within `epsilon`
    pub fn approx_eq(&self, other: &AffineTransform, epsilon: f64) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    /// Axis-aligned extent of a transformed rectangle `[x0, x1] × [y0, y1]`
    pub fn map_rect(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Extent {
        Extent::from_points(&[
            self.apply((x0, y0)),
            self.apply((x1, y0)),
            self.apply((x0, y1)),
            self.apply((x1, y1)),
        ])
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Smallest extent containing every point
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut e = Extent::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            e.min_x = e.min_x.min(x);
            e.min_y = e.min_y.min(y);
            e.max_x = e.max_x.max(x);
            e.max_y = e.max_y.max(y);
        }
        e
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the extent has no positive area
    pub fn is_empty(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }

    pub fn contains(&self, (x, y): (f64, f64)) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Intersection, or `None` when the extents do not overlap with positive area
    pub fn intersect(&self, other: &Extent) -> Option<Extent> {
        let e = Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        if e.is_empty() { None } else { Some(e) }
    }

    /// Upper-left corner (min x, max y)
    pub fn upper_left(&self) -> (f64, f64) {
        (self.min_x, self.max_y)
    }

    /// Bottom-right corner (max x, min y)
    pub fn bottom_right(&self) -> (f64, f64) {
        (self.max_x, self.min_y)
    }
}

/// Screen ↔ world mapping of a view onto the shared world frame.
///
/// Only `screen_to_world` is stored; the inverse is derived on demand so the
/// two directions can never diverge.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    screen_to_world: AffineTransform,
}

impl Viewport {
    pub fn new(screen_to_world: AffineTransform) -> Result<Self> {
        screen_to_world.invert()?;
        Ok(Self { screen_to_world })
    }

    /// View showing `extent` in a `width` x `height` pixel window, north up.
    pub fn fit(extent: &Extent, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 || extent.is_empty() {
            return Err(Error::InvalidDimensions { width, height });
        }
        let per_px = (extent.width() / width as f64).max(extent.height() / height as f64);
        let t = AffineTransform::scale(per_px, -per_px)
            .then(&AffineTransform::translation(extent.min_x, extent.max_y));
        Self::new(t)
    }

    pub fn screen_to_world(&self) -> &AffineTransform {
        &self.screen_to_world
    }

    pub fn world_to_screen(&self) -> Result<AffineTransform> {
        self.screen_to_world.invert()
    }

    /// Shift the view by a screen-space delta
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.screen_to_world =
            AffineTransform::translation(-dx, -dy).then(&self.screen_to_world);
    }

    /// Zoom by `factor` (> 1 zooms in), keeping the world point under
    /// `anchor` fixed on screen.
    pub fn zoom_at(&mut self, anchor: (f64, f64), factor: f64) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidParameter {
                name: "factor",
                value: factor.to_string(),
                reason: "zoom factor must be positive".into(),
            });
        }
        let around = AffineTransform::translation(-anchor.0, -anchor.1)
            .then(&AffineTransform::scale(1.0 / factor, 1.0 / factor))
            .then(&AffineTransform::translation(anchor.0, anchor.1));
        let next = around.then(&self.screen_to_world);
        next.invert()?;
        self.screen_to_world = next;
        Ok(())
    }

    /// Map a screen point into the pixel space of a layer given that layer's
    /// world → image transform.
    pub fn screen_to_layer_pixel(
        &self,
        screen: (f64, f64),
        world_to_image: &AffineTransform,
    ) -> (f64, f64) {
        self.screen_to_world.then(world_to_image).apply(screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_transform() -> AffineTransform {
        AffineTransform::scale(2.5, -0.75)
            .then(&AffineTransform::rotation(0.3))
            .then(&AffineTransform::translation(1000.0, -42.0))
    }

    #[test]
    fn test_double_inverse() {
        let m = sample_transform();
        let back = m.invert().unwrap().invert().unwrap();
        assert!(m.approx_eq(&back, 1e-9));
    }

    #[test]
    fn test_point_roundtrip() {
        let m = sample_transform();
        let inv = m.invert().unwrap();
        for p in [(0.0, 0.0), (12.5, -3.0), (1e4, 7e3)] {
            let (x, y) = inv.apply(m.apply(p));
            assert_relative_eq!(x, p.0, epsilon = 1e-6);
            assert_relative_eq!(y, p.1, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_then_order() {
        // scale first, then translate
        let t = AffineTransform::scale(2.0, 2.0).then(&AffineTransform::translation(1.0, 0.0));
        assert_eq!(t.apply((1.0, 1.0)), (3.0, 2.0));
        // translate first, then scale
        let t = AffineTransform::translation(1.0, 0.0).then(&AffineTransform::scale(2.0, 2.0));
        assert_eq!(t.apply((1.0, 1.0)), (4.0, 2.0));
    }

    #[test]
    fn test_singular() {
        let flat = AffineTransform::scale(1.0, 0.0);
        assert!(matches!(flat.invert(), Err(Error::SingularMatrix { .. })));
        let tiny = AffineTransform::scale(1e-5, 1e-5);
        assert!(tiny.invert().is_err());
    }

    #[test]
    fn test_from_geotransform() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let t = AffineTransform::from_geotransform(&gt);
        assert_eq!(t.apply((0.0, 0.0)), (100.0, 200.0));
        assert_eq!(t.apply((2.0, 3.0)), (120.0, 170.0));
        assert_relative_eq!(t.scale_x(), 10.0);
        assert_relative_eq!(t.scale_y(), 10.0);
    }

    #[test]
    fn test_extent_intersection() {
        let a = Extent::new(0.0, 0.0, 10.0, 10.0);
        let b = Extent::new(5.0, -5.0, 15.0, 5.0);
        assert_eq!(a.intersect(&b), Some(Extent::new(5.0, 0.0, 10.0, 5.0)));
        let c = Extent::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_viewport_pan_zoom() {
        let mut view = Viewport::fit(&Extent::new(0.0, 0.0, 100.0, 100.0), 100, 100).unwrap();
        assert_eq!(view.screen_to_world().apply((0.0, 0.0)), (0.0, 100.0));

        view.pan(10.0, 0.0);
        let (x, _) = view.screen_to_world().apply((10.0, 0.0));
        assert_relative_eq!(x, 0.0, epsilon = 1e-9);

        let anchor = (50.0, 50.0);
        let before = view.screen_to_world().apply(anchor);
        view.zoom_at(anchor, 2.0).unwrap();
        let after = view.screen_to_world().apply(anchor);
        assert_relative_eq!(before.0, after.0, epsilon = 1e-9);
        assert_relative_eq!(before.1, after.1, epsilon = 1e-9);

        let w2s = view.world_to_screen().unwrap();
        let (sx, sy) = w2s.apply(before);
        assert_relative_eq!(sx, 50.0, epsilon = 1e-9);
        assert_relative_eq!(sy, 50.0, epsilon = 1e-9);
    }
}
