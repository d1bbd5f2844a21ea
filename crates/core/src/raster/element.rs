//! Sample types a [`Raster`](super::Raster) can hold

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// A grid cell value.
///
/// Implemented for the band sample types (`u8`, `u16`, `f32`), the label
/// type (`u8`) and the float types of derived grids. Integer types carry
/// no-data as an explicit sentinel; float types also treat NaN as no-data.
pub trait RasterElement:
    Copy + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Sentinel written for missing cells: the type's minimum for integers,
    /// NaN for floats
    fn default_nodata() -> Self;

    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn is_float() -> bool;

    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Rounded and clamped to the type's range; NaN becomes
    /// [`Self::default_nodata`]
    fn from_f64_saturating(v: f64) -> Self;
}

macro_rules! integer_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }

            fn is_float() -> bool {
                false
            }

            fn from_f64_saturating(v: f64) -> Self {
                if v.is_nan() {
                    Self::default_nodata()
                } else {
                    v.round() as $t
                }
            }
        }
    )*};
}

macro_rules! float_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan() || nodata.is_some_and(|nd| (self - nd).abs() < <$t>::EPSILON * 100.0)
            }

            fn is_float() -> bool {
                true
            }

            fn from_f64_saturating(v: f64) -> Self {
                v as $t
            }
        }
    )*};
}

integer_element!(u8, u16, i16, i32);
float_element!(f32, f64);
