//! Landscape size quantization
//!
//! Terrain editors built on component tiling accept heightmaps whose side is
//! `components * quads_per_section * sections_per_component + 1`, with at most
//! 32 components per axis. [`quantize`] picks such a size for a raw grid:
//!
//! 1. Exact fit: the largest section size, then the largest section count,
//!    whose component size evenly divides `width - 1` and `height - 1`
//!    within the component limit.
//! 2. Ceiling fit: the smallest section size not below the configured one
//!    for which the rounded-up component counts stay within the limit.
//! 3. Otherwise the largest section size and count, with component counts
//!    capped at the limit.

use serde::{Deserialize, Serialize};
use terraclass_core::{Error, Result};

/// Quads per section accepted by the target tool
pub const SECTION_SIZES: [usize; 6] = [7, 15, 31, 63, 127, 255];

/// Sections per component accepted by the target tool
pub const SECTION_COUNTS: [usize; 2] = [1, 2];

/// Starting point for the ceiling fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeParams {
    pub section_size: usize,
    pub sections_per_component: usize,
    pub max_components: usize,
}

impl Default for QuantizeParams {
    fn default() -> Self {
        Self {
            section_size: 63,
            sections_per_component: 1,
            max_components: 32,
        }
    }
}

impl QuantizeParams {
    fn validate(&self) -> Result<()> {
        if !SECTION_SIZES.contains(&self.section_size) {
            return Err(Error::InvalidParameter {
                name: "section_size",
                value: self.section_size.to_string(),
                reason: format!("must be one of {:?}", SECTION_SIZES),
            });
        }
        if !SECTION_COUNTS.contains(&self.sections_per_component) {
            return Err(Error::InvalidParameter {
                name: "sections_per_component",
                value: self.sections_per_component.to_string(),
                reason: format!("must be one of {:?}", SECTION_COUNTS),
            });
        }
        if self.max_components == 0 {
            return Err(Error::InvalidParameter {
                name: "max_components",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Component layout of a quantized landscape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LandscapeSize {
    pub quads_per_section: usize,
    pub sections_per_component: usize,
    pub components_x: usize,
    pub components_y: usize,
    /// Heightmap width in samples
    pub width: usize,
    /// Heightmap height in samples
    pub height: usize,
    /// True when the input size needed no resampling
    pub exact: bool,
}

impl LandscapeSize {
    fn new(ss: usize, ns: usize, cx: usize, cy: usize, exact: bool) -> Self {
        let quads = ss * ns;
        Self {
            quads_per_section: ss,
            sections_per_component: ns,
            components_x: cx,
            components_y: cy,
            width: cx * quads + 1,
            height: cy * quads + 1,
            exact,
        }
    }

    pub fn quads_per_component(&self) -> usize {
        self.quads_per_section * self.sections_per_component
    }
}

/// Landscape size for a `width x height` grid
pub fn quantize(width: usize, height: usize, params: &QuantizeParams) -> Result<LandscapeSize> {
    params.validate()?;
    if width < 2 || height < 2 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let (qw, qh) = (width - 1, height - 1);
    let max = params.max_components;

    for &ss in SECTION_SIZES.iter().rev() {
        for &ns in SECTION_COUNTS.iter().rev() {
            let quads = ss * ns;
            if qw % quads == 0 && qh % quads == 0 && qw / quads <= max && qh / quads <= max {
                return Ok(LandscapeSize::new(ss, ns, qw / quads, qh / quads, true));
            }
        }
    }

    let ns = params.sections_per_component;
    for &ss in SECTION_SIZES.iter().filter(|&&ss| ss >= params.section_size) {
        let quads = ss * ns;
        let (cx, cy) = (qw.div_ceil(quads), qh.div_ceil(quads));
        if cx <= max && cy <= max {
            return Ok(LandscapeSize::new(ss, ns, cx, cy, false));
        }
    }

    let ss = SECTION_SIZES[SECTION_SIZES.len() - 1];
    let ns = SECTION_COUNTS[SECTION_COUNTS.len() - 1];
    let quads = ss * ns;
    Ok(LandscapeSize::new(
        ss,
        ns,
        qw.div_ceil(quads).min(max),
        qh.div_ceil(quads).min(max),
        false,
    ))
}
