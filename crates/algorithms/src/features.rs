//! Feature vectors from a stack of layers
//!
//! A [`BandSetDescriptor`] fixes which layers contribute, in which order and
//! under which scaling. Every trained model carries the descriptor it was
//! trained with; vectors assembled under a different descriptor are
//! rejected.
//!
//! Column order: feature layers sorted by identifier, then, in terrain mode,
//! `@altitude`, `@slope`, `@aspect` from the elevation layer.

use crate::terrain::layer_aspect_slope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use terraclass_core::layer::{IntensityScaling, LayerId, LayerStack, PixelFormat, RasterLayer};
use terraclass_core::raster::Neighborhood;
use terraclass_core::{Error, Result};

/// Terrain columns appended in [`FeatureMode::Terrain`]
pub const TERRAIN_COLUMNS: [&str; 3] = ["@altitude", "@slope", "@aspect"];

/// Ordered per-band intensities, plus terrain scalars in terrain mode
pub type FeatureVector = Vec<f64>;

/// What a feature vector is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    /// One scaled intensity per feature layer
    #[default]
    Bands,
    /// Band intensities followed by altitude, slope and aspect of the DEM
    Terrain,
}

/// Parameters for building a descriptor from a layer stack
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    pub mode: FeatureMode,
    pub scaling: IntensityScaling,
    /// Average band intensities over a `(2r+1)²` window; 0 samples one pixel
    pub smoothing_radius: usize,
}

/// The band set a model is trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSetDescriptor {
    layers: Vec<LayerId>,
    mode: FeatureMode,
    scaling: IntensityScaling,
    smoothing_radius: usize,
    dem: Option<LayerId>,
}

impl BandSetDescriptor {
    /// Layers are sorted and deduplicated. Terrain mode requires `dem`;
    /// bands mode ignores it.
    pub fn new(mut layers: Vec<LayerId>, dem: Option<LayerId>, params: &FeatureParams) -> Result<Self> {
        layers.sort();
        layers.dedup();
        if layers.is_empty() {
            return Err(Error::InvalidParameter {
                name: "feature layers",
                value: "0".into(),
                reason: "at least one feature layer is required".into(),
            });
        }
        let dem = match params.mode {
            FeatureMode::Bands => None,
            FeatureMode::Terrain => Some(dem.ok_or_else(|| Error::InvalidParameter {
                name: "dem",
                value: "none".into(),
                reason: "terrain features need an elevation layer".into(),
            })?),
        };
        Ok(Self {
            layers,
            mode: params.mode,
            scaling: params.scaling,
            smoothing_radius: params.smoothing_radius,
            dem,
        })
    }

    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    pub fn scaling(&self) -> IntensityScaling {
        self.scaling
    }

    pub fn smoothing_radius(&self) -> usize {
        self.smoothing_radius
    }

    pub fn dem(&self) -> Option<&LayerId> {
        self.dem.as_ref()
    }

    pub fn params(&self) -> FeatureParams {
        FeatureParams {
            mode: self.mode,
            scaling: self.scaling,
            smoothing_radius: self.smoothing_radius,
        }
    }

    /// Feature vector length
    pub fn len(&self) -> usize {
        match self.mode {
            FeatureMode::Bands => self.layers.len(),
            FeatureMode::Terrain => self.layers.len() + TERRAIN_COLUMNS.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column keys in vector order
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.iter().map(|l| l.to_string()).collect();
        if self.mode == FeatureMode::Terrain {
            names.extend(TERRAIN_COLUMNS.iter().map(|c| c.to_string()));
        }
        names
    }

    /// Every layer the descriptor reads, DEM included
    pub fn required_layers(&self) -> Vec<LayerId> {
        let mut ids = self.layers.clone();
        if let Some(dem) = &self.dem
            && !ids.contains(dem)
        {
            ids.push(dem.clone());
        }
        ids
    }

    /// Fails with `DescriptorMismatch` unless both describe the same vectors
    pub fn check_compatible(&self, other: &BandSetDescriptor) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::DescriptorMismatch {
                expected: self.to_string(),
                actual: other.to_string(),
            })
        }
    }
}

impl fmt::Display for BandSetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}/{:?}", self.column_names().join(", "), self.mode, self.scaling)?;
        if self.smoothing_radius > 0 {
            write!(f, " r={}", self.smoothing_radius)?;
        }
        if let Some(dem) = &self.dem {
            write!(f, " dem={}", dem)?;
        }
        Ok(())
    }
}

/// Builds feature vectors at world positions.
///
/// Holds shared handles to the layers it reads, so it stays valid while the
/// stack it came from changes.
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    descriptor: BandSetDescriptor,
    layers: Vec<Arc<RasterLayer>>,
    dem: Option<Arc<RasterLayer>>,
    offsets: Vec<(isize, isize)>,
}

impl FeatureAssembler {
    /// Assembler over the stack's current feature layers
    pub fn from_stack(stack: &LayerStack, params: &FeatureParams) -> Result<Self> {
        let ids = stack.feature_layers().iter().map(|l| l.id().clone()).collect();
        let dem = stack.dem().map(|l| l.id().clone());
        let descriptor = BandSetDescriptor::new(ids, dem, params)?;
        Self::for_descriptor(stack, &descriptor)
    }

    /// Assembler reproducing `descriptor` from the stack's layers.
    ///
    /// Fails with `MissingLayers` when the stack lacks any of them.
    pub fn for_descriptor(stack: &LayerStack, descriptor: &BandSetDescriptor) -> Result<Self> {
        let missing = stack.missing(&descriptor.required_layers());
        if !missing.is_empty() {
            return Err(Error::MissingLayers(missing.iter().map(|id| id.to_string()).collect()));
        }
        let resolve = |id: &LayerId| {
            stack
                .get(id)
                .cloned()
                .ok_or_else(|| Error::MissingLayers(vec![id.to_string()]))
        };
        let layers = descriptor.layers.iter().map(resolve).collect::<Result<Vec<_>>>()?;
        for layer in &layers {
            if layer.format() == PixelFormat::Gray8 {
                return Err(Error::UnsupportedFormat(format!(
                    "feature layer '{}' is Gray8; only Gray16 and Gray32Float layers can be features",
                    layer.id()
                )));
            }
        }
        let dem = descriptor.dem.as_ref().map(resolve).transpose()?;

        Ok(Self {
            descriptor: descriptor.clone(),
            layers,
            dem,
            offsets: Neighborhood::Square(descriptor.smoothing_radius).offsets(),
        })
    }

    pub fn descriptor(&self) -> &BandSetDescriptor {
        &self.descriptor
    }

    /// Feature layers in column order
    pub fn layers(&self) -> &[Arc<RasterLayer>] {
        &self.layers
    }

    pub fn dem(&self) -> Option<&Arc<RasterLayer>> {
        self.dem.as_ref()
    }

    /// Feature layers followed by the DEM, if any
    pub fn all_layers(&self) -> impl Iterator<Item = &Arc<RasterLayer>> {
        self.layers.iter().chain(self.dem.iter())
    }

    pub fn len(&self) -> usize {
        self.descriptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    /// Feature vector at a world position
    pub fn assemble(&self, world: (f64, f64)) -> Result<FeatureVector> {
        let mut out = Vec::with_capacity(self.len());
        self.assemble_into(world, &mut out)?;
        Ok(out)
    }

    /// Like [`Self::assemble`], reusing `out`'s allocation.
    ///
    /// `out` is cleared first; on error its contents are unspecified.
    pub fn assemble_into(&self, world: (f64, f64), out: &mut Vec<f64>) -> Result<()> {
        out.clear();
        for layer in &self.layers {
            let (x, y) = layer.world_to_image().apply(world);
            out.push(self.band_value(layer, x, y)?);
        }
        if let Some(dem) = &self.dem {
            let (x, y) = dem.world_to_image().apply(world);
            let altitude = dem.sample_or_fail(x, y)?;
            let terrain = layer_aspect_slope(dem, x, y);
            out.extend([altitude, terrain.slope, terrain.aspect]);
        }
        Ok(())
    }

    /// Scaled intensity at image position `(x, y)`, averaged over the
    /// smoothing window
    fn band_value(&self, layer: &RasterLayer, x: f64, y: f64) -> Result<f64> {
        let scaling = self.descriptor.scaling;
        if self.offsets.len() == 1 {
            return Ok(layer.scaled_to_unsigned_short(x, y, scaling)? as f64);
        }
        let (cx, cy) = (x.round(), y.round());
        let mut sum = 0.0;
        for &(dr, dc) in &self.offsets {
            sum += layer.scaled_to_unsigned_short(cx + dc as f64, cy + dr as f64, scaling)? as f64;
        }
        Ok(sum / self.offsets.len() as f64)
    }
}
