//! Loaded raster bands and the session's layer collection

mod histogram;
mod raster_layer;
mod stack;

pub use histogram::{CutoffParams, HISTOGRAM_BINS, LayerStatistics};
pub use raster_layer::{IntensityScaling, LayerPixels, PixelFormat, RasterLayer};
pub use stack::{LayerSource, LayerStack};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a layer within a session.
///
/// Feature vectors are ordered by this identifier, so it doubles as the
/// column key of training files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
