//! Projection identity of a layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate reference system as reported by the raster reader.
///
/// Only identity matters: the layer stack compares projections to warn
/// when a session mixes them. Nothing is ever reprojected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CRS {
    Epsg(u32),
    Wkt(String),
}

impl CRS {
    /// Interpret a reader's projection string: `EPSG:<code>`, WKT, or
    /// empty for unknown
    pub fn parse(projection: &str) -> Option<Self> {
        let projection = projection.trim();
        if projection.is_empty() {
            return None;
        }
        let code = projection
            .strip_prefix("EPSG:")
            .or_else(|| projection.strip_prefix("epsg:"))
            .and_then(|c| c.parse::<u32>().ok());
        Some(match code {
            Some(code) => CRS::Epsg(code),
            None => CRS::Wkt(projection.to_string()),
        })
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Wkt(_) => None,
        }
    }

    /// Same EPSG code, or byte-identical WKT. Mixed forms never match.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        self == other
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CRS::Epsg(code) => write!(f, "EPSG:{}", code),
            CRS::Wkt(wkt) => {
                let head: String = wkt.chars().take(50).collect();
                write!(f, "WKT:{}", head)
            }
        }
    }
}
