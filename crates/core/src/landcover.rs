//! Land-cover classes and their canonical colours

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of land-cover classes.
///
/// The discriminant is the class index stored in label grids and used for
/// probability planes and tie-breaking. The colour table is part of the
/// export format and must stay fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LandcoverType {
    Grass = 0,
    Gravel = 1,
    Rock = 2,
    Snow = 3,
    Tree = 4,
    Water = 5,
    Agriculture = 6,
    Settlement = 7,
    Soil = 8,
    None = 9,
}

impl LandcoverType {
    /// Number of classes, `None` included
    pub const COUNT: usize = 10;

    /// Every class in index order
    pub const ALL: [LandcoverType; Self::COUNT] = [
        LandcoverType::Grass,
        LandcoverType::Gravel,
        LandcoverType::Rock,
        LandcoverType::Snow,
        LandcoverType::Tree,
        LandcoverType::Water,
        LandcoverType::Agriculture,
        LandcoverType::Settlement,
        LandcoverType::Soil,
        LandcoverType::None,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            LandcoverType::Grass => "Grass",
            LandcoverType::Gravel => "Gravel",
            LandcoverType::Rock => "Rock",
            LandcoverType::Snow => "Snow",
            LandcoverType::Tree => "Tree",
            LandcoverType::Water => "Water",
            LandcoverType::Agriculture => "Agriculture",
            LandcoverType::Settlement => "Settlement",
            LandcoverType::Soil => "Soil",
            LandcoverType::None => "None",
        }
    }

    /// Canonical RGB colour
    pub fn rgb(self) -> [u8; 3] {
        match self {
            LandcoverType::Grass => [124, 252, 0],
            LandcoverType::Gravel => [160, 160, 160],
            LandcoverType::Rock => [105, 105, 105],
            LandcoverType::Snow => [255, 250, 250],
            LandcoverType::Tree => [34, 139, 34],
            LandcoverType::Water => [0, 0, 255],
            LandcoverType::Agriculture => [255, 215, 0],
            LandcoverType::Settlement => [255, 0, 0],
            LandcoverType::Soil => [139, 69, 19],
            LandcoverType::None => [255, 255, 255],
        }
    }

    /// Canonical RGBA colour; unclassified pixels are fully transparent
    pub fn rgba(self) -> [u8; 4] {
        let [r, g, b] = self.rgb();
        let a = if self == LandcoverType::None { 0 } else { 255 };
        [r, g, b, a]
    }

    /// Class whose canonical colour is exactly `rgb`
    pub fn from_rgb(rgb: [u8; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.rgb() == rgb)
    }

    /// Every class a classifier may predict
    pub fn assignable() -> impl Iterator<Item = LandcoverType> {
        Self::ALL.into_iter().filter(|c| *c != LandcoverType::None)
    }
}

impl fmt::Display for LandcoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LandcoverType {
    type Err = Error;

    /// Class name (any case) or numeric class index
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(index) = s.parse::<u8>() {
            return Self::from_index(index).ok_or_else(|| unknown(s));
        }
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| unknown(s))
    }
}

fn unknown(s: &str) -> Error {
    Error::InvalidParameter {
        name: "label",
        value: s.to_string(),
        reason: "unknown land-cover class".into(),
    }
}
