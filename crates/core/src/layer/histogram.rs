//! Histogram scan for contrast cutoffs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of histogram bins; 16-bit samples map one value per bin.
pub const HISTOGRAM_BINS: usize = 65536;

/// Percentile pair used for the contrast cutoffs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoffParams {
    /// Fraction of valid samples below `min_cutoff`
    pub low: f64,
    /// Fraction of valid samples at or below `max_cutoff`
    pub high: f64,
}

impl Default for CutoffParams {
    fn default() -> Self {
        Self { low: 0.02, high: 0.98 }
    }
}

impl CutoffParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.low) || !(0.0..=1.0).contains(&self.high) || self.low >= self.high {
            return Err(Error::InvalidParameter {
                name: "cutoffs",
                value: format!("{}/{}", self.low, self.high),
                reason: "percentiles must satisfy 0 <= low < high <= 1".into(),
            });
        }
        Ok(())
    }
}

/// Per-layer value statistics gathered in one histogram pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayerStatistics {
    pub data_min: f64,
    pub data_max: f64,
    pub valid_count: usize,
    pub min_cutoff: f64,
    pub max_cutoff: f64,
}

/// How sample values land in bins
enum Binning {
    /// Integer samples, bin index = value
    Native,
    /// Float samples, `BINS` equal steps from `min` to `max` inclusive
    Range { min: f64, max: f64 },
}

impl Binning {
    fn bin(&self, v: f64) -> usize {
        match *self {
            Binning::Native => (v as usize).min(HISTOGRAM_BINS - 1),
            Binning::Range { min, max } => {
                if max <= min {
                    return 0;
                }
                let t = (v - min) / (max - min) * (HISTOGRAM_BINS - 1) as f64;
                (t.round() as usize).min(HISTOGRAM_BINS - 1)
            }
        }
    }

    fn value(&self, bin: usize) -> f64 {
        match *self {
            Binning::Native => bin as f64,
            Binning::Range { min, max } => min + (max - min) * bin as f64 / (HISTOGRAM_BINS - 1) as f64,
        }
    }
}

/// Scan valid samples (NaN and no-data excluded) and derive data range and
/// cutoffs.
///
/// `min_cutoff` is the first bin whose cumulative count exceeds `low * n`,
/// `max_cutoff` the first bin whose cumulative count reaches `high * n`.
/// `values` is called twice, once for the range and once for the counts.
pub(crate) fn compute_statistics<F, I>(values: F, integer_samples: bool, params: &CutoffParams) -> Result<LayerStatistics>
where
    F: Fn() -> I,
    I: Iterator<Item = f64>,
{
    params.validate()?;

    let mut data_min = f64::INFINITY;
    let mut data_max = f64::NEG_INFINITY;
    let mut n = 0usize;
    for v in values() {
        data_min = data_min.min(v);
        data_max = data_max.max(v);
        n += 1;
    }
    if n == 0 {
        return Ok(LayerStatistics::default());
    }

    let binning = if integer_samples {
        Binning::Native
    } else {
        Binning::Range { min: data_min, max: data_max }
    };

    let mut histogram = vec![0usize; HISTOGRAM_BINS];
    for v in values() {
        histogram[binning.bin(v)] += 1;
    }

    let low_count = params.low * n as f64;
    let high_count = params.high * n as f64;
    let mut cumulative = 0usize;
    let mut min_bin = None;
    let mut max_bin = None;
    for (bin, &count) in histogram.iter().enumerate() {
        cumulative += count;
        let c = cumulative as f64;
        if min_bin.is_none() && c > low_count {
            min_bin = Some(bin);
        }
        if max_bin.is_none() && c >= high_count {
            max_bin = Some(bin);
        }
        if min_bin.is_some() && max_bin.is_some() {
            break;
        }
    }

    let last = HISTOGRAM_BINS - 1;
    Ok(LayerStatistics {
        data_min,
        data_max,
        valid_count: n,
        min_cutoff: binning.value(min_bin.unwrap_or(last)),
        max_cutoff: binning.value(max_bin.unwrap_or(last)),
    })
}
