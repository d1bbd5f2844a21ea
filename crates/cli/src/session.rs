//! Session files: the layers, training file and settings of one project

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use terraclass_algorithms::classification::{ClassifierKind, ClassifierParams};
use terraclass_algorithms::export::ExportParams;
use terraclass_algorithms::features::FeatureParams;
use terraclass_algorithms::prediction::PredictionParams;
use terraclass_core::{CutoffParams, LayerSource};
use terraclass_parallel::ProcessingMode;

/// Classifier selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    #[serde(flatten)]
    pub params: ClassifierParams,
}

/// Bulk prediction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub probabilities: bool,
    pub majority_filter: bool,
    /// Worker threads; all cores when unset
    pub threads: Option<usize>,
}

impl PredictionConfig {
    pub fn mode(&self) -> ProcessingMode {
        ProcessingMode::from_threads(self.threads)
    }

    pub fn params(&self) -> PredictionParams {
        PredictionParams {
            probabilities: self.probabilities,
            majority_filter: self.majority_filter,
            mode: self.mode(),
        }
    }
}

/// Export settings plus the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: PathBuf,
    #[serde(flatten)]
    pub params: ExportParams,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("export"),
            params: ExportParams::default(),
        }
    }
}

/// A classification session as stored on disk (JSON).
///
/// Relative paths are resolved against the directory holding the session
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub layers: Vec<LayerSource>,
    /// Training samples in the `label;layer;...` text format
    pub training: PathBuf,
    #[serde(default)]
    pub features: FeatureParams,
    #[serde(default)]
    pub cutoffs: CutoffParams,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session {}", path.display()))?;
        let mut session: SessionConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid session file {}", path.display()))?;
        if session.layers.is_empty() {
            anyhow::bail!("Session {} lists no layers", path.display());
        }
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        session.resolve_paths(base);
        Ok(session)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for layer in &mut self.layers {
            resolve(&mut layer.path);
        }
        resolve(&mut self.training);
        resolve(&mut self.export.directory);
    }
}
