//! Supervised classifiers built from class signatures
//!
//! Minimum distance and Gaussian naive Bayes. Both summarise each class by
//! a signature (per-feature mean, plus variance for Bayes) derived from the
//! training samples.

use super::classifier::{ClassProbabilities, Classifier, ClassifierKind, TrainedModel, TrainingContext, argmax};
use super::samples::Samples;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use terraclass_core::{LandcoverType, Result};

/// Per-class feature statistics
#[derive(Debug, Clone)]
pub struct ClassSignature {
    pub label: LandcoverType,
    pub count: usize,
    pub mean: Vec<f64>,
    /// Population variance per feature
    pub variance: Vec<f64>,
}

/// Signatures in class-index order, one per class present in `samples`
pub fn class_signatures(samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Vec<ClassSignature>> {
    let n_features = samples.n_features();
    let mut signatures = Vec::with_capacity(samples.classes.len());
    for (k, &label) in samples.classes.iter().enumerate() {
        ctx.check_cancelled()?;
        let rows = samples.indices_of(label);
        let n = rows.len() as f64;
        let mut mean = vec![0.0; n_features];
        for &r in &rows {
            for (m, v) in mean.iter_mut().zip(samples.row(r)) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; n_features];
        for &r in &rows {
            for ((s, v), m) in variance.iter_mut().zip(samples.row(r)).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        variance.iter_mut().for_each(|s| *s /= n);

        signatures.push(ClassSignature { label, count: rows.len(), mean, variance });
        ctx.report((k + 1) as f64 / samples.classes.len() as f64);
    }
    Ok(signatures)
}

/// Nearest class centroid in feature space.
///
/// Simple and fast but ignores class spread. No probabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumDistance;

#[derive(Debug)]
struct MinimumDistanceModel {
    signatures: Vec<ClassSignature>,
}

impl Classifier for MinimumDistance {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::MinimumDistance
    }

    fn fit(&self, samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Box<dyn TrainedModel>> {
        ctx.check_cancelled()?;
        let signatures = class_signatures(samples, ctx)?;
        Ok(Box::new(MinimumDistanceModel { signatures }))
    }
}

impl TrainedModel for MinimumDistanceModel {
    fn predict(&self, features: &[f64]) -> LandcoverType {
        let distances = self.signatures.iter().map(|sig| {
            -sig.mean
                .iter()
                .zip(features)
                .map(|(m, v)| (v - m).powi(2))
                .sum::<f64>()
        });
        argmax(distances)
            .map(|i| self.signatures[i].label)
            .unwrap_or(LandcoverType::None)
    }
}

/// Parameters for [`NaiveBayes`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesParams {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
    /// Weight classes by their share of the training samples
    pub use_priors: bool,
}

impl Default for BayesParams {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
            use_priors: true,
        }
    }
}

/// Gaussian naive Bayes.
///
/// `P(x|c) = Π 1/(σ√(2π)) · exp(-(x-μ)²/(2σ²))`, evaluated in log space.
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes {
    params: BayesParams,
}

impl NaiveBayes {
    pub fn new(params: BayesParams) -> Self {
        Self { params }
    }
}

#[derive(Debug)]
struct NaiveBayesModel {
    labels: Vec<LandcoverType>,
    means: Vec<Vec<f64>>,
    inv_two_var: Vec<Vec<f64>>,
    /// `ln prior - Σ ln σ - n/2 ln 2π` per class
    log_consts: Vec<f64>,
}

impl Classifier for NaiveBayes {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::NaiveBayes
    }

    fn fit(&self, samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Box<dyn TrainedModel>> {
        ctx.check_cancelled()?;
        let signatures = class_signatures(samples, ctx)?;
        let (_, stds) = samples.column_stats();
        let max_var = stds.iter().map(|s| s * s).fold(0.0, f64::max);
        let epsilon = (self.params.var_smoothing * max_var).max(1e-12);

        let total = samples.len() as f64;
        let uniform = 1.0 / signatures.len() as f64;
        let half_ln_two_pi = 0.5 * (2.0 * PI).ln();

        let mut model = NaiveBayesModel {
            labels: Vec::with_capacity(signatures.len()),
            means: Vec::with_capacity(signatures.len()),
            inv_two_var: Vec::with_capacity(signatures.len()),
            log_consts: Vec::with_capacity(signatures.len()),
        };
        for sig in signatures {
            let prior = if self.params.use_priors { sig.count as f64 / total } else { uniform };
            let vars: Vec<f64> = sig.variance.iter().map(|v| v + epsilon).collect();
            let log_const = prior.ln()
                - vars.iter().map(|v| 0.5 * v.ln() + half_ln_two_pi).sum::<f64>();
            model.labels.push(sig.label);
            model.inv_two_var.push(vars.iter().map(|v| 0.5 / v).collect());
            model.means.push(sig.mean);
            model.log_consts.push(log_const);
        }
        Ok(Box::new(model))
    }
}

impl NaiveBayesModel {
    fn joint_log_likelihood(&self, features: &[f64]) -> Vec<f64> {
        (0..self.labels.len())
            .map(|k| {
                let quad: f64 = features
                    .iter()
                    .zip(&self.means[k])
                    .zip(&self.inv_two_var[k])
                    .map(|((x, m), w)| (x - m).powi(2) * w)
                    .sum();
                self.log_consts[k] - quad
            })
            .collect()
    }
}

impl TrainedModel for NaiveBayesModel {
    fn predict(&self, features: &[f64]) -> LandcoverType {
        argmax(self.joint_log_likelihood(features))
            .map(|i| self.labels[i])
            .unwrap_or(LandcoverType::None)
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn class_probabilities(&self, features: &[f64]) -> Result<ClassProbabilities> {
        let jll = self.joint_log_likelihood(features);
        let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = jll.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = weights.iter().sum();

        let mut probabilities = [0.0; LandcoverType::COUNT];
        for (label, w) in self.labels.iter().zip(weights) {
            probabilities[label.index() as usize] = w / total;
        }
        Ok(probabilities)
    }
}
