//! Linear SVM, one-vs-rest, trained with Pegasos
//!
//! Features are standardised with the training mean and standard deviation.
//! A constant feature stands in for the bias and is regularised with the
//! weights. Samples are visited in a fixed permutation, so training is
//! deterministic.

use super::classifier::{Classifier, ClassifierKind, TrainedModel, TrainingContext, argmax};
use super::samples::Samples;
use serde::{Deserialize, Serialize};
use terraclass_core::{Error, LandcoverType, Result};

/// Parameters for [`LinearSvm`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    /// Regularisation strength
    pub lambda: f64,
    /// Passes over the training data per class
    pub epochs: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            lambda: 0.01,
            epochs: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearSvm {
    params: SvmParams,
}

impl LinearSvm {
    pub fn new(params: SvmParams) -> Self {
        Self { params }
    }
}

#[derive(Debug)]
struct SvmModel {
    labels: Vec<LandcoverType>,
    /// Per class: feature weights followed by the bias weight
    weights: Vec<Vec<f64>>,
    means: Vec<f64>,
    inv_stds: Vec<f64>,
}

impl SvmModel {
    fn scores(&self, features: &[f64]) -> impl Iterator<Item = f64> + '_ {
        let x: Vec<f64> = features
            .iter()
            .zip(&self.means)
            .zip(&self.inv_stds)
            .map(|((v, m), s)| (v - m) * s)
            .collect();
        self.weights.iter().map(move |w| {
            let (bias, w) = w.split_last().map_or((0.0, &w[..]), |(b, w)| (*b, w));
            bias + w.iter().zip(&x).map(|(a, b)| a * b).sum::<f64>()
        })
    }
}

impl Classifier for LinearSvm {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Svm
    }

    fn fit(&self, samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Box<dyn TrainedModel>> {
        let SvmParams { lambda, epochs } = self.params;
        if lambda.is_nan() || lambda <= 0.0 || epochs == 0 {
            return Err(Error::InvalidParameter {
                name: "svm",
                value: format!("lambda={}, epochs={}", lambda, epochs),
                reason: "lambda must be positive and epochs at least 1".into(),
            });
        }
        ctx.check_cancelled()?;

        let (means, stds) = samples.column_stats();
        let inv_stds: Vec<f64> = stds.iter().map(|&s| if s > 0.0 { 1.0 / s } else { 1.0 }).collect();
        let d = samples.n_features();
        let n = samples.len();

        // standardised rows with the bias feature appended
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let mut x: Vec<f64> = samples
                    .row(i)
                    .iter()
                    .zip(&means)
                    .zip(&inv_stds)
                    .map(|((v, m), s)| (v - m) * s)
                    .collect();
                x.push(1.0);
                x
            })
            .collect();
        let visit = permutation(n);
        let radius = 1.0 / lambda.sqrt();

        let classes = &samples.classes;
        let total_epochs = (classes.len() * epochs) as f64;
        let mut weights = Vec::with_capacity(classes.len());
        for (k, &class) in classes.iter().enumerate() {
            let mut w = vec![0.0; d + 1];
            let mut t = 0usize;
            for epoch in 0..epochs {
                ctx.check_cancelled()?;
                for &i in &visit {
                    t += 1;
                    let eta = 1.0 / (lambda * t as f64);
                    let y = if samples.labels[i] == class { 1.0 } else { -1.0 };
                    let x = &rows[i];
                    let margin = y * dot(&w, x);
                    let shrink = 1.0 - eta * lambda;
                    w.iter_mut().for_each(|wj| *wj *= shrink);
                    if margin < 1.0 {
                        for (wj, xj) in w.iter_mut().zip(x) {
                            *wj += eta * y * xj;
                        }
                    }
                    // project onto the ball of radius 1/sqrt(lambda)
                    let norm = dot(&w, &w).sqrt();
                    if norm > radius {
                        let f = radius / norm;
                        w.iter_mut().for_each(|wj| *wj *= f);
                    }
                }
                ctx.report((k * epochs + epoch + 1) as f64 / total_epochs);
            }
            weights.push(w);
        }

        Ok(Box::new(SvmModel {
            labels: classes.clone(),
            weights,
            means,
            inv_stds,
        }))
    }
}

impl TrainedModel for SvmModel {
    fn predict(&self, features: &[f64]) -> LandcoverType {
        if self.labels.len() == 1 {
            return self.labels[0];
        }
        argmax(self.scores(features))
            .map(|i| self.labels[i])
            .unwrap_or(LandcoverType::None)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Fixed pseudo-random visiting order (multiplicative stride coprime to `n`)
fn permutation(n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut stride = (n as f64 * 0.618_033_988_75) as usize | 1;
    while gcd(stride, n) != 1 {
        stride += 2;
    }
    (0..n).map(|i| (i * stride) % n).collect()
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{ClassificationModel, ClassifiedFeatureVector};
    use crate::features::{BandSetDescriptor, FeatureParams};
    use terraclass_parallel::{CancelToken, ignore_progress};

    fn samples(data: &[(LandcoverType, [f64; 2])]) -> Samples {
        let descriptor =
            BandSetDescriptor::new(vec!["b1".into(), "b2".into()], None, &FeatureParams::default()).unwrap();
        let model = ClassificationModel {
            descriptor,
            samples: data
                .iter()
                .map(|&(label, v)| ClassifiedFeatureVector { label, vector: v.to_vec(), position: None })
                .collect(),
        };
        Samples::from_model(&model).unwrap()
    }

    #[test]
    fn test_permutation_visits_everything_once() {
        for n in [1, 2, 7, 10, 64] {
            let mut p = permutation(n);
            p.sort();
            assert_eq!(p, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_separates_two_clusters() {
        let mut data = Vec::new();
        for i in 0..10 {
            let d = i as f64;
            data.push((LandcoverType::Water, [10.0 + d, 1000.0 - d]));
            data.push((LandcoverType::Settlement, [500.0 + d, 3000.0 + d]));
        }
        let cancel = CancelToken::new();
        let ctx = TrainingContext { cancel: &cancel, progress: &ignore_progress };
        let model = LinearSvm::default().fit(&samples(&data), &ctx).unwrap();
        assert_eq!(model.predict(&[15.0, 990.0]), LandcoverType::Water);
        assert_eq!(model.predict(&[505.0, 3005.0]), LandcoverType::Settlement);
        assert!(!model.supports_probability());
    }

    #[test]
    fn test_single_class_predicts_it() {
        let data = [(LandcoverType::Gravel, [1.0, 2.0]), (LandcoverType::Gravel, [3.0, 4.0])];
        let cancel = CancelToken::new();
        let ctx = TrainingContext { cancel: &cancel, progress: &ignore_progress };
        let model = LinearSvm::default().fit(&samples(&data), &ctx).unwrap();
        assert_eq!(model.predict(&[100.0, -4.0]), LandcoverType::Gravel);
    }

    #[test]
    fn test_invalid_params() {
        let data = [(LandcoverType::Gravel, [1.0, 2.0])];
        let cancel = CancelToken::new();
        let ctx = TrainingContext { cancel: &cancel, progress: &ignore_progress };
        let svm = LinearSvm::new(SvmParams { lambda: 0.0, epochs: 10 });
        assert!(svm.fit(&samples(&data), &ctx).is_err());
    }
}
