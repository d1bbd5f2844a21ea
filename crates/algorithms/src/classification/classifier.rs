//! Pluggable classification algorithms
//!
//! A [`Classifier`] turns [`Samples`] into a [`TrainedModel`]. The model is
//! wrapped in a [`TrainedClassifier`] together with the band-set descriptor
//! it was trained on, which is what prediction code talks to.

use super::decision_tree::{DecisionTree, TreeParams};
use super::samples::Samples;
use super::supervised::{BayesParams, MinimumDistance, NaiveBayes};
use super::svm::{LinearSvm, SvmParams};
use crate::features::BandSetDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use terraclass_core::{Error, LandcoverType, Result};
use terraclass_parallel::CancelToken;

/// Per-class probabilities indexed by class index
pub type ClassProbabilities = [f64; LandcoverType::COUNT];

/// Closed set of built-in algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    DecisionTree,
    NaiveBayes,
    Svm,
    MinimumDistance,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 4] = [
        ClassifierKind::DecisionTree,
        ClassifierKind::NaiveBayes,
        ClassifierKind::Svm,
        ClassifierKind::MinimumDistance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClassifierKind::DecisionTree => "decision-tree",
            ClassifierKind::NaiveBayes => "naive-bayes",
            ClassifierKind::Svm => "svm",
            ClassifierKind::MinimumDistance => "minimum-distance",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of every built-in algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub tree: TreeParams,
    pub bayes: BayesParams,
    pub svm: SvmParams,
}

/// Cancellation and progress side channels for one training run
pub struct TrainingContext<'a> {
    pub cancel: &'a CancelToken,
    pub progress: &'a (dyn Fn(f64) + Sync),
}

impl TrainingContext<'_> {
    /// `TrainingCancelled` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::TrainingCancelled)
        } else {
            Ok(())
        }
    }

    pub fn report(&self, fraction: f64) {
        (self.progress)(fraction.clamp(0.0, 1.0));
    }
}

/// A training algorithm
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    /// Fit a model. Implementations poll `ctx` between iterations and return
    /// `TrainingCancelled` when asked to stop.
    fn fit(&self, samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Box<dyn TrainedModel>>;
}

/// The fitted state of an algorithm.
///
/// Inputs are trusted to have the trained feature length; the
/// [`TrainedClassifier`] wrapper checks it.
pub trait TrainedModel: Send + Sync + fmt::Debug {
    fn predict(&self, features: &[f64]) -> LandcoverType;

    /// Predict consecutive `width`-long rows of `rows`, appending to `out`
    /// in input order
    fn predict_rows(&self, rows: &[f64], width: usize, out: &mut Vec<LandcoverType>) {
        out.extend(rows.chunks_exact(width).map(|r| self.predict(r)));
    }

    fn supports_probability(&self) -> bool {
        false
    }

    fn class_probabilities(&self, _features: &[f64]) -> Result<ClassProbabilities> {
        Err(Error::UnsupportedOperation(
            "this classifier does not produce class probabilities".into(),
        ))
    }
}

/// Instantiate a built-in algorithm
pub fn create_classifier(kind: ClassifierKind, params: &ClassifierParams) -> Box<dyn Classifier> {
    match kind {
        ClassifierKind::DecisionTree => Box::new(DecisionTree::new(params.tree.clone())),
        ClassifierKind::NaiveBayes => Box::new(NaiveBayes::new(params.bayes.clone())),
        ClassifierKind::Svm => Box::new(LinearSvm::new(params.svm.clone())),
        ClassifierKind::MinimumDistance => Box::new(MinimumDistance),
    }
}

/// A fitted model bound to the band set it was trained on
#[derive(Debug)]
pub struct TrainedClassifier {
    kind: ClassifierKind,
    descriptor: BandSetDescriptor,
    classes: Vec<LandcoverType>,
    model: Box<dyn TrainedModel>,
}

impl TrainedClassifier {
    pub fn new(
        kind: ClassifierKind,
        descriptor: BandSetDescriptor,
        classes: Vec<LandcoverType>,
        model: Box<dyn TrainedModel>,
    ) -> Self {
        Self { kind, descriptor, classes, model }
    }

    /// Fit `classifier` on `samples` synchronously
    pub fn fit(
        classifier: &dyn Classifier,
        descriptor: BandSetDescriptor,
        samples: &Samples,
        ctx: &TrainingContext<'_>,
    ) -> Result<Self> {
        if samples.n_features() != descriptor.len() {
            return Err(Error::FeatureLength {
                expected: descriptor.len(),
                actual: samples.n_features(),
            });
        }
        let model = classifier.fit(samples, ctx)?;
        Ok(Self::new(classifier.kind(), descriptor, samples.classes.clone(), model))
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn descriptor(&self) -> &BandSetDescriptor {
        &self.descriptor
    }

    /// Classes present in the training data
    pub fn classes(&self) -> &[LandcoverType] {
        &self.classes
    }

    pub fn supports_probability(&self) -> bool {
        self.model.supports_probability()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len == self.descriptor.len() {
            Ok(())
        } else {
            Err(Error::FeatureLength {
                expected: self.descriptor.len(),
                actual: len,
            })
        }
    }

    pub fn predict(&self, features: &[f64]) -> Result<LandcoverType> {
        self.check_len(features.len())?;
        Ok(self.model.predict(features))
    }

    /// One label per vector, in input order
    pub fn predict_batch<V: AsRef<[f64]>>(&self, vectors: &[V]) -> Result<Vec<LandcoverType>> {
        for v in vectors {
            self.check_len(v.as_ref().len())?;
        }
        Ok(vectors.iter().map(|v| self.model.predict(v.as_ref())).collect())
    }

    /// Predict vectors packed back to back in `rows`, appending to `out`
    pub fn predict_rows(&self, rows: &[f64], out: &mut Vec<LandcoverType>) -> Result<()> {
        let width = self.descriptor.len();
        if width == 0 || rows.len() % width != 0 {
            return Err(Error::FeatureLength {
                expected: width,
                actual: rows.len() % width.max(1),
            });
        }
        self.model.predict_rows(rows, width, out);
        Ok(())
    }

    pub fn class_probabilities(&self, features: &[f64]) -> Result<ClassProbabilities> {
        self.check_len(features.len())?;
        self.model.class_probabilities(features)
    }

    /// Probability of `class_index` for one vector, in `[0, 1]`
    pub fn class_probability(&self, features: &[f64], class_index: usize) -> Result<f64> {
        if class_index >= LandcoverType::COUNT {
            return Err(Error::InvalidParameter {
                name: "class_index",
                value: class_index.to_string(),
                reason: format!("must be below {}", LandcoverType::COUNT),
            });
        }
        Ok(self.class_probabilities(features)?[class_index])
    }
}

/// Index of the largest score, lowest index on ties
pub(crate) fn argmax(scores: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.into_iter().enumerate() {
        if best.is_none_or(|(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}
