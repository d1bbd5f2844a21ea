//! Supervised land-cover classification
//!
//! Labelled samples are collected in a [`TrainingSet`], snapshotted into a
//! [`ClassificationModel`] and fitted by one of the built-in algorithms
//! through a [`ClassifierAdapter`], which trains in the background.
//!
//! Algorithms:
//! - **Decision tree**: CART with Gini impurity, leaf-frequency probabilities
//! - **Naive Bayes**: Gaussian, with class priors
//! - **SVM**: linear one-vs-rest, Pegasos
//! - **Minimum distance**: nearest class centroid

mod adapter;
mod classifier;
mod decision_tree;
mod samples;
mod supervised;
mod svm;
mod training;

pub use adapter::{AdapterStatus, ClassifierAdapter, TrainingEvent, TrainingHandle};
pub use classifier::{
    ClassProbabilities, Classifier, ClassifierKind, ClassifierParams, TrainedClassifier, TrainedModel,
    TrainingContext, create_classifier,
};
pub use decision_tree::{DecisionTree, TreeParams};
pub use samples::Samples;
pub use supervised::{BayesParams, ClassSignature, MinimumDistance, NaiveBayes, class_signatures};
pub use svm::{LinearSvm, SvmParams};
pub use training::{ClassificationModel, ClassifiedFeatureVector, TrainingSet};
