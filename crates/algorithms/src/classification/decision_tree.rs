//! CART decision tree with Gini impurity
//!
//! Binary splits `x[feature] <= threshold`, thresholds at midpoints between
//! consecutive distinct sorted values. Leaves keep their class counts, so
//! probabilities are leaf class frequencies.

use super::classifier::{ClassProbabilities, Classifier, ClassifierKind, TrainedModel, TrainingContext, argmax};
use super::samples::Samples;
use serde::{Deserialize, Serialize};
use terraclass_core::{Error, LandcoverType, Result};

const CLASSES: usize = LandcoverType::COUNT;

/// Growth limits for [`DecisionTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves
    pub min_samples_split: usize,
    /// Smallest sample count a split may leave on either side
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionTree {
    params: TreeParams,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self { params }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        counts: [usize; CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Nodes in an arena; index 0 is the root
#[derive(Debug)]
struct TreeModel {
    nodes: Vec<Node>,
}

struct Builder<'a> {
    samples: &'a Samples,
    params: &'a TreeParams,
    ctx: &'a TrainingContext<'a>,
    nodes: Vec<Node>,
    settled: usize,
}

impl Classifier for DecisionTree {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::DecisionTree
    }

    fn fit(&self, samples: &Samples, ctx: &TrainingContext<'_>) -> Result<Box<dyn TrainedModel>> {
        if self.params.min_samples_leaf == 0 {
            return Err(Error::InvalidParameter {
                name: "min_samples_leaf",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let mut builder = Builder {
            samples,
            params: &self.params,
            ctx,
            nodes: Vec::new(),
            settled: 0,
        };
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        builder.grow(&mut indices, 0)?;
        Ok(Box::new(TreeModel { nodes: builder.nodes }))
    }
}

fn class_counts(samples: &Samples, indices: &[usize]) -> [usize; CLASSES] {
    let mut counts = [0; CLASSES];
    for &i in indices {
        counts[samples.labels[i].index() as usize] += 1;
    }
    counts
}

fn gini(counts: &[usize; CLASSES], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

impl Builder<'_> {
    /// Grow the subtree over `indices`, returning its node index
    fn grow(&mut self, indices: &mut [usize], depth: usize) -> Result<usize> {
        self.ctx.check_cancelled()?;
        let counts = class_counts(self.samples, indices);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let split = if pure || depth >= self.params.max_depth || indices.len() < self.params.min_samples_split {
            None
        } else {
            self.best_split(indices, &counts)
        };

        let Some((feature, threshold)) = split else {
            self.settled += indices.len();
            self.ctx.report(self.settled as f64 / self.samples.len() as f64);
            self.nodes.push(Node::Leaf { counts });
            return Ok(self.nodes.len() - 1);
        };

        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { counts });
        let mid = partition(indices, |i| self.samples.features[(i, feature)] <= threshold);
        let (left_idx, right_idx) = indices.split_at_mut(mid);
        let left = self.grow(left_idx, depth + 1)?;
        let right = self.grow(right_idx, depth + 1)?;
        self.nodes[slot] = Node::Split { feature, threshold, left, right };
        Ok(slot)
    }

    /// Feature and threshold with the lowest weighted Gini impurity, if any
    /// split improves on the parent
    fn best_split(&self, indices: &[usize], counts: &[usize; CLASSES]) -> Option<(usize, f64)> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf;
        let parent = gini(counts, n);
        let mut best: Option<(f64, usize, f64)> = None;
        let mut order = indices.to_vec();

        for feature in 0..self.samples.n_features() {
            let value = |i: usize| self.samples.features[(i, feature)];
            order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

            let mut left = [0usize; CLASSES];
            let mut right = *counts;
            for pos in 1..n {
                let moved = self.samples.labels[order[pos - 1]].index() as usize;
                left[moved] += 1;
                right[moved] -= 1;
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let (lo, hi) = (value(order[pos - 1]), value(order[pos]));
                if lo >= hi {
                    continue;
                }
                let impurity = (pos as f64 * gini(&left, pos) + (n - pos) as f64 * gini(&right, n - pos)) / n as f64;
                if best.is_none_or(|(b, _, _)| impurity < b) {
                    best = Some((impurity, feature, lo + (hi - lo) / 2.0));
                }
            }
        }

        best.filter(|(impurity, _, _)| *impurity < parent - 1e-12)
            .map(|(_, feature, threshold)| (feature, threshold))
    }
}

/// Reorder so elements satisfying `pred` come first; returns their count
fn partition(items: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut next = 0;
    for i in 0..items.len() {
        if pred(items[i]) {
            items.swap(i, next);
            next += 1;
        }
    }
    next
}

impl TreeModel {
    fn leaf_counts(&self, features: &[f64]) -> &[usize; CLASSES] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { counts } => return counts,
                Node::Split { feature, threshold, left, right } => {
                    node = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl TrainedModel for TreeModel {
    fn predict(&self, features: &[f64]) -> LandcoverType {
        let counts = self.leaf_counts(features);
        argmax(counts.iter().map(|&c| c as f64))
            .and_then(|i| LandcoverType::from_index(i as u8))
            .unwrap_or(LandcoverType::None)
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn class_probabilities(&self, features: &[f64]) -> Result<ClassProbabilities> {
        let counts = self.leaf_counts(features);
        let total: usize = counts.iter().sum();
        let mut probabilities = [0.0; CLASSES];
        if total > 0 {
            for (p, &c) in probabilities.iter_mut().zip(counts) {
                *p = c as f64 / total as f64;
            }
        }
        Ok(probabilities)
    }
}
