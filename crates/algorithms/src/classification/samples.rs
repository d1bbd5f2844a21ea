//! Training snapshot as a dense sample matrix

use super::training::ClassificationModel;
use ndarray::{Array2, ArrayView1};
use terraclass_core::{Error, LandcoverType, Result};

/// Row per sample, column per feature
#[derive(Debug, Clone)]
pub struct Samples {
    pub features: Array2<f64>,
    pub labels: Vec<LandcoverType>,
    /// Distinct labels in class-index order
    pub classes: Vec<LandcoverType>,
}

impl Samples {
    pub fn from_model(model: &ClassificationModel) -> Result<Self> {
        if model.is_empty() {
            return Err(Error::Training("training set is empty".into()));
        }
        let n_features = model.descriptor.len();
        let mut data = Vec::with_capacity(model.len() * n_features);
        let mut labels = Vec::with_capacity(model.len());
        for sample in model.samples.iter() {
            if sample.vector.len() != n_features {
                return Err(Error::FeatureLength {
                    expected: n_features,
                    actual: sample.vector.len(),
                });
            }
            if sample.vector.iter().any(|v| !v.is_finite()) {
                return Err(Error::Training(format!("non-finite feature in a '{}' sample", sample.label)));
            }
            data.extend_from_slice(&sample.vector);
            labels.push(sample.label);
        }
        let features = Array2::from_shape_vec((labels.len(), n_features), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        let mut classes = labels.clone();
        classes.sort();
        classes.dedup();

        Ok(Self { features, labels, classes })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.features.row(i)
    }

    /// Row indices labelled `class`
    pub fn indices_of(&self, class: LandcoverType) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-column mean and population standard deviation
    pub fn column_stats(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.len() as f64;
        let mut means = Vec::with_capacity(self.n_features());
        let mut stds = Vec::with_capacity(self.n_features());
        for col in self.features.columns() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            means.push(mean);
            stds.push(var.sqrt());
        }
        (means, stds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassifiedFeatureVector;
    use crate::features::{BandSetDescriptor, FeatureParams};
    use approx::assert_relative_eq;

    fn model(samples: Vec<(LandcoverType, Vec<f64>)>) -> ClassificationModel {
        let descriptor =
            BandSetDescriptor::new(vec!["b1".into(), "b2".into()], None, &FeatureParams::default()).unwrap();
        ClassificationModel {
            descriptor,
            samples: samples
                .into_iter()
                .map(|(label, vector)| ClassifiedFeatureVector { label, vector, position: None })
                .collect(),
        }
    }

    #[test]
    fn test_matrix_and_classes() {
        let s = Samples::from_model(&model(vec![
            (LandcoverType::Water, vec![1.0, 2.0]),
            (LandcoverType::Grass, vec![3.0, 4.0]),
            (LandcoverType::Water, vec![5.0, 6.0]),
        ]))
        .unwrap();
        assert_eq!(s.features.dim(), (3, 2));
        assert_eq!(s.classes, vec![LandcoverType::Grass, LandcoverType::Water]);
        assert_eq!(s.indices_of(LandcoverType::Water), vec![0, 2]);

        let (means, stds) = s.column_stats();
        assert_relative_eq!(means[0], 3.0);
        assert_relative_eq!(stds[1], (8.0f64 / 3.0).sqrt());
    }

    #[test]
    fn test_empty_and_ragged_rejected() {
        assert!(Samples::from_model(&model(vec![])).is_err());
        assert!(matches!(
            Samples::from_model(&model(vec![(LandcoverType::Water, vec![1.0])])),
            Err(Error::FeatureLength { expected: 2, actual: 1 })
        ));
    }
}
