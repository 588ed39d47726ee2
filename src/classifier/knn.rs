//! Cosine-similarity k-nearest-neighbour classifier.
//!
//! Mirrors the browser knn-classifier the sample files were first collected
//! with: examples are kept verbatim, queries vote among the `k` most similar
//! examples, and confidence is the winning share of those votes.

use anyhow::{anyhow, bail, Result};

use crate::{pose::FeatureVector, samples::Posture};

use super::{Classifier, Prediction};

pub const DEFAULT_NEIGHBOR_COUNT: usize = 3;

struct Example {
    values: Vec<f64>,
    norm: f64,
    label: Posture,
}

pub struct KnnClassifier {
    k: usize,
    examples: Vec<Example>,
    dimension: Option<usize>,
    disposed: bool,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBOR_COUNT)
    }
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            examples: Vec::new(),
            dimension: None,
            disposed: false,
        }
    }

    pub fn neighbor_count(&self) -> usize {
        self.k
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.disposed {
            bail!("classifier has been disposed");
        }
        Ok(())
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != len => Err(anyhow!(
                "feature length {len} does not match trained length {expected}"
            )),
            _ => Ok(()),
        }
    }
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn cosine_similarity(a: &[f64], a_norm: f64, b: &[f64], b_norm: f64) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

impl Classifier for KnnClassifier {
    fn add_example(&mut self, features: &FeatureVector, label: Posture) -> Result<()> {
        self.ensure_usable()?;
        if features.is_empty() {
            bail!("cannot learn from an empty feature vector");
        }
        self.check_dimension(features.len())?;

        let values = features.as_slice().to_vec();
        self.examples.push(Example {
            norm: norm(&values),
            values,
            label,
        });
        self.dimension = Some(features.len());
        Ok(())
    }

    fn predict_class(&self, features: &FeatureVector) -> Result<Prediction> {
        self.ensure_usable()?;
        if self.examples.is_empty() {
            bail!("classifier has no examples");
        }
        self.check_dimension(features.len())?;

        let query = features.as_slice();
        let query_norm = norm(query);

        let mut scored: Vec<(f64, Posture)> = self
            .examples
            .iter()
            .map(|example| {
                (
                    cosine_similarity(query, query_norm, &example.values, example.norm),
                    example.label,
                )
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let k = self.k.min(scored.len());
        let mut votes = [0usize; 2];
        let mut similarity = [0f64; 2];
        for (score, label) in &scored[..k] {
            let slot = match label {
                Posture::Concentrated => 0,
                Posture::Distracted => 1,
            };
            votes[slot] += 1;
            similarity[slot] += score;
        }

        // Ties go to the class whose neighbours were closer overall.
        let winner = if votes[0] != votes[1] {
            if votes[0] > votes[1] {
                0
            } else {
                1
            }
        } else if similarity[1] > similarity[0] {
            1
        } else {
            0
        };

        Ok(Prediction {
            label: Posture::ALL[winner],
            confidence: votes[winner] as f64 / k as f64,
        })
    }

    fn clear_all_classes(&mut self) {
        self.examples.clear();
        self.dimension = None;
    }

    fn example_count(&self) -> usize {
        self.examples.len()
    }

    fn dispose(&mut self) {
        self.clear_all_classes();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: &[f64]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    fn trained() -> KnnClassifier {
        let mut knn = KnnClassifier::default();
        knn.add_example(&fv(&[1.0, 0.0, 0.1]), Posture::Concentrated).unwrap();
        knn.add_example(&fv(&[0.9, 0.1, 0.0]), Posture::Concentrated).unwrap();
        knn.add_example(&fv(&[1.0, 0.05, 0.05]), Posture::Concentrated).unwrap();
        knn.add_example(&fv(&[0.0, 1.0, 0.1]), Posture::Distracted).unwrap();
        knn.add_example(&fv(&[0.1, 0.9, 0.0]), Posture::Distracted).unwrap();
        knn.add_example(&fv(&[0.05, 1.0, 0.05]), Posture::Distracted).unwrap();
        knn
    }

    #[test]
    fn predicts_nearest_class() {
        let knn = trained();

        let prediction = knn.predict_class(&fv(&[0.95, 0.02, 0.0])).unwrap();
        assert_eq!(prediction.label, Posture::Concentrated);
        assert!((prediction.confidence - 1.0).abs() < f64::EPSILON);

        let prediction = knn.predict_class(&fv(&[0.02, 0.95, 0.0])).unwrap();
        assert_eq!(prediction.label, Posture::Distracted);
    }

    #[test]
    fn confidence_is_vote_share() {
        let mut knn = KnnClassifier::new(3);
        knn.add_example(&fv(&[1.0, 0.0]), Posture::Concentrated).unwrap();
        knn.add_example(&fv(&[0.9, 0.1]), Posture::Concentrated).unwrap();
        knn.add_example(&fv(&[0.8, 0.3]), Posture::Distracted).unwrap();
        knn.add_example(&fv(&[0.0, 1.0]), Posture::Distracted).unwrap();

        let prediction = knn.predict_class(&fv(&[1.0, 0.05])).unwrap();
        assert_eq!(prediction.label, Posture::Concentrated);
        assert!((prediction.confidence - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn single_class_model_always_predicts_that_class() {
        let mut knn = KnnClassifier::default();
        knn.add_example(&fv(&[1.0, 0.0]), Posture::Distracted).unwrap();
        let prediction = knn.predict_class(&fv(&[0.0, 1.0])).unwrap();
        assert_eq!(prediction.label, Posture::Distracted);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut knn = trained();
        assert!(knn.predict_class(&fv(&[1.0, 0.0])).is_err());
        assert!(knn.add_example(&fv(&[1.0]), Posture::Concentrated).is_err());
    }

    #[test]
    fn empty_model_cannot_predict() {
        let knn = KnnClassifier::default();
        assert!(knn.predict_class(&fv(&[1.0, 0.0])).is_err());
    }

    #[test]
    fn clearing_allows_new_dimension() {
        let mut knn = trained();
        knn.clear_all_classes();
        assert_eq!(knn.example_count(), 0);
        assert_eq!(knn.dimension(), None);
        knn.add_example(&fv(&[1.0, 2.0]), Posture::Concentrated).unwrap();
        assert_eq!(knn.dimension(), Some(2));
    }

    #[test]
    fn disposed_model_refuses_work() {
        let mut knn = trained();
        knn.dispose();
        assert_eq!(knn.example_count(), 0);
        assert!(knn.add_example(&fv(&[1.0, 0.0, 0.0]), Posture::Concentrated).is_err());
        assert!(knn.predict_class(&fv(&[1.0, 0.0, 0.0])).is_err());
    }

    #[test]
    fn zero_k_is_treated_as_one() {
        assert_eq!(KnnClassifier::new(0).neighbor_count(), 1);
    }
}
