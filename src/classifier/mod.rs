//! Seam to the nearest-neighbour classifier.
//!
//! The rest of the crate only trains and queries through [`Classifier`]; the
//! bundled [`KnnClassifier`] is one backend.

pub mod knn;

use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::{pose::FeatureVector, samples::Posture};

pub use knn::KnnClassifier;

/// Label returned for one query, with the share of neighbours that voted for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub label: Posture,
    pub confidence: f64,
}

pub trait Classifier: Send {
    fn add_example(&mut self, features: &FeatureVector, label: Posture) -> Result<()>;

    fn predict_class(&self, features: &FeatureVector) -> Result<Prediction>;

    /// Forget every learned example.
    fn clear_all_classes(&mut self);

    fn example_count(&self) -> usize;

    /// Release backend resources. The instance must not be used afterwards.
    fn dispose(&mut self) {
        self.clear_all_classes();
    }
}

pub type BoxedClassifier = Box<dyn Classifier>;

/// The long-lived model behind live inference.
pub type SharedClassifier = Arc<Mutex<BoxedClassifier>>;

/// Builds fresh, independent models for evaluation runs.
pub type ClassifierFactory = Arc<dyn Fn() -> BoxedClassifier + Send + Sync>;

pub fn shared(classifier: BoxedClassifier) -> SharedClassifier {
    Arc::new(Mutex::new(classifier))
}

pub fn knn_factory(neighbor_count: usize) -> ClassifierFactory {
    Arc::new(move || Box::new(KnnClassifier::new(neighbor_count)) as BoxedClassifier)
}
