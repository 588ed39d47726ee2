//! Flattening of a detected pose into classifier input.
//!
//! Layout: `[x0, y0, vis0, x1, y1, vis1, ...]` in detector landmark order.

use serde::{Deserialize, Serialize};

use super::PoseResult;

/// Values contributed by each landmark.
pub const VALUES_PER_LANDMARK: usize = 3;

/// Classifier input for one pose.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extract the feature vector for a detected pose.
///
/// Returns `None` when no pose was detected; that is a normal state and
/// callers skip dependent work rather than treating it as an error.
pub fn extract_features(pose: Option<&PoseResult>) -> Option<FeatureVector> {
    let pose = pose?;
    let mut values = Vec::with_capacity(pose.len() * VALUES_PER_LANDMARK);
    for landmark in pose.landmarks() {
        values.push(landmark.x);
        values.push(landmark.y);
        values.push(landmark.visibility);
    }
    Some(FeatureVector(values))
}
