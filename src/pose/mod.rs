pub mod features;
pub mod landmarks;

pub use features::{extract_features, FeatureVector, VALUES_PER_LANDMARK};
pub use landmarks::{Landmark, PoseError, PoseResult, POSE_LANDMARK_COUNT};
