//! Typed pose records received from the pose detector.
//!
//! The detector runs outside Rust (MediaPipe in the webview) and hands back
//! loosely shaped objects. Everything crosses into the crate through
//! [`PoseResult::new`], which rejects values the rest of the pipeline cannot use.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of landmarks reported by the MediaPipe pose model.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// A single detected body keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    /// Horizontal position, normalized to the frame width.
    pub x: f64,
    /// Vertical position, normalized to the frame height.
    pub y: f64,
    /// Relative depth. Reported by the detector but not used for features.
    #[serde(default)]
    pub z: f64,
    /// Detector confidence that the keypoint is visible, in `[0, 1]`.
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoseError {
    /// The detector reported a pose with no landmarks.
    Empty,
    /// A coordinate or confidence was NaN or infinite.
    NonFinite { index: usize },
    /// Visibility outside `[0, 1]`.
    VisibilityOutOfRange { index: usize, value: f64 },
}

impl fmt::Display for PoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseError::Empty => write!(f, "pose contains no landmarks"),
            PoseError::NonFinite { index } => {
                write!(f, "landmark {index} contains a non-finite value")
            }
            PoseError::VisibilityOutOfRange { index, value } => {
                write!(f, "landmark {index} has visibility {value} outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for PoseError {}

/// Validated, ordered landmarks for one detected pose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseResult {
    landmarks: Vec<Landmark>,
}

impl PoseResult {
    /// Validate raw detector output.
    ///
    /// `x` and `y` are deliberately not range-checked: the detector reports
    /// keypoints that fall just outside the frame with coordinates slightly
    /// beyond the unit square.
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, PoseError> {
        if landmarks.is_empty() {
            return Err(PoseError::Empty);
        }

        for (index, landmark) in landmarks.iter().enumerate() {
            let finite = landmark.x.is_finite()
                && landmark.y.is_finite()
                && landmark.z.is_finite()
                && landmark.visibility.is_finite();
            if !finite {
                return Err(PoseError::NonFinite { index });
            }
            if !(0.0..=1.0).contains(&landmark.visibility) {
                return Err(PoseError::VisibilityOutOfRange {
                    index,
                    value: landmark.visibility,
                });
            }
        }

        Ok(Self { landmarks })
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

impl TryFrom<Vec<Landmark>> for PoseResult {
    type Error = PoseError;

    fn try_from(landmarks: Vec<Landmark>) -> Result<Self, Self::Error> {
        Self::new(landmarks)
    }
}
