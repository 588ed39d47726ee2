//! Failures callers branch on.
//!
//! Plumbing errors (storage, database, classifier backend) travel as
//! `anyhow::Error`; these types cover the outcomes the UI reports specifically.

use std::fmt;

use crate::samples::{Posture, SampleCounts};

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// At least one posture has fewer than `required` samples.
    InsufficientSamples {
        counts: SampleCounts,
        required: usize,
    },
    /// Sample `index` does not have the same feature length as the first sample.
    InconsistentFeatures {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// The classifier backend rejected an example.
    Classifier(String),
}

impl TrainingError {
    /// Postures below the threshold, with how many samples each still needs.
    pub fn shortfalls(&self) -> Vec<(Posture, usize)> {
        match self {
            TrainingError::InsufficientSamples { counts, required } => Posture::ALL
                .iter()
                .filter_map(|posture| {
                    let have = counts.get(*posture);
                    (have < *required).then(|| (*posture, required - have))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::InsufficientSamples { counts, required } => {
                write!(
                    f,
                    "at least {required} samples of each posture are required ({} concentrated, {} distracted)",
                    counts.concentrated, counts.distracted
                )?;
                let missing: Vec<String> = self
                    .shortfalls()
                    .into_iter()
                    .map(|(posture, short)| format!("{short} more {posture}"))
                    .collect();
                if !missing.is_empty() {
                    write!(f, "; need {}", missing.join(" and "))?;
                }
                Ok(())
            }
            TrainingError::InconsistentFeatures {
                index,
                expected,
                found,
            } => write!(
                f,
                "sample {index} has {found} features but earlier samples have {expected}"
            ),
            TrainingError::Classifier(message) => write!(f, "training failed: {message}"),
        }
    }
}

impl std::error::Error for TrainingError {}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    NotEnoughSamples { total: usize, required: usize },
    /// Anything that went wrong while training or querying the evaluation model.
    Failed(String),
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::NotEnoughSamples { total, required } => write!(
                f,
                "at least {required} samples are required for an accuracy test (have {total})"
            ),
            EvaluationError::Failed(_) => write!(f, "accuracy test failed"),
        }
    }
}

impl std::error::Error for EvaluationError {}
