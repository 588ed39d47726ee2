//! Holdout accuracy test on a throwaway classifier.

use anyhow::Result;
use log::{error, info, warn};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

use crate::{
    classifier::{BoxedClassifier, Classifier},
    error::EvaluationError,
    samples::{Posture, Sample, SampleCounts},
};

use super::trainer::add_examples;

/// Smallest store for which an 80/20 split leaves a usable test set.
pub const MIN_EVALUATION_SAMPLES: usize = 6;

/// Number of shuffled samples used for training: `floor(0.8 * total)`.
pub fn split_index(total: usize) -> usize {
    total * 4 / 5
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfusionCounts {
    pub true_concentrated: usize,
    pub false_concentrated: usize,
    pub true_distracted: usize,
    pub false_distracted: usize,
}

impl ConfusionCounts {
    /// Tally one prediction. Returns whether it was correct.
    ///
    /// A missed concentrated sample counts as a false distracted prediction and
    /// vice versa.
    pub fn record(&mut self, actual: Posture, predicted: Posture) -> bool {
        match (actual, predicted) {
            (Posture::Concentrated, Posture::Concentrated) => self.true_concentrated += 1,
            (Posture::Concentrated, Posture::Distracted) => self.false_distracted += 1,
            (Posture::Distracted, Posture::Distracted) => self.true_distracted += 1,
            (Posture::Distracted, Posture::Concentrated) => self.false_concentrated += 1,
        }
        actual == predicted
    }

    pub fn correct(&self) -> usize {
        self.true_concentrated + self.true_distracted
    }

    pub fn total(&self) -> usize {
        self.true_concentrated + self.false_concentrated + self.true_distracted + self.false_distracted
    }

    /// Rows are the actual posture, columns the predicted one, both ordered
    /// concentrated then distracted.
    pub fn matrix(&self) -> [[usize; 2]; 2] {
        [
            [self.true_concentrated, self.false_distracted],
            [self.false_concentrated, self.true_distracted],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    pub train_size: usize,
    pub test_size: usize,
    pub correct: usize,
    pub accuracy_pct: f64,
    pub confusion: ConfusionCounts,
    /// `confusion` as a 2x2 grid, rows actual and columns predicted.
    pub matrix: [[usize; 2]; 2],
    pub training_counts: SampleCounts,
}

impl AccuracyReport {
    /// Accuracy with one decimal, e.g. `83.3%`.
    pub fn accuracy_label(&self) -> String {
        format!("{:.1}%", self.accuracy_pct)
    }

    pub fn summary(&self) -> String {
        format!(
            "Accuracy: {} ({} of {} correct)",
            self.accuracy_label(),
            self.correct,
            self.test_size
        )
    }
}

/// Disposes the wrapped model when dropped, on success, error and unwind alike.
struct EvaluationModel(BoxedClassifier);

impl Drop for EvaluationModel {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Shuffle a copy of `samples`, train a fresh model on the first 80% and score
/// it on the rest.
///
/// The training subset is not checked for per-class coverage; a shuffle that
/// leaves a posture out still produces a report, only a degenerate one.
pub fn evaluate<R: Rng + ?Sized>(
    samples: &[Sample],
    factory: &dyn Fn() -> BoxedClassifier,
    rng: &mut R,
) -> Result<AccuracyReport, EvaluationError> {
    let total = samples.len();
    if total < MIN_EVALUATION_SAMPLES {
        return Err(EvaluationError::NotEnoughSamples {
            total,
            required: MIN_EVALUATION_SAMPLES,
        });
    }

    let mut shuffled = samples.to_vec();
    shuffled.shuffle(rng);
    let (train_set, test_set) = shuffled.split_at(split_index(total));

    let training_counts = SampleCounts::tally(train_set);
    for posture in Posture::ALL {
        if training_counts.get(posture) == 0 {
            warn!("Accuracy test training subset has no {posture} samples");
        }
    }

    let mut model = EvaluationModel(factory());
    let outcome = score(model.0.as_mut(), train_set, test_set);
    drop(model);

    let confusion = outcome.map_err(|err| {
        error!("Accuracy test failed: {err:#}");
        EvaluationError::Failed(format!("{err:#}"))
    })?;

    let correct = confusion.correct();
    let report = AccuracyReport {
        train_size: train_set.len(),
        test_size: test_set.len(),
        correct,
        accuracy_pct: correct as f64 / test_set.len() as f64 * 100.0,
        confusion,
        matrix: confusion.matrix(),
        training_counts,
    };

    info!("{}", report.summary());
    Ok(report)
}

fn score(model: &mut dyn Classifier, train_set: &[Sample], test_set: &[Sample]) -> Result<ConfusionCounts> {
    add_examples(train_set, model)?;

    let mut confusion = ConfusionCounts::default();
    for sample in test_set {
        let prediction = model.predict_class(&sample.features)?;
        confusion.record(sample.label, prediction.label);
    }
    Ok(confusion)
}
