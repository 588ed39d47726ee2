use log::info;
use serde::Serialize;

use crate::{
    classifier::Classifier,
    error::TrainingError,
    samples::{Sample, SampleCounts},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub counts: SampleCounts,
    pub feature_len: usize,
}

impl TrainingSummary {
    pub fn sample_count(&self) -> usize {
        self.counts.total()
    }
}

/// Check that every sample has the feature length of the first one.
pub(crate) fn uniform_feature_len(samples: &[Sample]) -> Result<usize, TrainingError> {
    let expected = samples.first().map(|s| s.features.len()).unwrap_or(0);
    for (index, sample) in samples.iter().enumerate() {
        if sample.features.len() != expected {
            return Err(TrainingError::InconsistentFeatures {
                index,
                expected,
                found: sample.features.len(),
            });
        }
    }
    Ok(expected)
}

/// Add every sample to `model`, without any class-count gate.
pub(crate) fn add_examples(
    samples: &[Sample],
    model: &mut dyn Classifier,
) -> anyhow::Result<()> {
    for sample in samples {
        model.add_example(&sample.features, sample.label)?;
    }
    Ok(())
}

/// Retrain the live model from scratch on `samples`.
///
/// Both postures need at least `min_per_class` samples. Every check runs
/// before the model is touched, so a rejected call leaves it as it was.
pub fn train(
    samples: &[Sample],
    model: &mut dyn Classifier,
    min_per_class: usize,
) -> Result<TrainingSummary, TrainingError> {
    let counts = SampleCounts::tally(samples);
    if counts.concentrated < min_per_class || counts.distracted < min_per_class {
        return Err(TrainingError::InsufficientSamples {
            counts,
            required: min_per_class,
        });
    }

    let feature_len = uniform_feature_len(samples)?;

    model.clear_all_classes();
    if let Err(err) = add_examples(samples, model) {
        model.clear_all_classes();
        return Err(TrainingError::Classifier(format!("{err:#}")));
    }

    info!(
        "Model trained with {} samples ({} concentrated, {} distracted)",
        counts.total(),
        counts.concentrated,
        counts.distracted
    );

    Ok(TrainingSummary {
        counts,
        feature_len,
    })
}
