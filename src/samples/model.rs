use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pose::FeatureVector;

/// The two postures the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Posture {
    Concentrated,
    Distracted,
}

impl Posture {
    pub const ALL: [Posture; 2] = [Posture::Concentrated, Posture::Distracted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Posture::Concentrated => "concentrated",
            Posture::Distracted => "distracted",
        }
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled pose captured in collection mode.
///
/// The feature field is stored as `pose` so exports stay readable by the
/// browser tool that produced the first sample files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "pose")]
    pub features: FeatureVector,
    pub label: Posture,
}

impl Sample {
    pub fn new(features: FeatureVector, label: Posture) -> Self {
        Self { features, label }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleCounts {
    pub concentrated: usize,
    pub distracted: usize,
}

impl SampleCounts {
    pub fn tally<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        samples
            .into_iter()
            .fold(Self::default(), |mut counts, sample| {
                counts.increment(sample.label);
                counts
            })
    }

    pub fn get(&self, posture: Posture) -> usize {
        match posture {
            Posture::Concentrated => self.concentrated,
            Posture::Distracted => self.distracted,
        }
    }

    pub fn increment(&mut self, posture: Posture) {
        match posture {
            Posture::Concentrated => self.concentrated += 1,
            Posture::Distracted => self.distracted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.concentrated + self.distracted
    }
}
