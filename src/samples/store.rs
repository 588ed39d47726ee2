use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::{pose::FeatureVector, storage::SlotStorage};

use super::{Posture, Sample, SampleCounts};

/// Pretty-printed sample file ready to hand to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
    pub sample_count: usize,
}

/// Ordered collection of labelled samples mirrored to one durable slot.
///
/// Every mutation rewrites the whole slot; there is no incremental diffing.
pub struct SampleStore {
    samples: Vec<Sample>,
    storage: Arc<dyn SlotStorage>,
    key: String,
}

impl SampleStore {
    pub fn new(storage: Arc<dyn SlotStorage>, key: impl Into<String>) -> Self {
        Self {
            samples: Vec::new(),
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn counts(&self) -> SampleCounts {
        SampleCounts::tally(&self.samples)
    }

    /// Append a sample for the current pose.
    ///
    /// Without current features this is a no-op and returns `None`. Otherwise
    /// the store is persisted and the updated counts are returned. A failed
    /// write is logged; the sample stays in memory and goes out with the next
    /// successful persist.
    pub fn add(&mut self, features: Option<&FeatureVector>, label: Posture) -> Option<SampleCounts> {
        let features = features?;
        self.samples.push(Sample::new(features.clone(), label));

        if let Err(err) = self.persist() {
            warn!("Failed to persist samples after adding {label}: {err:#}");
        }

        Some(self.counts())
    }

    /// Overwrite the durable slot with the full in-memory sequence.
    pub fn persist(&self) -> Result<()> {
        let serialized =
            serde_json::to_string(&self.samples).context("failed to serialize samples")?;
        self.storage
            .set(&self.key, serialized)
            .with_context(|| format!("failed to write slot {}", self.key))
    }

    /// Replace the in-memory sequence with the durable slot's content.
    ///
    /// A missing or blank slot leaves the store empty. Malformed content is an
    /// error and also leaves the store empty; the slot itself is untouched.
    pub fn load(&mut self) -> Result<usize> {
        let raw = self
            .storage
            .get(&self.key)
            .with_context(|| format!("failed to read slot {}", self.key))?;

        self.samples = match raw {
            Some(text) if !text.trim().is_empty() => match serde_json::from_str(&text) {
                Ok(samples) => samples,
                Err(err) => {
                    self.samples.clear();
                    return Err(err).with_context(|| format!("slot {} is malformed", self.key));
                }
            },
            _ => Vec::new(),
        };

        info!("Loaded {} samples from {}", self.samples.len(), self.key);
        Ok(self.samples.len())
    }

    /// Drop every sample, in memory and on disk, once `confirm` agrees.
    ///
    /// Returns whether the reset happened. Memory is cleared before the slot so
    /// a failed slot removal still leaves the live store empty; the next
    /// persist then overwrites the stale slot.
    pub fn reset(&mut self, confirm: impl FnOnce() -> bool) -> Result<bool> {
        if !confirm() {
            return Ok(false);
        }

        self.samples.clear();
        self.storage
            .remove(&self.key)
            .with_context(|| format!("failed to clear slot {}", self.key))?;

        info!("Sample store {} reset", self.key);
        Ok(true)
    }

    /// Pretty-printed JSON of all samples, named after `date`.
    ///
    /// Returns `None` when there is nothing to export.
    pub fn export(&self, date: NaiveDate) -> Result<Option<ExportFile>> {
        if self.samples.is_empty() {
            return Ok(None);
        }

        let contents =
            serde_json::to_string_pretty(&self.samples).context("failed to serialize export")?;

        Ok(Some(ExportFile {
            file_name: format!("{}_{}.json", self.key, date.format("%Y-%m-%d")),
            contents,
            sample_count: self.samples.len(),
        }))
    }

    pub fn export_today(&self) -> Result<Option<ExportFile>> {
        self.export(Utc::now().date_naive())
    }
}
