use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerSettings {
    /// Samples of each posture required before the live model can be trained.
    pub min_samples_per_class: usize,
    /// How long a distracted posture must persist before an alert fires.
    pub alert_delay_ms: u64,
    /// How long the on-screen alert banner stays up.
    pub banner_duration_ms: u64,
    /// Period of the pose polling loop.
    pub poll_interval_ms: u64,
    /// Durable slot holding the collected samples; also the export file prefix.
    pub storage_key: String,
    /// Neighbours consulted per prediction.
    pub neighbor_count: usize,
    pub notifications_enabled: bool,
    pub alert_sound_enabled: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            min_samples_per_class: 3,
            alert_delay_ms: 5_000,
            banner_duration_ms: 5_000,
            poll_interval_ms: 100,
            storage_key: "focusguard-samples".into(),
            neighbor_count: 3,
            notifications_enabled: true,
            alert_sound_enabled: true,
        }
    }
}

impl TrackerSettings {
    pub fn alert_delay(&self) -> Duration {
        Duration::from_millis(self.alert_delay_ms)
    }

    pub fn banner_duration(&self) -> Duration {
        Duration::from_millis(self.banner_duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    tracker: TrackerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn tracker(&self) -> TrackerSettings {
        self.read().tracker.clone()
    }

    pub fn update_tracker(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = self.write();
        guard.tracker = settings;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "focusguard-settings-{}-{}",
            std::process::id(),
            name
        ));
        fs::create_dir_all(&dir).unwrap();
        dir.join("settings.json")
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = scratch_path("missing");
        let _ = fs::remove_file(&path);
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.tracker(), TrackerSettings::default());
        assert_eq!(store.tracker().alert_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = scratch_path("partial");
        fs::write(&path, r#"{"tracker":{"minSamplesPerClass":20}}"#).unwrap();

        let tracker = SettingsStore::new(path).unwrap().tracker();
        assert_eq!(tracker.min_samples_per_class, 20);
        assert_eq!(tracker.poll_interval_ms, 100);
        assert_eq!(tracker.storage_key, "focusguard-samples");
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let path = scratch_path("garbage");
        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.tracker(), TrackerSettings::default());
    }

    #[test]
    fn updates_are_written_back() {
        let path = scratch_path("update");
        let _ = fs::remove_file(&path);
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut tracker = store.tracker();
        tracker.alert_sound_enabled = false;
        tracker.alert_delay_ms = 8_000;
        store.update_tracker(tracker.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.tracker(), tracker);
    }
}
