use std::path::PathBuf;

use tauri::{AppHandle, Emitter, Manager, State};

use crate::{
    db::FocusSession,
    focus::FocusSnapshot,
    pose::{Landmark, PoseResult},
    samples::{Posture, SampleCounts},
    settings::TrackerSettings,
    training::{AccuracyReport, TrainingSummary},
    AppState,
};

const DEFAULT_SESSION_PAGE: usize = 20;

#[derive(serde::Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub path: String,
    pub sample_count: usize,
}

#[tauri::command]
pub fn get_sample_counts(state: State<'_, AppState>) -> SampleCounts {
    state.context.counts()
}

/// `None` when no pose is currently detected.
#[tauri::command]
pub fn add_sample(label: Posture, state: State<'_, AppState>) -> Option<SampleCounts> {
    state.context.add_sample(label)
}

#[tauri::command]
pub fn save_samples(state: State<'_, AppState>) -> Result<SampleCounts, String> {
    state.context.save().map_err(|e| format!("{e:#}"))
}

/// Write the collection as JSON into the download directory.
#[tauri::command]
pub fn export_samples(
    app_handle: AppHandle,
    state: State<'_, AppState>,
) -> Result<Option<ExportResult>, String> {
    let Some(export) = state.context.export_today().map_err(|e| e.to_string())? else {
        return Ok(None);
    };

    let dir: PathBuf = app_handle
        .path()
        .download_dir()
        .map_err(|e| e.to_string())?;
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let path = dir.join(&export.file_name);
    std::fs::write(&path, export.contents.as_bytes()).map_err(|e| e.to_string())?;

    log::info!("Exported {} samples to {}", export.sample_count, path.display());
    Ok(Some(ExportResult {
        path: path.display().to_string(),
        sample_count: export.sample_count,
    }))
}

/// The webview asks the user first and passes the answer along.
#[tauri::command]
pub async fn reset_samples(confirmed: bool, state: State<'_, AppState>) -> Result<bool, String> {
    state
        .context
        .reset(|| confirmed)
        .await
        .map_err(|e| format!("{e:#}"))
}

#[tauri::command]
pub fn train_model(state: State<'_, AppState>) -> Result<TrainingSummary, String> {
    state.context.train().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn test_accuracy(state: State<'_, AppState>) -> Result<AccuracyReport, String> {
    state.context.test_accuracy().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_last_accuracy(state: State<'_, AppState>) -> Option<AccuracyReport> {
    state.context.last_accuracy()
}

#[tauri::command]
pub async fn start_focus(state: State<'_, AppState>) -> Result<FocusSnapshot, String> {
    state.context.start().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn pause_focus(state: State<'_, AppState>) -> Result<FocusSnapshot, String> {
    state.context.pause().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_focus(state: State<'_, AppState>) -> Result<FocusSnapshot, String> {
    state.context.toggle().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_focus_state(state: State<'_, AppState>) -> Result<FocusSnapshot, String> {
    Ok(state.context.snapshot().await)
}

/// Latest detector output. Landmarks that fail validation count as no pose.
#[tauri::command]
pub fn submit_pose(
    landmarks: Option<Vec<Landmark>>,
    state: State<'_, AppState>,
) -> Result<(), String> {
    match landmarks.map(PoseResult::new).transpose() {
        Ok(pose) => {
            state.feed.publish(pose);
            Ok(())
        }
        Err(err) => {
            state.feed.publish(None);
            Err(err.to_string())
        }
    }
}

#[tauri::command]
pub async fn list_focus_sessions(
    limit: Option<usize>,
    state: State<'_, AppState>,
) -> Result<Vec<FocusSession>, String> {
    state
        .db
        .list_focus_sessions(limit.unwrap_or(DEFAULT_SESSION_PAGE))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_tracker_settings(state: State<'_, AppState>) -> TrackerSettings {
    state.settings.tracker()
}

#[tauri::command]
pub async fn set_tracker_settings(
    settings: TrackerSettings,
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<(), String> {
    let previous = state.settings.tracker();
    state
        .settings
        .update_tracker(settings.clone())
        .map_err(|e| e.to_string())?;
    state.context.apply_settings(settings.clone()).await;

    if previous.poll_interval_ms != settings.poll_interval_ms {
        let mut detection = state.detection.lock().await;
        detection.stop().await.map_err(|e| e.to_string())?;
        detection
            .start(state.context.clone(), &state.feed, settings.poll_interval())
            .map_err(|e| e.to_string())?;
    }

    app_handle
        .emit("tracker-settings-updated", &settings)
        .map_err(|e| e.to_string())?;

    Ok(())
}
