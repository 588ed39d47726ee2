pub mod alerts;
pub mod classifier;
#[cfg(feature = "desktop")]
mod commands;
pub mod context;
pub mod db;
pub mod detection;
pub mod error;
pub mod focus;
pub mod pose;
pub mod samples;
pub mod settings;
pub mod storage;
pub mod training;
pub mod utils;

pub use alerts::{AlertSink, DistractionAlert, LogAlertSink};
pub use classifier::{Classifier, KnnClassifier, Prediction};
pub use context::FocusContext;
pub use db::Database;
pub use error::{EvaluationError, TrainingError};
pub use focus::{FocusController, FocusSnapshot, FocusState};
pub use pose::{extract_features, FeatureVector, Landmark, PoseResult};
pub use samples::{Posture, Sample, SampleCounts, SampleStore};
pub use settings::{SettingsStore, TrackerSettings};
pub use storage::{MemoryStorage, SlotStorage};
pub use training::{evaluate, train, AccuracyReport};

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use log::{info, warn};
    use tauri::Manager;

    use crate::{
        alerts::TauriAlertSink,
        commands::{
            add_sample, export_samples, get_focus_state, get_last_accuracy, get_sample_counts,
            get_tracker_settings, list_focus_sessions, pause_focus, reset_samples, save_samples,
            set_tracker_settings, start_focus, submit_pose, test_accuracy, toggle_focus,
            train_model,
        },
        context::FocusContext,
        db::Database,
        detection::{DetectionController, PoseFeed},
        settings::SettingsStore,
        utils::init_logging,
    };

    pub(crate) struct AppState {
        pub(crate) db: Database,
        pub(crate) context: Arc<FocusContext>,
        pub(crate) feed: PoseFeed,
        pub(crate) settings: Arc<SettingsStore>,
        pub(crate) detection: tokio::sync::Mutex<DetectionController>,
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        init_logging();

        info!("FocusGuard starting up...");

        tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let database = Database::new(app_data_dir.join("focusguard.sqlite3"))?;

                    // Close out a session that was running when the app last exited.
                    {
                        let db_for_recovery = database.clone();
                        tauri::async_runtime::block_on(async move {
                            if let Some(id) = db_for_recovery.recover_interrupted_session().await? {
                                warn!("Recovered incomplete focus session {id}; marked as Interrupted");
                            }
                            Ok::<(), anyhow::Error>(())
                        })?;
                    }

                    let settings_store =
                        Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
                    let tracker = settings_store.tracker();

                    let alerts = Arc::new(TauriAlertSink::new(
                        app.handle().clone(),
                        settings_store.clone(),
                    ));
                    let context = Arc::new(FocusContext::new(
                        Arc::new(database.clone()),
                        alerts,
                        tracker.clone(),
                        Some(database.clone()),
                    ));

                    match context.load_samples() {
                        Ok(count) => info!("{count} samples ready"),
                        Err(err) => warn!("Starting with an empty sample store: {err:#}"),
                    }

                    let feed = PoseFeed::new();
                    let mut detection = DetectionController::new();
                    tauri::async_runtime::block_on(async {
                        detection.start(context.clone(), &feed, tracker.poll_interval())
                    })?;

                    app.manage(AppState {
                        db: database,
                        context,
                        feed,
                        settings: settings_store,
                        detection: tokio::sync::Mutex::new(detection),
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                get_sample_counts,
                add_sample,
                save_samples,
                export_samples,
                reset_samples,
                train_model,
                test_accuracy,
                get_last_accuracy,
                start_focus,
                pause_focus,
                toggle_focus,
                get_focus_state,
                submit_pose,
                list_focus_sessions,
                get_tracker_settings,
                set_tracker_settings,
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}
