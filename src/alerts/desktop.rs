use std::sync::Arc;

use log::warn;
use serde::Serialize;
use tauri::{AppHandle, Emitter};

use crate::settings::SettingsStore;

use super::{AlertSink, DistractionAlert, LogAlertSink, ToneHandle, ALERT_TITLE};

pub const ALERT_EVENT: &str = "distraction-alert";
pub const ALERT_DISMISSED_EVENT: &str = "distraction-alert-dismissed";
/// The webview shows a system notification if the user granted permission.
pub const NOTIFICATION_EVENT: &str = "focus-notification";

#[derive(Serialize, Clone)]
struct NotificationPayload<'a> {
    title: &'a str,
    body: &'a str,
}

/// Forwards alerts to the webview and plays the alert tone.
///
/// Every alert is also written to the log.
pub struct TauriAlertSink {
    app_handle: AppHandle,
    settings: Arc<SettingsStore>,
    tone: ToneHandle,
    log: LogAlertSink,
}

impl TauriAlertSink {
    pub fn new(app_handle: AppHandle, settings: Arc<SettingsStore>) -> Self {
        Self {
            app_handle,
            settings,
            tone: ToneHandle::new(),
            log: LogAlertSink,
        }
    }
}

impl AlertSink for TauriAlertSink {
    fn raise(&self, alert: &DistractionAlert) {
        self.log.raise(alert);
        if let Err(err) = self.app_handle.emit(ALERT_EVENT, alert) {
            warn!("Failed to emit {ALERT_EVENT}: {err}");
        }

        let settings = self.settings.tracker();
        if settings.notifications_enabled {
            let payload = NotificationPayload {
                title: ALERT_TITLE,
                body: &alert.message,
            };
            if let Err(err) = self.app_handle.emit(NOTIFICATION_EVENT, payload) {
                warn!("Failed to emit {NOTIFICATION_EVENT}: {err}");
            }
        }
        if settings.alert_sound_enabled {
            if let Err(err) = self.tone.play() {
                warn!("Alert tone unavailable: {err}");
            }
        }
    }

    fn dismiss(&self) {
        self.log.dismiss();
        if let Err(err) = self.app_handle.emit(ALERT_DISMISSED_EVENT, ()) {
            warn!("Failed to emit {ALERT_DISMISSED_EVENT}: {err}");
        }
        self.tone.stop();
    }
}
