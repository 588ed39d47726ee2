//! Where a fired distraction alert goes.

#[cfg(feature = "desktop")]
mod desktop;
#[cfg(feature = "sound")]
pub mod tone;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

#[cfg(feature = "desktop")]
pub use desktop::TauriAlertSink;
#[cfg(feature = "sound")]
pub use tone::{AlertTone, ToneHandle};

pub const ALERT_TITLE: &str = "Distraction Alert";
pub const ALERT_MESSAGE: &str = "Stay focused! You've been distracted for a while.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistractionAlert {
    pub session_id: Option<String>,
    /// Time spent distracted before the alert fired.
    pub distracted_for_ms: u64,
    pub raised_at: DateTime<Utc>,
    pub message: String,
}

impl DistractionAlert {
    pub fn new(session_id: Option<String>, distracted_for_ms: u64) -> Self {
        Self {
            session_id,
            distracted_for_ms,
            raised_at: Utc::now(),
            message: ALERT_MESSAGE.to_string(),
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &DistractionAlert);

    /// Take down the visual banner, if one is showing.
    fn dismiss(&self);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: &DistractionAlert) {
        warn!(
            "{} after {} ms (session {})",
            alert.message,
            alert.distracted_for_ms,
            alert.session_id.as_deref().unwrap_or("-")
        );
    }

    fn dismiss(&self) {
        info!("Distraction banner dismissed");
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn new_alert_carries_the_standard_message() {
        let alert = DistractionAlert::new(Some("s-1".into()), 5_000);
        assert_eq!(alert.message, ALERT_MESSAGE);
        assert_eq!(alert.distracted_for_ms, 5_000);
        assert_eq!(alert.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn log_sink_handles_alerts_without_a_session() {
        crate::utils::logging::init_test_logging();
        let sink: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
        sink.raise(&DistractionAlert::new(None, 5_000));
        sink.dismiss();
    }
}
