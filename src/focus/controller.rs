use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::{
    alerts::{AlertSink, DistractionAlert},
    classifier::{Prediction, SharedClassifier},
    db::{Database, FocusSession},
    pose::FeatureVector,
    samples::Posture,
    settings::TrackerSettings,
};

use super::state::{apply, FocusEvent, FocusState, TimerAction};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub state: FocusState,
    pub last_prediction: Option<Prediction>,
    pub session_id: Option<String>,
    pub alert_count: u64,
    pub banner_visible: bool,
}

#[derive(Default)]
struct FocusInner {
    state: FocusState,
    session_id: Option<String>,
    last_prediction: Option<Prediction>,
    alert_count: u64,
    concentrated_frames: u64,
    distracted_frames: u64,
    distracted_since: Option<Instant>,
    alert_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the alert timer is armed or cancelled.
    alert_epoch: u64,
    banner_timer: Option<JoinHandle<()>>,
    banner_epoch: u64,
    banner_visible: bool,
    alert_delay: Duration,
    banner_duration: Duration,
}

impl FocusInner {
    fn snapshot(&self) -> FocusSnapshot {
        FocusSnapshot {
            state: self.state,
            last_prediction: self.last_prediction,
            session_id: self.session_id.clone(),
            alert_count: self.alert_count,
            banner_visible: self.banner_visible,
        }
    }

    fn cancel_alert_timer(&mut self) {
        if let Some(handle) = self.alert_timer.take() {
            handle.abort();
        }
        self.alert_epoch = self.alert_epoch.wrapping_add(1);
    }

    fn cancel_banner_timer(&mut self) {
        if let Some(handle) = self.banner_timer.take() {
            handle.abort();
        }
        self.banner_epoch = self.banner_epoch.wrapping_add(1);
    }
}

struct SessionTally {
    id: String,
    concentrated_frames: u64,
    distracted_frames: u64,
}

/// Clears the busy flag when the in-flight classification ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives the distraction state machine for live inference.
///
/// Owns the alert and banner timers; each is a spawned sleep that is aborted
/// on the transition that cancels it.
#[derive(Clone)]
pub struct FocusController {
    inner: Arc<Mutex<FocusInner>>,
    classifier: SharedClassifier,
    alerts: Arc<dyn AlertSink>,
    busy: Arc<AtomicBool>,
    db: Option<Database>,
}

impl FocusController {
    pub fn new(
        classifier: SharedClassifier,
        alerts: Arc<dyn AlertSink>,
        settings: &TrackerSettings,
        db: Option<Database>,
    ) -> Self {
        let inner = FocusInner {
            alert_delay: settings.alert_delay(),
            banner_duration: settings.banner_duration(),
            ..FocusInner::default()
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            classifier,
            alerts,
            busy: Arc::new(AtomicBool::new(false)),
            db,
        }
    }

    /// Takes effect for timers armed after the call.
    pub async fn configure(&self, settings: &TrackerSettings) {
        let mut inner = self.inner.lock().await;
        inner.alert_delay = settings.alert_delay();
        inner.banner_duration = settings.banner_duration();
    }

    pub async fn snapshot(&self) -> FocusSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.state.is_active()
    }

    /// Begin live inference. The caller is expected to have trained the model.
    ///
    /// The state lock is held across the history insert, so a concurrent
    /// start waits and is then rejected without writing a row.
    pub async fn start(&self) -> Result<FocusSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_active() {
            bail!("focus session already active");
        }

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        if let Some(db) = &self.db {
            db.insert_focus_session(&FocusSession::start(session_id.clone(), started_at))
                .await?;
        }

        let transition = apply(inner.state, FocusEvent::Start);
        inner.state = transition.next;
        inner.session_id = Some(session_id.clone());
        inner.last_prediction = None;
        inner.alert_count = 0;
        inner.concentrated_frames = 0;
        inner.distracted_frames = 0;
        inner.distracted_since = None;

        info!("Focus session {session_id} started");
        Ok(inner.snapshot())
    }

    /// Stop live inference. A no-op when already idle.
    pub async fn pause(&self) -> Result<FocusSnapshot> {
        let (snapshot, tally) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.is_active() {
                return Ok(inner.snapshot());
            }

            let transition = apply(inner.state, FocusEvent::Pause);
            inner.state = transition.next;
            inner.cancel_alert_timer();
            inner.distracted_since = None;

            inner.cancel_banner_timer();
            if inner.banner_visible {
                inner.banner_visible = false;
                self.alerts.dismiss();
            }

            let tally = inner.session_id.take().map(|id| SessionTally {
                id,
                concentrated_frames: inner.concentrated_frames,
                distracted_frames: inner.distracted_frames,
            });
            (inner.snapshot(), tally)
        };

        if let Some(tally) = tally {
            info!(
                "Focus session {} paused ({} concentrated, {} distracted frames)",
                tally.id, tally.concentrated_frames, tally.distracted_frames
            );
            if let Some(db) = &self.db {
                if let Err(err) = db
                    .finish_focus_session(
                        &tally.id,
                        Utc::now(),
                        tally.concentrated_frames,
                        tally.distracted_frames,
                    )
                    .await
                {
                    warn!("Failed to close focus session {}: {err:#}", tally.id);
                }
            }
        }

        Ok(snapshot)
    }

    /// Classify one frame and advance the state machine.
    ///
    /// Returns `Ok(None)` without doing anything when there are no features,
    /// no active session, or another classification is still running.
    pub async fn on_features(&self, features: Option<FeatureVector>) -> Result<Option<Prediction>> {
        let Some(features) = features else {
            return Ok(None);
        };
        if !self.is_active().await {
            return Ok(None);
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        let _busy = BusyGuard(&self.busy);

        let prediction = {
            let model = self
                .classifier
                .lock()
                .map_err(|_| anyhow!("classifier lock poisoned"))?;
            model.predict_class(&features)?
        };

        let mut inner = self.inner.lock().await;
        if !inner.state.is_active() {
            // Paused while classifying.
            return Ok(None);
        }

        let transition = apply(inner.state, FocusEvent::Classified(prediction.label));
        match prediction.label {
            Posture::Concentrated => inner.concentrated_frames += 1,
            Posture::Distracted => inner.distracted_frames += 1,
        }
        inner.last_prediction = Some(prediction);

        if transition.next == FocusState::Distracted && !inner.state.is_distracted() {
            inner.distracted_since = Some(Instant::now());
        } else if !transition.next.is_distracted() {
            inner.distracted_since = None;
        }
        inner.state = transition.next;

        match transition.timer {
            TimerAction::Start => self.arm_alert_timer(&mut inner),
            TimerAction::Cancel => inner.cancel_alert_timer(),
            TimerAction::Keep => {}
        }

        Ok(Some(prediction))
    }

    fn arm_alert_timer(&self, inner: &mut FocusInner) {
        if inner.alert_timer.is_some() {
            return;
        }

        inner.alert_epoch = inner.alert_epoch.wrapping_add(1);
        let epoch = inner.alert_epoch;
        let delay = inner.alert_delay;
        let controller = self.clone();

        inner.alert_timer = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            controller.on_alert_timer(epoch).await;
        }));
    }

    async fn on_alert_timer(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.alert_epoch != epoch {
            return;
        }
        // This task is the timer; dropping the handle only detaches it.
        inner.alert_timer = None;

        let transition = apply(inner.state, FocusEvent::AlertTimerElapsed);
        inner.state = transition.next;
        if !transition.fire_alert {
            return;
        }

        inner.alert_count += 1;
        let distracted_for_ms = inner
            .distracted_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let alert = DistractionAlert::new(inner.session_id.clone(), distracted_for_ms);

        info!("Distraction alert after {distracted_for_ms} ms");
        self.alerts.raise(&alert);
        inner.banner_visible = true;
        self.arm_banner_timer(&mut inner);

        if let (Some(db), Some(session_id)) = (&self.db, inner.session_id.as_deref()) {
            if let Err(err) = db.record_session_alert(session_id, alert.raised_at) {
                warn!("Failed to record alert for session {session_id}: {err:#}");
            }
        }
    }

    fn arm_banner_timer(&self, inner: &mut FocusInner) {
        inner.cancel_banner_timer();
        let epoch = inner.banner_epoch;
        let duration = inner.banner_duration;
        let controller = self.clone();

        inner.banner_timer = Some(tokio::spawn(async move {
            time::sleep(duration).await;
            controller.on_banner_timer(epoch).await;
        }));
    }

    async fn on_banner_timer(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.banner_epoch != epoch {
            return;
        }
        inner.banner_timer = None;
        if inner.banner_visible {
            inner.banner_visible = false;
            self.alerts.dismiss();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::testing::{RecordingSink, SinkEvent},
        classifier::{self, Classifier, KnnClassifier},
    };

    fn concentrated() -> Option<FeatureVector> {
        Some(FeatureVector::new(vec![1.0, 0.0]))
    }

    fn distracted() -> Option<FeatureVector> {
        Some(FeatureVector::new(vec![0.0, 1.0]))
    }

    fn trained_model() -> SharedClassifier {
        let mut model = KnnClassifier::new(1);
        model
            .add_example(&FeatureVector::new(vec![1.0, 0.0]), Posture::Concentrated)
            .unwrap();
        model
            .add_example(&FeatureVector::new(vec![0.0, 1.0]), Posture::Distracted)
            .unwrap();
        classifier::shared(Box::new(model))
    }

    fn controller_with(db: Option<Database>) -> (FocusController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let controller = FocusController::new(
            trained_model(),
            sink.clone(),
            &TrackerSettings::default(),
            db,
        );
        (controller, sink)
    }

    fn controller() -> (FocusController, Arc<RecordingSink>) {
        controller_with(None)
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_ignored_until_started() {
        let (controller, _) = controller();

        assert_eq!(controller.on_features(distracted()).await.unwrap(), None);
        assert_eq!(controller.snapshot().await.state, FocusState::Idle);

        controller.start().await.unwrap();
        assert_eq!(controller.snapshot().await.state, FocusState::Inferring);
        assert_eq!(controller.on_features(None).await.unwrap(), None);
        assert_eq!(controller.snapshot().await.state, FocusState::Inferring);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_distraction_alerts_exactly_once() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();

        let prediction = controller.on_features(distracted()).await.unwrap().unwrap();
        assert_eq!(prediction.label, Posture::Distracted);
        assert_eq!(controller.snapshot().await.state, FocusState::Distracted);

        sleep_ms(4_000).await;
        controller.on_features(distracted()).await.unwrap();
        assert_eq!(sink.raised(), 0);

        sleep_ms(1_001).await;
        assert_eq!(sink.raised(), 1);
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state, FocusState::AlertFired);
        assert_eq!(snapshot.alert_count, 1);
        assert!(snapshot.banner_visible);

        controller.on_features(distracted()).await.unwrap();
        sleep_ms(20_000).await;
        assert_eq!(sink.raised(), 1);
        assert_eq!(controller.snapshot().await.state, FocusState::AlertFired);
    }

    #[tokio::test(start_paused = true)]
    async fn alert_reports_time_spent_distracted() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();
        sleep_ms(5_001).await;

        match &sink.events()[..] {
            [SinkEvent::Raised(alert)] => {
                assert!((5_000..=5_001).contains(&alert.distracted_for_ms));
                assert!(alert.session_id.is_some());
            }
            other => panic!("unexpected sink events: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concentration_just_before_the_deadline_suppresses_the_alert() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();

        sleep_ms(4_999).await;
        controller.on_features(concentrated()).await.unwrap();
        assert_eq!(controller.snapshot().await.state, FocusState::Concentrated);

        sleep_ms(10_000).await;
        assert_eq!(sink.raised(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_distracted_stretch_gets_a_new_alert() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();

        controller.on_features(distracted()).await.unwrap();
        sleep_ms(5_001).await;
        controller.on_features(concentrated()).await.unwrap();
        controller.on_features(distracted()).await.unwrap();
        sleep_ms(4_000).await;
        assert_eq!(sink.raised(), 1);

        sleep_ms(1_001).await;
        assert_eq!(sink.raised(), 2);
        assert_eq!(controller.snapshot().await.alert_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_cancels_the_pending_alert() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();

        sleep_ms(3_000).await;
        let snapshot = controller.pause().await.unwrap();
        assert_eq!(snapshot.state, FocusState::Idle);
        assert_eq!(snapshot.session_id, None);

        sleep_ms(10_000).await;
        assert_eq!(sink.raised(), 0);
        assert_eq!(controller.on_features(distracted()).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn banner_dismisses_itself() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();

        sleep_ms(5_001).await;
        assert_eq!(sink.dismissed(), 0);

        sleep_ms(5_000).await;
        assert_eq!(sink.dismissed(), 1);
        assert!(!controller.snapshot().await.banner_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_takes_down_a_visible_banner() {
        let (controller, sink) = controller();
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();
        sleep_ms(5_001).await;

        controller.pause().await.unwrap();
        assert_eq!(sink.dismissed(), 1);

        sleep_ms(10_000).await;
        assert_eq!(sink.dismissed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_dropped_while_busy() {
        let (controller, _) = controller();
        controller.start().await.unwrap();

        controller.busy.store(true, Ordering::SeqCst);
        assert_eq!(controller.on_features(distracted()).await.unwrap(), None);
        assert_eq!(controller.snapshot().await.state, FocusState::Inferring);

        controller.busy.store(false, Ordering::SeqCst);
        assert!(controller.on_features(distracted()).await.unwrap().is_some());
        assert!(!controller.busy.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let (controller, _) = controller();
        controller.start().await.unwrap();
        assert!(controller.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn racing_starts_write_one_session_row() {
        let db = Database::open_in_memory().unwrap();
        let (controller, _) = controller_with(Some(db.clone()));

        let (first, second) = tokio::join!(controller.start(), controller.start());
        let started: Vec<_> = [first, second].into_iter().filter_map(Result::ok).collect();
        assert_eq!(started.len(), 1);
        let session_id = started[0].session_id.clone().unwrap();

        let running = db.get_incomplete_focus_session().await.unwrap().unwrap();
        assert_eq!(running.id, session_id);

        controller.pause().await.unwrap();
        assert_eq!(db.get_incomplete_focus_session().await.unwrap(), None);
        assert_eq!(db.list_focus_sessions(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_delay_is_used() {
        let (controller, sink) = controller();
        let settings = TrackerSettings {
            alert_delay_ms: 1_000,
            ..TrackerSettings::default()
        };
        controller.configure(&settings).await;
        controller.start().await.unwrap();
        controller.on_features(distracted()).await.unwrap();

        sleep_ms(1_001).await;
        assert_eq!(sink.raised(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_history_is_recorded() {
        let db = Database::open_in_memory().unwrap();
        let (controller, _) = controller_with(Some(db.clone()));

        let session_id = controller.start().await.unwrap().session_id.unwrap();
        controller.on_features(concentrated()).await.unwrap();
        controller.on_features(distracted()).await.unwrap();
        sleep_ms(5_001).await;
        controller.pause().await.unwrap();

        let sessions = db.list_focus_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].alert_count, 1);
        assert_eq!(sessions[0].concentrated_frames, 1);
        assert_eq!(sessions[0].distracted_frames, 1);
    }
}
