//! Everything a running tracker owns, in one place.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::Result;
use log::{info, warn};

use crate::{
    alerts::AlertSink,
    classifier::{self, ClassifierFactory, Prediction, SharedClassifier},
    db::Database,
    error::{EvaluationError, TrainingError},
    focus::{FocusController, FocusSnapshot},
    pose::{extract_features, FeatureVector, PoseResult},
    samples::{ExportFile, Posture, SampleCounts, SampleStore},
    settings::TrackerSettings,
    storage::SlotStorage,
    training::{self, AccuracyReport, TrainingSummary},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Application context shared by the detection loop and the command surface.
pub struct FocusContext {
    store: Mutex<SampleStore>,
    current_features: Mutex<Option<FeatureVector>>,
    classifier: SharedClassifier,
    factory: ClassifierFactory,
    focus: FocusController,
    settings: RwLock<TrackerSettings>,
    last_report: Mutex<Option<AccuracyReport>>,
}

impl FocusContext {
    pub fn new(
        storage: Arc<dyn SlotStorage>,
        alerts: Arc<dyn AlertSink>,
        settings: TrackerSettings,
        db: Option<Database>,
    ) -> Self {
        let factory = classifier::knn_factory(settings.neighbor_count);
        Self::with_factory(storage, alerts, settings, db, factory)
    }

    /// Same as [`FocusContext::new`] with a caller-chosen classifier backend.
    pub fn with_factory(
        storage: Arc<dyn SlotStorage>,
        alerts: Arc<dyn AlertSink>,
        settings: TrackerSettings,
        db: Option<Database>,
        factory: ClassifierFactory,
    ) -> Self {
        let live = classifier::shared(factory());
        let focus = FocusController::new(live.clone(), alerts, &settings, db);

        Self {
            store: Mutex::new(SampleStore::new(storage, settings.storage_key.clone())),
            current_features: Mutex::new(None),
            classifier: live,
            factory,
            focus,
            settings: RwLock::new(settings),
            last_report: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> TrackerSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in new settings. The storage key and neighbour count are read at
    /// construction and only change on the next launch.
    pub async fn apply_settings(&self, settings: TrackerSettings) {
        self.focus.configure(&settings).await;
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    pub fn load_samples(&self) -> Result<usize> {
        lock(&self.store).load()
    }

    /// Take one pose result from the detector.
    ///
    /// The extracted features become the current features (cleared when no
    /// pose was found) and, during a session, are classified.
    pub async fn handle_pose(&self, pose: Option<&PoseResult>) -> Result<Option<Prediction>> {
        let features = extract_features(pose);
        *lock(&self.current_features) = features.clone();
        self.focus.on_features(features).await
    }

    pub fn current_features(&self) -> Option<FeatureVector> {
        lock(&self.current_features).clone()
    }

    /// Label the current features. `None` when there are none.
    pub fn add_sample(&self, label: Posture) -> Option<SampleCounts> {
        let features = self.current_features();
        lock(&self.store).add(features.as_ref(), label)
    }

    pub fn counts(&self) -> SampleCounts {
        lock(&self.store).counts()
    }

    pub fn save(&self) -> Result<SampleCounts> {
        let store = lock(&self.store);
        store.persist()?;
        Ok(store.counts())
    }

    pub fn export_today(&self) -> Result<Option<ExportFile>> {
        lock(&self.store).export_today()
    }

    /// Clear the collection once `confirm` agrees. A confirmed reset also
    /// forgets the live model, ends the focus session and drops the last
    /// accuracy report.
    ///
    /// The in-memory samples are gone as soon as the user confirms, so the
    /// rest is cleared too even when the durable slot could not be removed.
    /// That error is still returned.
    pub async fn reset(&self, confirm: impl FnOnce() -> bool) -> Result<bool> {
        let outcome = lock(&self.store).reset(confirm);
        if let Ok(false) = outcome {
            return Ok(false);
        }

        let paused = self.focus.pause().await;
        lock(&self.classifier).clear_all_classes();
        *lock(&self.last_report) = None;

        outcome?;
        paused?;
        Ok(true)
    }

    /// Retrain the live model from the whole collection.
    pub fn train(&self) -> Result<TrainingSummary, TrainingError> {
        let min_per_class = self.settings().min_samples_per_class;
        let store = lock(&self.store);
        let mut model = self
            .classifier
            .lock()
            .map_err(|_| TrainingError::Classifier("live model lock poisoned".into()))?;

        let summary = training::train(store.samples(), &mut **model, min_per_class)?;
        info!(
            "Live model trained on {} samples ({} features each)",
            summary.sample_count(),
            summary.feature_len
        );
        Ok(summary)
    }

    /// Holdout accuracy on a fresh, throwaway model. The live model is untouched.
    pub fn test_accuracy(&self) -> Result<AccuracyReport, EvaluationError> {
        let samples = lock(&self.store).samples().to_vec();
        let report = training::evaluate(&samples, &*self.factory, &mut rand::thread_rng())
            .map_err(|err| {
                warn!("Accuracy test failed: {err:?}");
                err
            })?;

        info!("{}", report.summary());
        *lock(&self.last_report) = Some(report.clone());
        Ok(report)
    }

    pub fn last_accuracy(&self) -> Option<AccuracyReport> {
        lock(&self.last_report).clone()
    }

    /// Train, then begin live inference.
    pub async fn start(&self) -> Result<FocusSnapshot> {
        self.train()?;
        self.focus.start().await
    }

    pub async fn pause(&self) -> Result<FocusSnapshot> {
        self.focus.pause().await
    }

    /// Pause when running, otherwise train and start.
    pub async fn toggle(&self) -> Result<FocusSnapshot> {
        if self.focus.is_active().await {
            self.pause().await
        } else {
            self.start().await
        }
    }

    pub async fn snapshot(&self) -> FocusSnapshot {
        self.focus.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::testing::RecordingSink,
        focus::FocusState,
        pose::{Landmark, POSE_LANDMARK_COUNT},
        storage::MemoryStorage,
    };
    use std::time::Duration;

    /// Upright poses keep the nose high; slumped ones drop it.
    fn pose(nose_y: f64) -> PoseResult {
        let mut landmarks: Vec<Landmark> = (0..POSE_LANDMARK_COUNT)
            .map(|i| Landmark::new(0.5, i as f64 / POSE_LANDMARK_COUNT as f64, 0.9))
            .collect();
        landmarks[0] = Landmark::new(0.5, nose_y, 0.99);
        PoseResult::new(landmarks).unwrap()
    }

    fn upright() -> PoseResult {
        pose(0.1)
    }

    fn slumped() -> PoseResult {
        pose(0.95)
    }

    fn context() -> (FocusContext, Arc<MemoryStorage>, Arc<RecordingSink>) {
        let storage = Arc::new(MemoryStorage::new());
        let sink = Arc::new(RecordingSink::default());
        let settings = TrackerSettings {
            neighbor_count: 1,
            ..TrackerSettings::default()
        };
        let context = FocusContext::new(storage.clone(), sink.clone(), settings, None);
        (context, storage, sink)
    }

    async fn collect(context: &FocusContext, pose: &PoseResult, label: Posture, n: usize) {
        for _ in 0..n {
            context.handle_pose(Some(pose)).await.unwrap();
            assert!(context.add_sample(label).is_some());
        }
    }

    #[tokio::test]
    async fn samples_need_a_current_pose() {
        let (context, _, _) = context();
        assert_eq!(context.add_sample(Posture::Concentrated), None);

        context.handle_pose(Some(&upright())).await.unwrap();
        let counts = context.add_sample(Posture::Concentrated).unwrap();
        assert_eq!(counts.concentrated, 1);

        context.handle_pose(None).await.unwrap();
        assert_eq!(context.current_features(), None);
        assert_eq!(context.add_sample(Posture::Distracted), None);
        assert_eq!(context.counts().distracted, 0);
    }

    #[tokio::test]
    async fn start_requires_enough_samples() {
        let (context, _, _) = context();
        collect(&context, &upright(), Posture::Concentrated, 3).await;
        collect(&context, &slumped(), Posture::Distracted, 2).await;

        let err = context.start().await.unwrap_err();
        let training = err.downcast_ref::<TrainingError>().unwrap();
        assert_eq!(training.shortfalls(), vec![(Posture::Distracted, 1)]);
        assert_eq!(context.snapshot().await.state, FocusState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn live_session_alerts_on_sustained_slouching() {
        crate::utils::logging::init_test_logging();
        let (context, _, sink) = context();
        collect(&context, &upright(), Posture::Concentrated, 3).await;
        collect(&context, &slumped(), Posture::Distracted, 3).await;

        assert_eq!(context.toggle().await.unwrap().state, FocusState::Inferring);

        let prediction = context.handle_pose(Some(&slumped())).await.unwrap().unwrap();
        assert_eq!(prediction.label, Posture::Distracted);
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(sink.raised(), 1);

        let prediction = context.handle_pose(Some(&upright())).await.unwrap().unwrap();
        assert_eq!(prediction.label, Posture::Concentrated);
        assert_eq!(context.toggle().await.unwrap().state, FocusState::Idle);
    }

    #[tokio::test]
    async fn accuracy_report_is_kept() {
        let (context, _, _) = context();
        assert!(matches!(
            context.test_accuracy(),
            Err(EvaluationError::NotEnoughSamples { total: 0, .. })
        ));

        collect(&context, &upright(), Posture::Concentrated, 5).await;
        collect(&context, &slumped(), Posture::Distracted, 5).await;

        let report = context.test_accuracy().unwrap();
        assert_eq!(report.train_size, 8);
        assert_eq!(report.test_size, 2);
        assert_eq!(report.confusion.total(), 2);
        assert_eq!(context.last_accuracy(), Some(report));
    }

    #[tokio::test]
    async fn declined_reset_changes_nothing() {
        let (context, _, _) = context();
        collect(&context, &upright(), Posture::Concentrated, 2).await;

        assert!(!context.reset(|| false).await.unwrap());
        assert_eq!(context.counts().concentrated, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_everything_downstream() {
        let (context, storage, _) = context();
        collect(&context, &upright(), Posture::Concentrated, 5).await;
        collect(&context, &slumped(), Posture::Distracted, 5).await;
        context.test_accuracy().unwrap();
        context.start().await.unwrap();

        assert!(context.reset(|| true).await.unwrap());
        assert_eq!(context.counts(), SampleCounts::default());
        assert_eq!(context.last_accuracy(), None);
        assert_eq!(context.snapshot().await.state, FocusState::Idle);
        assert_eq!(context.classifier.lock().unwrap().example_count(), 0);

        let reloaded = FocusContext::new(
            storage,
            Arc::new(RecordingSink::default()),
            TrackerSettings::default(),
            None,
        );
        assert_eq!(reloaded.load_samples().unwrap(), 0);
    }

    /// Memory storage whose `remove` always fails.
    #[derive(Default)]
    struct StickyStorage(MemoryStorage);

    impl SlotStorage for StickyStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: String) -> Result<()> {
            self.0.set(key, value)
        }

        fn remove(&self, _key: &str) -> Result<()> {
            anyhow::bail!("disk is read-only")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_slot_removal_still_clears_downstream() {
        let storage = Arc::new(StickyStorage::default());
        let settings = TrackerSettings {
            neighbor_count: 1,
            ..TrackerSettings::default()
        };
        let context =
            FocusContext::new(storage.clone(), Arc::new(RecordingSink::default()), settings, None);
        collect(&context, &upright(), Posture::Concentrated, 5).await;
        collect(&context, &slumped(), Posture::Distracted, 5).await;
        context.test_accuracy().unwrap();
        context.start().await.unwrap();

        let err = context.reset(|| true).await.unwrap_err();
        assert!(format!("{err:#}").contains("disk is read-only"));

        assert_eq!(context.counts(), SampleCounts::default());
        assert_eq!(context.last_accuracy(), None);
        assert_eq!(context.snapshot().await.state, FocusState::Idle);
        assert_eq!(context.classifier.lock().unwrap().example_count(), 0);
        assert!(storage.get("focusguard-samples").unwrap().is_some());
    }

    #[tokio::test]
    async fn collected_samples_survive_a_restart() {
        let (context, storage, _) = context();
        collect(&context, &upright(), Posture::Concentrated, 2).await;
        collect(&context, &slumped(), Posture::Distracted, 1).await;
        context.save().unwrap();

        let reloaded = FocusContext::new(
            storage,
            Arc::new(RecordingSink::default()),
            TrackerSettings::default(),
            None,
        );
        assert_eq!(reloaded.load_samples().unwrap(), 3);
        assert_eq!(
            reloaded.counts(),
            SampleCounts {
                concentrated: 2,
                distracted: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_alert_delay_applies_to_the_next_stretch() {
        let (context, _, sink) = context();
        collect(&context, &upright(), Posture::Concentrated, 3).await;
        collect(&context, &slumped(), Posture::Distracted, 3).await;
        context
            .apply_settings(TrackerSettings {
                alert_delay_ms: 2_000,
                neighbor_count: 1,
                ..TrackerSettings::default()
            })
            .await;
        assert_eq!(context.settings().alert_delay_ms, 2_000);

        context.start().await.unwrap();
        context.handle_pose(Some(&slumped())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_001)).await;
        assert_eq!(sink.raised(), 1);
    }
}
