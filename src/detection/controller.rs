use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::FocusContext;

use super::{feed::PoseFeed, loop_worker::detection_loop};

/// Owns the polling task that feeds pose results into the context.
#[derive(Default)]
pub struct DetectionController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        context: Arc<FocusContext>,
        feed: &PoseFeed,
        poll_interval: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("detection already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(
            context,
            feed.subscribe(),
            poll_interval,
            cancel_token.clone(),
        ));

        info!("Detection loop started ({} ms period)", poll_interval.as_millis());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("detection loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::testing::RecordingSink,
        pose::{Landmark, PoseResult},
        samples::Posture,
        settings::TrackerSettings,
        storage::MemoryStorage,
    };
    use tokio::time::sleep;

    fn pose(y: f64) -> PoseResult {
        PoseResult::new(vec![Landmark::new(0.5, y, 0.9), Landmark::new(0.4, 0.6, 0.8)]).unwrap()
    }

    fn context() -> Arc<FocusContext> {
        Arc::new(FocusContext::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingSink::default()),
            TrackerSettings::default(),
            None,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn published_poses_become_current_features() {
        let context = context();
        let feed = PoseFeed::new();
        let mut detection = DetectionController::new();
        detection
            .start(context.clone(), &feed, Duration::from_millis(100))
            .unwrap();
        assert!(detection.start(context.clone(), &feed, Duration::from_millis(100)).is_err());

        feed.publish(Some(pose(0.25)));
        sleep(Duration::from_millis(150)).await;
        let features = context.current_features().unwrap();
        assert_eq!(features.as_slice(), &[0.5, 0.25, 0.9, 0.4, 0.6, 0.8]);
        assert!(context.add_sample(Posture::Concentrated).is_some());

        feed.publish(None);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(context.current_features(), None);

        detection.stop().await.unwrap();
        assert!(!detection.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_loop_ignores_new_poses() {
        let context = context();
        let feed = PoseFeed::new();
        let mut detection = DetectionController::new();
        detection
            .start(context.clone(), &feed, Duration::from_millis(100))
            .unwrap();
        detection.stop().await.unwrap();

        feed.publish(Some(pose(0.5)));
        sleep(Duration::from_millis(500)).await;
        assert_eq!(context.current_features(), None);
    }
}
