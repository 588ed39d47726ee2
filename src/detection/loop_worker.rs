use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{context::FocusContext, pose::PoseResult};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Hand each new pose result to the context, at most once per tick.
pub async fn detection_loop(
    context: Arc<FocusContext>,
    mut poses: watch::Receiver<Option<PoseResult>>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match poses.has_changed() {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(_) => {
                        log_info!("pose feed closed, detection loop exiting");
                        break;
                    }
                }

                let pose = poses.borrow_and_update().clone();
                match context.handle_pose(pose.as_ref()).await {
                    Ok(Some(prediction)) => log_debug!(
                        "classified {} ({:.2})",
                        prediction.label,
                        prediction.confidence
                    ),
                    Ok(None) => {}
                    Err(err) => log_error!("classification failed: {err:#}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down");
                break;
            }
        }
    }
}
