use tokio::sync::watch;

use crate::pose::PoseResult;

/// Latest detector output, published by the webview and consumed on each
/// polling tick. Older results are overwritten, never queued.
#[derive(Clone)]
pub struct PoseFeed {
    tx: watch::Sender<Option<PoseResult>>,
}

impl PoseFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// `None` means the detector ran and found nobody.
    pub fn publish(&self, pose: Option<PoseResult>) {
        self.tx.send_replace(pose);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PoseResult>> {
        self.tx.subscribe()
    }
}

impl Default for PoseFeed {
    fn default() -> Self {
        Self::new()
    }
}
