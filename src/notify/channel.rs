use anyhow::{anyhow, Result};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{Listener, NewsAlert};

/// In-process listener backed by a bounded channel. Never waits: a full
/// buffer drops the alert and reports a delivery failure.
pub struct ChannelListener {
    tx: mpsc::Sender<NewsAlert>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<NewsAlert>) -> Self {
        Self { tx }
    }

    /// Listener plus the receiving end, with room for `capacity` alerts.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<NewsAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait::async_trait]
impl Listener for ChannelListener {
    async fn deliver(&self, alert: &NewsAlert) -> Result<()> {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("listener buffer full, alert dropped")),
            Err(TrySendError::Closed(_)) => Err(anyhow!("listener channel closed")),
        }
    }

    fn kind(&self) -> &'static str {
        "channel"
    }
}
