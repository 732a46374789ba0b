//! Backend stream subscription. Each subscription owns its own receiver and a
//! pump task that feeds envelopes into the client in arrival order.

use std::sync::Arc;

use shared::protocol::StreamEnvelope;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::ChatClient;

pub struct StreamSubscription {
    task: Option<JoinHandle<()>>,
}

impl StreamSubscription {
    pub(crate) fn spawn(
        client: Arc<ChatClient>,
        mut envelopes: broadcast::Receiver<StreamEnvelope>,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match envelopes.recv().await {
                    Ok(envelope) => {
                        client.handle_stream_envelope(envelope).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stream subscription lagged; deltas were lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("backend stream closed; subscription finished");
        });

        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops delivery. Safe mid-stream: each delta is applied under a single
    /// lock acquisition, so an open turn simply stays open.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
