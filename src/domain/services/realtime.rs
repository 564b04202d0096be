#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;

use std::future::Future;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::models::MessageStream;
use crate::domain::models::RawMessage;

/// Background consumer of a conversation's push stream.
pub struct RealtimeFeed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RealtimeFeed {
    /// Spawns the consumer task. Messages that are already waiting on the
    /// stream are grouped into batches of at most `batch_size` before being
    /// handed to `on_batch`.
    pub fn start<F, Fut>(
        stream: MessageStream,
        batch_size: usize,
        cancel: CancellationToken,
        mut on_batch: F,
    ) -> RealtimeFeed
    where
        F: FnMut(Vec<RawMessage>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut batches = stream.ready_chunks(batch_size.max(1));
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("Realtime feed cancelled");
                        break;
                    }
                    next = batches.next() => next,
                };

                let Some(items) = next else {
                    tracing::debug!("Realtime stream ended");
                    break;
                };

                let batch = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Ok(raw) => return Some(raw),
                        Err(err) => {
                            tracing::warn!(error = ?err, "Skipping realtime stream error");
                            return None;
                        }
                    })
                    .collect::<Vec<RawMessage>>();

                if batch.is_empty() {
                    continue;
                }

                on_batch(batch).await;
            }
        });

        return RealtimeFeed { cancel, handle };
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        return self.handle.is_finished();
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
