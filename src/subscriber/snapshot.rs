//! Per-topic historical backfill.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    SubscriberError,
    message::{Broadcast, TryStream},
    remote::{RemoteClient, RobustClient, SnapshotQuery},
    store::ProgressStore,
    subscriber::barrier::CompletionNotifier,
    types::{TopicKey, TopicState},
};

/// Pages through one topic's history, from its checkpoint up to the server time fixed by the
/// first page.
pub(crate) struct SnapshotWorker<C, S> {
    pub(crate) key: TopicKey,
    pub(crate) state: TopicState,
    pub(crate) client: Arc<RobustClient<C>>,
    pub(crate) store: Arc<S>,
    pub(crate) events: mpsc::UnboundedSender<Broadcast>,
    pub(crate) completions: CompletionNotifier,
    pub(crate) page_size: u64,
    pub(crate) cancel: CancellationToken,
}

impl<C: RemoteClient, S: ProgressStore> SnapshotWorker<C, S> {
    /// Runs the backfill and reports the outcome to the barrier exactly once.
    ///
    /// A failed backfill is also forwarded as a failure broadcast on the topic. A cancelled
    /// worker exits without reporting: the barrier is being torn down with it.
    pub(crate) async fn run(self) {
        let outcome = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                debug!(topic = %self.key, "Snapshot cancelled");
                return;
            }
            outcome = self.backfill() => outcome,
        };

        if let Err(e) = &outcome {
            error!(topic = %self.key, error = %e, "Snapshot failed");
            self.events.try_stream(Broadcast::from((self.key.to_string().as_str(), e.clone())));
        }

        if let Err(e) = self.completions.complete(self.key.clone(), outcome) {
            error!(topic = %self.key, error = %e, "Failed to report snapshot completion");
        }
    }

    async fn backfill(&self) -> Result<(), SubscriberError> {
        let topic = self.key.to_string();
        let mut checkpoint = self.state.last_synced_timestamp;
        let mut query = SnapshotQuery {
            key: self.key.clone(),
            from: checkpoint,
            to: 0,
            page: 1,
            limit: self.page_size,
        };

        info!(topic = %topic, from = query.from, "Snapshot started");

        loop {
            let batch = self.client.fetch_page(&query).await?;

            if batch.transactions.is_empty() {
                break;
            }

            if let Some(latest) = batch.max_transaction_timestamp() {
                checkpoint = checkpoint.max(latest);
            }
            // Persisted before the page is forwarded, so a crash never skips delivered events.
            self.store.set_checkpoint(&self.key, checkpoint)?;

            if query.to == 0 {
                query.to = batch.block_timestamp;
            }

            trace!(
                topic = %topic,
                page = query.page,
                transactions = batch.transactions.len(),
                checkpoint = checkpoint,
                "Snapshot page fetched"
            );

            if !self.events.try_stream(Broadcast::data(topic.as_str(), batch)) {
                break;
            }

            query.page += 1;
        }

        info!(
            topic = %topic,
            pages = query.page - 1,
            checkpoint = checkpoint,
            "Snapshot finished"
        );
        Ok(())
    }
}
