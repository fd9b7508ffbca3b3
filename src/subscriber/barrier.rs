//! Completion barrier between the snapshot workers and the live phase.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::{SubscriberError, types::TopicKey};

#[derive(Debug)]
pub(crate) struct Completion {
    key: TopicKey,
    outcome: Result<(), SubscriberError>,
}

/// Handed to every snapshot worker; each topic must call [`complete`](Self::complete) once.
#[derive(Debug, Clone)]
pub(crate) struct CompletionNotifier {
    sender: mpsc::UnboundedSender<Completion>,
}

impl CompletionNotifier {
    /// Reports that the backfill of `key` is over, successfully or not.
    ///
    /// Fails with [`SubscriberError::InvariantViolation`] once the barrier has been released.
    pub(crate) fn complete(
        &self,
        key: TopicKey,
        outcome: Result<(), SubscriberError>,
    ) -> Result<(), SubscriberError> {
        self.sender.send(Completion { key, outcome }).map_err(|rejected| {
            SubscriberError::InvariantViolation(format!(
                "backfill of {} completed after the barrier was released",
                rejected.0.key
            ))
        })
    }
}

/// What the barrier saw before releasing.
#[derive(Debug, Default)]
pub(crate) struct BarrierReport {
    pub(crate) completed: usize,
    pub(crate) failed: Vec<(TopicKey, SubscriberError)>,
}

/// Waits for exactly one completion per expected topic.
#[derive(Debug)]
pub(crate) struct CompletionBarrier {
    pending: HashSet<TopicKey>,
    expected: usize,
    receiver: mpsc::UnboundedReceiver<Completion>,
}

impl CompletionBarrier {
    pub(crate) fn new(topics: impl IntoIterator<Item = TopicKey>) -> (Self, CompletionNotifier) {
        let pending: HashSet<_> = topics.into_iter().collect();
        let (sender, receiver) = mpsc::unbounded_channel();
        let barrier = Self { expected: pending.len(), pending, receiver };
        (barrier, CompletionNotifier { sender })
    }

    /// Suspends until every expected topic has completed, then releases.
    ///
    /// Consuming `self` makes the release happen at most once; the receiver is dropped on return,
    /// so any later completion is rejected by its notifier.
    ///
    /// # Errors
    ///
    /// [`SubscriberError::InvariantViolation`] if a topic completes twice, an unknown topic
    /// completes, or every notifier is dropped before all topics completed.
    pub(crate) async fn wait(mut self) -> Result<BarrierReport, SubscriberError> {
        let mut report = BarrierReport::default();

        while !self.pending.is_empty() {
            let Some(Completion { key, outcome }) = self.receiver.recv().await else {
                return Err(SubscriberError::InvariantViolation(format!(
                    "{} of {} topics never completed their backfill",
                    self.pending.len(),
                    self.expected
                )));
            };

            if !self.pending.remove(&key) {
                return Err(SubscriberError::InvariantViolation(format!(
                    "unexpected or repeated backfill completion for {key}"
                )));
            }

            trace!(topic = %key, remaining = self.pending.len(), "Backfill completion received");
            report.completed += 1;
            if let Err(error) = outcome {
                report.failed.push((key, error));
            }
        }

        debug!(completed = report.completed, failed = report.failed.len(), "Barrier released");
        Ok(report)
    }
}
