//! Live broadcast forwarding.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    SubscriberError,
    message::{Broadcast, TryStream},
    transport::BroadcastTransport,
};

/// Why the live loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LiveExit {
    /// The subscriber was stopped.
    Cancelled,
    /// The transport delivered its closed sentinel.
    Closed,
    /// A broadcast with a failed status was forwarded.
    Terminal,
    /// A message could not be parsed.
    Malformed,
    /// Too many receive errors in a row.
    Unreachable,
    /// The event stream was dropped.
    ConsumerGone,
}

pub(crate) struct LiveLoop<T> {
    pub(crate) transport: T,
    pub(crate) identity: String,
    pub(crate) events: mpsc::UnboundedSender<Broadcast>,
    pub(crate) cancel: CancellationToken,
    pub(crate) max_consecutive_recv_errors: usize,
}

impl<T: BroadcastTransport> LiveLoop<T> {
    pub(crate) async fn run(mut self) -> LiveExit {
        info!(identity = %self.identity, "Live phase started");
        let mut consecutive_errors = 0usize;

        loop {
            let received = tokio::select! {
                biased;

                () = self.cancel.cancelled() => return LiveExit::Cancelled,
                received = self.transport.recv() => received,
            };

            let frames = match received {
                Ok(frames) => {
                    consecutive_errors = 0;
                    frames
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        error = %e,
                        consecutive_errors = consecutive_errors,
                        "Failed to receive broadcast"
                    );
                    if consecutive_errors > self.max_consecutive_recv_errors {
                        let error = SubscriberError::from(e);
                        self.events.try_stream(Broadcast::from((self.identity.as_str(), error)));
                        return LiveExit::Unreachable;
                    }
                    continue;
                }
            };

            if frames.is_empty() {
                info!("Broadcast transport closed");
                return LiveExit::Closed;
            }

            let broadcast = match Broadcast::parse(&frames) {
                Ok(broadcast) => broadcast,
                Err(e) => {
                    error!(error = %e, "Failed to parse broadcast");
                    self.events.try_stream(Broadcast::fail(
                        self.identity.as_str(),
                        format!("Error when parsing message {e}"),
                    ));
                    return LiveExit::Malformed;
                }
            };

            let is_ok = broadcast.is_ok();
            if !self.events.try_stream(broadcast) {
                return LiveExit::ConsumerGone;
            }
            if !is_ok {
                warn!("Received failed broadcast, stopping live phase");
                return LiveExit::Terminal;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Status,
        test_utils::{MockTransport, data_frames, fail_frames},
        types::EventBatch,
    };

    fn live(
        transport: MockTransport,
        max_errors: usize,
    ) -> (LiveLoop<MockTransport>, mpsc::UnboundedReceiver<Broadcast>) {
        let (events, rx) = mpsc::unbounded_channel();
        let live = LiveLoop {
            transport,
            identity: "acct".into(),
            events,
            cancel: CancellationToken::new(),
            max_consecutive_recv_errors: max_errors,
        };
        (live, rx)
    }

    fn batch(block_timestamp: u64) -> EventBatch {
        EventBatch { block_timestamp, ..EventBatch::default() }
    }

    #[tokio::test]
    async fn forwards_until_closed() {
        let (transport, publisher) = MockTransport::new();
        publisher.publish(data_frames("t1", &batch(1)));
        publisher.publish(data_frames("t2", &batch(2)));
        publisher.close();
        let (live, mut rx) = live(transport, 0);

        assert_eq!(live.run().await, LiveExit::Closed);

        assert_eq!(rx.recv().await, Some(Broadcast::data("t1", batch(1))));
        assert_eq!(rx.recv().await, Some(Broadcast::data("t2", batch(2))));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn failed_broadcast_is_forwarded_then_stops() {
        let (transport, publisher) = MockTransport::new();
        publisher.publish(fail_frames("t1", "categorizer down"));
        publisher.publish(data_frames("t1", &batch(3)));
        let (live, mut rx) = live(transport, 0);

        assert_eq!(live.run().await, LiveExit::Terminal);

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.status, Status::Fail);
        assert_eq!(forwarded.message, "categorizer down");
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn malformed_message_stops_with_parse_failure() {
        let (transport, publisher) = MockTransport::new();
        publisher.publish(vec![b"t1".to_vec(), b"not json".to_vec()]);
        let (live, mut rx) = live(transport, 0);

        assert_eq!(live.run().await, LiveExit::Malformed);

        let failure = rx.recv().await.unwrap();
        assert_eq!(failure.topic, "acct");
        assert!(failure.message.starts_with("Error when parsing message"));
    }

    #[tokio::test]
    async fn receive_errors_are_tolerated_up_to_the_limit() {
        let (transport, publisher) = MockTransport::new();
        publisher.publish_error("connection reset");
        publisher.publish_error("connection reset");
        publisher.publish(data_frames("t1", &batch(1)));
        publisher.publish_error("connection reset");
        publisher.publish_error("connection reset");
        publisher.publish_error("connection reset");
        let (live, mut rx) = live(transport, 2);

        assert_eq!(live.run().await, LiveExit::Unreachable);

        assert_eq!(rx.recv().await, Some(Broadcast::data("t1", batch(1))));
        let failure = rx.recv().await.unwrap();
        assert_eq!(failure.topic, "acct");
        assert_eq!(failure.status, Status::Fail);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_receive() {
        let (transport, _publisher) = MockTransport::new();
        let (live, _rx) = live(transport, 0);
        let cancel = live.cancel.clone();

        let handle = tokio::spawn(live.run());
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), LiveExit::Cancelled);
    }
}
