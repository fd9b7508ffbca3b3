//! The subscriber: historical backfill per topic, then live forwarding.
//!
//! [`SubscriberBuilder::connect`] resolves the topics and seeds their checkpoints.
//! [`Subscriber::start`] then wires the runtime:
//!
//! 1. the broadcast transport is connected and subscribed to every topic, so live messages
//!    published during the backfill are queued rather than lost;
//! 2. one snapshot worker per topic pages through the topic's history;
//! 3. once every worker has reported to the completion barrier, the heartbeat monitor and the
//!    live loop start.
//!
//! All tasks share one cancellation token: [`SubscriberHandle::stop`], the end of the live loop
//! and a failed heartbeat each tear the whole subscriber down.

mod barrier;
mod heartbeat;
mod live;
mod snapshot;

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{
    SubscriberError,
    message::{Broadcast, TryStream},
    remote::{IntoRobustClient, RemoteClient, ResolvedTopic, RobustClient},
    store::ProgressStore,
    transport::{BroadcastTransport, TransportConnector},
    types::{TopicKey, TopicState},
};

use barrier::CompletionBarrier;
use live::LiveLoop;
use snapshot::SnapshotWorker;

pub use heartbeat::HealthSignal;
use heartbeat::HeartbeatMonitor;

/// Default number of transactions requested per snapshot page.
pub const DEFAULT_PAGE_SIZE: u64 = 500;
/// Default delay between two liveness probes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
/// Default time without a successful probe after which the service is declared dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of consecutive receive errors the live loop tolerates.
pub const DEFAULT_MAX_CONSECUTIVE_RECV_ERRORS: usize = 16;

/// Snapshot pages, live broadcasts and in-band failures, in delivery order.
pub type EventStream = UnboundedReceiverStream<Broadcast>;
/// Yields at most one [`HealthSignal`], then closes when the subscriber stops.
pub type HealthStream = UnboundedReceiverStream<HealthSignal>;

#[derive(Debug, Clone)]
pub struct SubscriberBuilder {
    identity: String,
    page_size: u64,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    max_consecutive_recv_errors: usize,
}

impl SubscriberBuilder {
    /// Starts configuring a subscriber for the account `identity`.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            page_size: DEFAULT_PAGE_SIZE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            max_consecutive_recv_errors: DEFAULT_MAX_CONSECUTIVE_RECV_ERRORS,
        }
    }

    /// Sets how many transactions each snapshot page may hold.
    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets how many receive errors in a row the live loop logs and skips before giving up.
    #[must_use]
    pub fn max_consecutive_recv_errors(mut self, max: usize) -> Self {
        self.max_consecutive_recv_errors = max;
        self
    }

    fn validate(&self) -> Result<(), SubscriberError> {
        if self.page_size == 0 {
            return Err(SubscriberError::InvalidPageSize);
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.heartbeat_timeout {
            return Err(SubscriberError::InvalidHeartbeat);
        }
        Ok(())
    }

    /// Resolves the store's topic filter and seeds every topic's progress.
    ///
    /// A topic without a stored checkpoint starts from the block preceding its contract's
    /// deployment; that default is written back to the store. Each topic's resolved topic string
    /// is persisted as well.
    ///
    /// # Errors
    ///
    /// * [`SubscriberError::InvalidPageSize`] / [`SubscriberError::InvalidHeartbeat`] for a bad
    ///   configuration.
    /// * [`SubscriberError::Resolution`] if the topics cannot be resolved.
    /// * [`SubscriberError::Store`] if seeding the store fails.
    pub async fn connect<R, S, T>(
        self,
        client: R,
        store: S,
        connector: T,
    ) -> Result<Subscriber<R::Client, S, T>, SubscriberError>
    where
        R: IntoRobustClient,
        S: ProgressStore,
        T: TransportConnector,
    {
        self.validate()?;

        let client = Arc::new(client.into_robust_client());
        let store = Arc::new(store);

        let filter = store.topic_filter();
        let resolved =
            client.resolve_topics(&filter).await.map_err(SubscriberError::Resolution)?;

        let mut seen = HashSet::new();
        let mut topics = Vec::with_capacity(resolved.len());
        for ResolvedTopic { key, topic_string, pre_deploy_block_timestamp } in resolved {
            if !seen.insert(key.clone()) {
                warn!(topic = %key, "Topic resolved twice, ignoring duplicate");
                continue;
            }

            let last_synced_timestamp = match store.checkpoint(&key) {
                Some(timestamp) => timestamp,
                None => {
                    store.set_checkpoint(&key, pre_deploy_block_timestamp)?;
                    pre_deploy_block_timestamp
                }
            };
            store.set_topic_string(&key, &topic_string)?;

            debug!(topic = %key, checkpoint = last_synced_timestamp, "Topic seeded");
            topics.push((key, TopicState { last_synced_timestamp, topic_string }));
        }

        info!(identity = %self.identity, topics = topics.len(), "Subscriber connected");

        Ok(Subscriber { config: self, client, store, connector, topics })
    }
}

/// A configured subscriber whose topics are resolved but not yet streamed.
#[derive(Debug)]
pub struct Subscriber<C, S, T> {
    config: SubscriberBuilder,
    client: Arc<RobustClient<C>>,
    store: Arc<S>,
    connector: T,
    topics: Vec<(TopicKey, TopicState)>,
}

impl<C: RemoteClient, S: ProgressStore, T: TransportConnector> Subscriber<C, S, T> {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Resolved topics, in resolution order.
    pub fn topics(&self) -> impl Iterator<Item = &TopicKey> {
        self.topics.iter().map(|(key, _)| key)
    }

    /// Progress seeded for `key` at construction.
    #[must_use]
    pub fn topic_state(&self, key: &TopicKey) -> Option<&TopicState> {
        self.topics.iter().find(|(k, _)| k == key).map(|(_, state)| state)
    }

    /// Starts streaming. Returns as soon as the transport is subscribed and the tasks spawned.
    ///
    /// # Errors
    ///
    /// [`SubscriberError::Transport`] if connecting or subscribing the broadcast transport fails;
    /// no task is spawned in that case.
    pub async fn start(self) -> Result<Subscription, SubscriberError> {
        let Self { config, client, store, connector, topics } = self;

        let mut transport = connector.connect(&config.identity).await?;
        for (key, _) in &topics {
            transport.subscribe(&key.to_string()).await?;
        }
        debug!(topics = topics.len(), "Broadcast transport subscribed");

        let (events, events_rx) = mpsc::unbounded_channel();
        let (health, health_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let (barrier, completions) =
            CompletionBarrier::new(topics.iter().map(|(key, _)| key.clone()));
        for (key, state) in topics {
            let worker = SnapshotWorker {
                key,
                state,
                client: Arc::clone(&client),
                store: Arc::clone(&store),
                events: events.clone(),
                completions: completions.clone(),
                page_size: config.page_size,
                cancel: cancel.clone(),
            };
            tokio::spawn(worker.run());
        }
        drop(completions);

        let coordinator_cancel = cancel.clone();
        tokio::spawn(async move {
            let released = tokio::select! {
                biased;

                () = coordinator_cancel.cancelled() => return,
                released = barrier.wait() => released,
            };

            match released {
                Ok(report) => {
                    info!(
                        completed = report.completed,
                        failed = report.failed.len(),
                        "Snapshot phase finished"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Snapshot phase broke its completion barrier");
                    events.try_stream(Broadcast::from((config.identity.as_str(), e)));
                    coordinator_cancel.cancel();
                    return;
                }
            }

            let monitor = HeartbeatMonitor {
                client,
                health,
                interval: config.heartbeat_interval,
                timeout: config.heartbeat_timeout,
                cancel: coordinator_cancel.clone(),
            };
            tokio::spawn(monitor.run());

            let live = LiveLoop {
                transport,
                identity: config.identity,
                events,
                cancel: coordinator_cancel.clone(),
                max_consecutive_recv_errors: config.max_consecutive_recv_errors,
            };
            let exit = live.run().await;
            debug!(exit = ?exit, "Live phase ended");
            coordinator_cancel.cancel();
        });

        Ok(Subscription {
            events: UnboundedReceiverStream::new(events_rx),
            health: UnboundedReceiverStream::new(health_rx),
            handle: SubscriberHandle { cancel },
        })
    }
}

/// The outputs of a started subscriber.
#[derive(Debug)]
pub struct Subscription {
    pub events: EventStream,
    pub health: HealthStream,
    pub handle: SubscriberHandle,
}

/// Stops a running subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    cancel: CancellationToken,
}

impl SubscriberHandle {
    /// Cancels every task of the subscriber. Both streams close once the tasks have exited.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the subscriber stopped, whatever the cause.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::{
        store::MemoryStore,
        test_utils::{FailingStore, MockConnector, MockRemote, MockTransport, resolved},
        types::TopicFilter,
    };

    fn key(n: u8) -> TopicKey {
        TopicKey::new("1", Address::with_last_byte(n))
    }

    #[tokio::test]
    async fn connect_rejects_invalid_configuration() {
        let (transport, _publisher) = MockTransport::new();

        let result = SubscriberBuilder::new("acct")
            .page_size(0)
            .connect(MockRemote::new(), MemoryStore::default(), MockConnector::new(transport))
            .await;
        assert!(matches!(result, Err(SubscriberError::InvalidPageSize)));

        let (transport, _publisher) = MockTransport::new();
        let result = SubscriberBuilder::new("acct")
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_timeout(Duration::from_secs(10))
            .connect(MockRemote::new(), MemoryStore::default(), MockConnector::new(transport))
            .await;
        assert!(matches!(result, Err(SubscriberError::InvalidHeartbeat)));
    }

    #[tokio::test]
    async fn connect_seeds_missing_checkpoints_and_keeps_existing_ones() -> anyhow::Result<()> {
        let remote = MockRemote::new()
            .with_topic(resolved(key(1), "s:gold", 50))
            .with_topic(resolved(key(2), "s:land", 60));
        let store = Arc::new(MemoryStore::new(TopicFilter::new()).with_checkpoint(key(2), 75));
        let (transport, _publisher) = MockTransport::new();

        let subscriber = SubscriberBuilder::new("acct")
            .connect(remote, Arc::clone(&store), MockConnector::new(transport))
            .await?;

        assert_eq!(subscriber.identity(), "acct");
        assert_eq!(subscriber.topics().cloned().collect::<Vec<_>>(), vec![key(1), key(2)]);
        assert_eq!(subscriber.topic_state(&key(1)).map(|s| s.last_synced_timestamp), Some(50));
        assert_eq!(subscriber.topic_state(&key(2)).map(|s| s.last_synced_timestamp), Some(75));
        assert_eq!(store.checkpoint(&key(1)), Some(50));
        assert_eq!(store.checkpoint(&key(2)), Some(75));
        assert_eq!(store.topic_string(&key(2)).as_deref(), Some("s:land"));

        Ok(())
    }

    #[tokio::test]
    async fn connect_ignores_duplicate_topics() -> anyhow::Result<()> {
        let remote = MockRemote::new()
            .with_topic(resolved(key(1), "s:gold", 50))
            .with_topic(resolved(key(1), "s:gold", 50));
        let (transport, _publisher) = MockTransport::new();

        let subscriber = SubscriberBuilder::new("acct")
            .connect(remote, MemoryStore::default(), MockConnector::new(transport))
            .await?;

        assert_eq!(subscriber.topics().count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn connect_surfaces_resolution_and_store_failures() {
        let (transport, _publisher) = MockTransport::new();
        let result = SubscriberBuilder::new("acct")
            .connect(
                MockRemote::new().failing_resolution("unknown organization"),
                MemoryStore::default(),
                MockConnector::new(transport),
            )
            .await;
        assert!(matches!(result, Err(SubscriberError::Resolution(_))));

        let (transport, _publisher) = MockTransport::new();
        let result = SubscriberBuilder::new("acct")
            .connect(
                MockRemote::new().with_topic(resolved(key(1), "s:gold", 50)),
                FailingStore::default(),
                MockConnector::new(transport),
            )
            .await;
        assert!(matches!(result, Err(SubscriberError::Store(_))));
    }

    #[tokio::test]
    async fn start_fails_when_the_transport_cannot_connect() -> anyhow::Result<()> {
        let (transport, _publisher) = MockTransport::new();
        let connector = MockConnector::new(transport);
        connector.refuse_connections();

        let subscriber = SubscriberBuilder::new("acct")
            .connect(MockRemote::new(), MemoryStore::default(), connector)
            .await?;

        assert!(matches!(subscriber.start().await, Err(SubscriberError::Transport(_))));
        Ok(())
    }
}
