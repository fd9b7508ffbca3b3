//! Scripted stand-ins for the remote service, the broadcast transport and the progress store.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use alloy::primitives::{Address, TxHash};
use parking_lot::Mutex;
use serde_json::{Map, json};
use tokio::sync::mpsc;

use crate::{
    Broadcast,
    remote::{Error, RemoteClient, ResolvedTopic, SnapshotQuery},
    store::{ProgressStore, StoreError},
    transport::{BroadcastTransport, RawMessage, TransportConnector, TransportError},
    types::{EventBatch, TopicFilter, TopicKey, Transaction},
};

/// A call observed by one of the mocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve,
    FetchPage { topic: String, page: u64 },
    Probe,
    Connect(String),
    Subscribe(String),
    Recv,
}

/// Records calls across mocks so tests can assert on their relative order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    /// Index of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.0.lock().iter().position(predicate)
    }

    /// Index of the last call matching `predicate`.
    pub fn last_position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.0.lock().iter().rposition(predicate)
    }
}

/// Scripted outcome of one liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ok,
    Fail(String),
    /// Never answers.
    Hang,
}

#[derive(Debug, Default)]
struct RemoteState {
    topics: Vec<ResolvedTopic>,
    resolve_failure: Option<String>,
    histories: HashMap<TopicKey, Vec<Transaction>>,
    failing_fetches: HashMap<TopicKey, usize>,
    server_time: u64,
    probes: VecDeque<Probe>,
    queries: Vec<SnapshotQuery>,
}

/// In-memory [`RemoteClient`] serving fixed topic histories.
///
/// Snapshot pages are cut from each topic's history by `from`, `to`, `page` and `limit`, the way
/// the gateway does. Probes follow the scripted sequence, then succeed.
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<RemoteState>>,
    probes: Arc<AtomicUsize>,
    calls: CallLog,
}

impl MockRemote {
    #[must_use]
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().server_time = 1_000_000;
        remote
    }

    #[must_use]
    pub fn with_call_log(mut self, calls: CallLog) -> Self {
        self.calls = calls;
        self
    }

    #[must_use]
    pub fn with_topic(self, topic: ResolvedTopic) -> Self {
        self.state.lock().topics.push(topic);
        self
    }

    #[must_use]
    pub fn failing_resolution(self, reason: impl Into<String>) -> Self {
        self.state.lock().resolve_failure = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_history(self, key: TopicKey, transactions: Vec<Transaction>) -> Self {
        self.state.lock().histories.insert(key, transactions);
        self
    }

    /// The next `count` page requests for `key` fail with a retryable error.
    #[must_use]
    pub fn failing_fetches(self, key: TopicKey, count: usize) -> Self {
        self.state.lock().failing_fetches.insert(key, count);
        self
    }

    /// Timestamp the server attaches to every page.
    #[must_use]
    pub fn with_server_time(self, timestamp: u64) -> Self {
        self.state.lock().server_time = timestamp;
        self
    }

    #[must_use]
    pub fn with_probes(self, probes: impl IntoIterator<Item = Probe>) -> Self {
        self.state.lock().probes.extend(probes);
        self
    }

    /// Every snapshot query received, failed attempts included.
    #[must_use]
    pub fn snapshot_queries(&self) -> Vec<SnapshotQuery> {
        self.state.lock().queries.clone()
    }

    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl RemoteClient for MockRemote {
    async fn resolve_topics(&self, _: &TopicFilter) -> Result<Vec<ResolvedTopic>, Error> {
        self.calls.push(Call::Resolve);
        let state = self.state.lock();
        match &state.resolve_failure {
            Some(reason) => Err(Error::Decode(reason.clone())),
            None => Ok(state.topics.clone()),
        }
    }

    async fn fetch_page(&self, query: &SnapshotQuery) -> Result<EventBatch, Error> {
        self.calls.push(Call::FetchPage { topic: query.key.to_string(), page: query.page });
        let mut state = self.state.lock();
        state.queries.push(query.clone());

        if let Some(remaining) = state.failing_fetches.get_mut(&query.key).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(TransportError::Receive("gateway unavailable".into()).into());
        }

        let to = if query.to == 0 { state.server_time } else { query.to };
        let matching: Vec<_> = state
            .histories
            .get(&query.key)
            .into_iter()
            .flatten()
            .filter(|tx| tx.block_timestamp >= query.from && tx.block_timestamp <= to)
            .cloned()
            .collect();

        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let skip = usize::try_from(query.page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(limit);
        let transactions = matching.into_iter().skip(skip).take(limit).collect();

        Ok(EventBatch { transactions, logs: Vec::new(), block_timestamp: state.server_time })
    }

    async fn probe_liveness(&self) -> Result<(), Error> {
        self.calls.push(Call::Probe);
        self.probes.fetch_add(1, Ordering::SeqCst);
        let probe = self.state.lock().probes.pop_front().unwrap_or(Probe::Ok);
        match probe {
            Probe::Ok => Ok(()),
            Probe::Fail(reason) => Err(Error::Reply(reason)),
            Probe::Hang => std::future::pending().await,
        }
    }
}

type Delivery = Result<RawMessage, String>;

/// In-memory [`BroadcastTransport`] fed by a [`MockPublisher`].
///
/// Once the publisher is dropped and the queue drained, `recv` returns the closed sentinel.
#[derive(Debug)]
pub struct MockTransport {
    receiver: mpsc::UnboundedReceiver<Delivery>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    calls: CallLog,
}

/// Publishes messages into a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockPublisher {
    sender: mpsc::UnboundedSender<Delivery>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> (Self, MockPublisher) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let transport =
            Self { receiver, subscriptions: Arc::clone(&subscriptions), calls: CallLog::default() };
        (transport, MockPublisher { sender, subscriptions })
    }

    #[must_use]
    pub fn with_call_log(mut self, calls: CallLog) -> Self {
        self.calls = calls;
        self
    }
}

impl MockPublisher {
    pub fn publish(&self, frames: RawMessage) {
        let _ = self.sender.send(Ok(frames));
    }

    /// Makes one `recv` call fail.
    pub fn publish_error(&self, reason: &str) {
        let _ = self.sender.send(Err(reason.to_owned()));
    }

    /// Queues the closed sentinel.
    pub fn close(&self) {
        let _ = self.sender.send(Ok(Vec::new()));
    }

    /// Filters registered on the transport so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

impl BroadcastTransport for MockTransport {
    async fn subscribe(&mut self, filter: &str) -> Result<(), TransportError> {
        self.calls.push(Call::Subscribe(filter.to_owned()));
        self.subscriptions.lock().push(filter.to_owned());
        Ok(())
    }

    async fn recv(&mut self) -> Result<RawMessage, TransportError> {
        self.calls.push(Call::Recv);
        match self.receiver.recv().await {
            Some(Ok(frames)) => Ok(frames),
            Some(Err(reason)) => Err(TransportError::Receive(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// Hands out a single [`MockTransport`].
#[derive(Debug)]
pub struct MockConnector {
    transport: Mutex<Option<MockTransport>>,
    refuse: AtomicBool,
    calls: CallLog,
}

impl MockConnector {
    #[must_use]
    pub fn new(transport: MockTransport) -> Self {
        let calls = transport.calls.clone();
        Self { transport: Mutex::new(Some(transport)), refuse: AtomicBool::new(false), calls }
    }

    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl TransportConnector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, identity: &str) -> Result<MockTransport, TransportError> {
        self.calls.push(Call::Connect(identity.to_owned()));
        let refused = || TransportError::Connect {
            endpoint: "mock://broadcast".into(),
            reason: "connection refused".into(),
        };
        if self.refuse.load(Ordering::SeqCst) {
            return Err(refused());
        }
        self.transport.lock().take().ok_or_else(refused)
    }
}

/// A [`ProgressStore`] whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    filter: TopicFilter,
}

impl ProgressStore for FailingStore {
    fn topic_filter(&self) -> TopicFilter {
        self.filter.clone()
    }

    fn checkpoint(&self, _: &TopicKey) -> Option<u64> {
        None
    }

    fn set_checkpoint(&self, key: &TopicKey, _: u64) -> Result<(), StoreError> {
        Err(StoreError::new(key, "checkpoint", "disk full"))
    }

    fn topic_string(&self, _: &TopicKey) -> Option<String> {
        None
    }

    fn set_topic_string(&self, key: &TopicKey, _: &str) -> Result<(), StoreError> {
        Err(StoreError::new(key, "topic_string", "disk full"))
    }
}

#[must_use]
pub fn resolved(
    key: TopicKey,
    topic_string: &str,
    pre_deploy_block_timestamp: u64,
) -> ResolvedTopic {
    ResolvedTopic { key, topic_string: topic_string.to_owned(), pre_deploy_block_timestamp }
}

/// One transaction per timestamp, in order.
pub fn transactions(timestamps: impl IntoIterator<Item = u64>) -> Vec<Transaction> {
    timestamps
        .into_iter()
        .enumerate()
        .map(|(index, block_timestamp)| Transaction {
            network_id: "1".into(),
            block_number: block_timestamp,
            block_timestamp,
            txid: TxHash::with_last_byte(block_timestamp.to_le_bytes()[0]),
            tx_index: index as u64,
            tx_from: Address::with_last_byte(0xaa),
            tx_to: Address::with_last_byte(0xbb),
            method: "transfer".into(),
            args: Map::new(),
            value: 0.0,
        })
        .collect()
}

/// Frames of an OK broadcast carrying `batch`.
#[must_use]
pub fn data_frames(topic: &str, batch: &EventBatch) -> RawMessage {
    let body = json!({ "status": "OK", "message": "", "parameters": batch });
    vec![topic.as_bytes().to_vec(), body.to_string().into_bytes()]
}

/// Frames of a failed broadcast.
#[must_use]
pub fn fail_frames(topic: &str, message: &str) -> RawMessage {
    let body = json!({ "status": "fail", "message": message });
    vec![topic.as_bytes().to_vec(), body.to_string().into_bytes()]
}

/// A data [`Broadcast`] with the given transactions, as the live loop would forward it.
#[must_use]
pub fn live_batch(topic: &str, transactions: Vec<Transaction>, block_timestamp: u64) -> Broadcast {
    Broadcast::data(topic, EventBatch { transactions, logs: Vec::new(), block_timestamp })
}
