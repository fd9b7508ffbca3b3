#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use sds_subscriber::{
    MemoryStore, Subscriber, SubscriberBuilder, TopicKey,
    remote::RobustClientBuilder,
    test_utils::{CallLog, MockConnector, MockPublisher, MockRemote, MockTransport},
};
use tracing_subscriber::EnvFilter;

pub struct SubscriberSetup {
    pub subscriber: Subscriber<MockRemote, Arc<MemoryStore>, MockConnector>,
    pub remote: MockRemote,
    pub store: Arc<MemoryStore>,
    pub publisher: MockPublisher,
    pub calls: CallLog,
}

pub fn topic(n: u8) -> TopicKey {
    TopicKey::new("1", Address::with_last_byte(n))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connects a subscriber over mocks sharing one call log. Retries are fast so failure paths
/// settle within milliseconds.
pub async fn setup_subscriber(
    remote: MockRemote,
    store: MemoryStore,
    builder: SubscriberBuilder,
) -> anyhow::Result<SubscriberSetup> {
    init_tracing();

    let calls = CallLog::default();
    let remote = remote.with_call_log(calls.clone());
    let (transport, publisher) = MockTransport::new();
    let connector = MockConnector::new(transport.with_call_log(calls.clone()));
    let store = Arc::new(store);

    let client = RobustClientBuilder::new(remote.clone())
        .max_retries(2)
        .min_delay(Duration::from_millis(1))
        .build();
    let subscriber = builder.connect(client, Arc::clone(&store), connector).await?;

    Ok(SubscriberSetup { subscriber, remote, store, publisher, calls })
}
