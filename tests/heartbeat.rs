mod common;

use std::time::Duration;

use common::{SubscriberSetup, setup_subscriber, topic};
use sds_subscriber::{
    HealthSignal, LivenessError, MemoryStore, SubscriberBuilder, assert_closed, assert_next,
    assert_next_data,
    test_utils::{Call, MockRemote, Probe, resolved, transactions},
};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn failed_probe_stops_the_subscriber() -> anyhow::Result<()> {
    let remote = MockRemote::new().with_probes([Probe::Ok, Probe::Fail("maintenance".into())]);
    let SubscriberSetup { subscriber, remote, publisher: _publisher, .. } =
        setup_subscriber(remote, MemoryStore::default(), SubscriberBuilder::new("acct")).await?;
    let started = Instant::now();

    let mut subscription = subscriber.start().await?;

    assert_next!(
        subscription.health,
        HealthSignal {
            cause: LivenessError::ProbeFailed("remote replied with failure: maintenance".into())
        }
    );
    assert!(started.elapsed() < Duration::from_millis(2010));
    assert_closed!(subscription.health);
    assert_closed!(subscription.events);
    assert!(subscription.handle.is_stopped());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(remote.probe_count(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_probes_trip_the_watchdog() -> anyhow::Result<()> {
    let remote = MockRemote::new().with_probes([Probe::Hang]);
    let SubscriberSetup { subscriber, publisher: _publisher, .. } =
        setup_subscriber(remote, MemoryStore::default(), SubscriberBuilder::new("acct")).await?;
    let started = Instant::now();

    let mut subscription = subscriber.start().await?;

    assert_next!(subscription.health, HealthSignal { cause: LivenessError::Timeout }, timeout = 15);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_millis(10_010));
    assert_closed!(subscription.events);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn custom_heartbeat_timing_is_honoured() -> anyhow::Result<()> {
    let remote = MockRemote::new().with_probes([Probe::Ok, Probe::Ok, Probe::Hang]);
    let builder = SubscriberBuilder::new("acct")
        .heartbeat_interval(Duration::from_millis(500))
        .heartbeat_timeout(Duration::from_secs(3));
    let SubscriberSetup { subscriber, publisher: _publisher, .. } =
        setup_subscriber(remote, MemoryStore::default(), builder).await?;
    let started = Instant::now();

    let mut subscription = subscriber.start().await?;

    assert_next!(subscription.health, HealthSignal { cause: LivenessError::Timeout });
    // Last successful probe at 500ms, deadline three seconds later.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3500) && elapsed < Duration::from_millis(3510));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn heartbeat_starts_only_after_the_backfill() -> anyhow::Result<()> {
    let a = topic(1);
    let remote = MockRemote::new()
        .with_topic(resolved(a.clone(), "s:gold", 0))
        .with_history(a.clone(), transactions([1, 2, 3]));
    let SubscriberSetup { subscriber, calls, publisher: _publisher, .. } =
        setup_subscriber(remote, MemoryStore::default(), SubscriberBuilder::new("acct")).await?;

    let mut subscription = subscriber.start().await?;
    assert_next_data!(subscription.events, a);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let first_probe = calls.position(|c| *c == Call::Probe).unwrap();
    let last_fetch = calls.last_position(|c| matches!(c, Call::FetchPage { .. })).unwrap();
    assert!(first_probe > last_fetch);

    subscription.handle.stop();
    assert_closed!(subscription.health);

    Ok(())
}
