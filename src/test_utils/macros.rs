use std::time::Duration;

use tokio_stream::{Stream, StreamExt};

use crate::{Broadcast, Status, types::EventBatch};

#[macro_export]
macro_rules! assert_next {
    ($stream: expr, $expected: expr) => {
        $crate::assert_next!($stream, $expected, timeout = 5)
    };
    ($stream: expr, $expected: expr, timeout = $secs: expr) => {
        let message = tokio::time::timeout(
            std::time::Duration::from_secs($secs),
            tokio_stream::StreamExt::next(&mut $stream),
        )
        .await
        .expect("timed out");
        let expected = $expected;
        match message {
            std::option::Option::Some(msg) => {
                assert_eq!(msg, expected, "Expected {:?}, got {:?}", expected, msg);
            }
            std::option::Option::None => {
                panic!("Expected {:?}, but channel was closed", expected);
            }
        }
    };
}

#[macro_export]
macro_rules! assert_closed {
    ($stream: expr) => {
        $crate::assert_closed!($stream, timeout = 5)
    };
    ($stream: expr, timeout = $secs: expr) => {
        let message = tokio::time::timeout(
            std::time::Duration::from_secs($secs),
            tokio_stream::StreamExt::next(&mut $stream),
        )
        .await
        .expect("timed out");
        assert!(message.is_none(), "Expected closed stream, got {:?}", message)
    };
}

/// Asserts that the next broadcast is a data page on `topic` and evaluates to its batch.
///
/// # Panics
///
/// * **Timeout**: nothing arrives within the timeout (default 5 seconds).
/// * **Wrong message**: the broadcast is a failure or belongs to another topic.
/// * **Stream closed**.
#[macro_export]
macro_rules! assert_next_data {
    ($stream: expr, $topic: expr) => {
        $crate::assert_next_data!($stream, $topic, timeout = 5)
    };
    ($stream: expr, $topic: expr, timeout = $secs: expr) => {
        $crate::test_utils::macros::expect_data(&mut $stream, &$topic.to_string(), $secs).await
    };
}

/// Asserts that the next broadcast is a failure on `topic` and evaluates to its message.
#[macro_export]
macro_rules! assert_next_fail {
    ($stream: expr, $topic: expr) => {
        $crate::assert_next_fail!($stream, $topic, timeout = 5)
    };
    ($stream: expr, $topic: expr, timeout = $secs: expr) => {
        $crate::test_utils::macros::expect_fail(&mut $stream, &$topic.to_string(), $secs).await
    };
}

async fn next_broadcast<S>(stream: &mut S, timeout_secs: u64) -> Broadcast
where
    S: Stream<Item = Broadcast> + Unpin,
{
    let message = tokio::time::timeout(Duration::from_secs(timeout_secs), stream.next())
        .await
        .expect("timed out");
    message.expect("Expected a broadcast, but channel was closed")
}

pub async fn expect_data<S>(stream: &mut S, topic: &str, timeout_secs: u64) -> EventBatch
where
    S: Stream<Item = Broadcast> + Unpin,
{
    let broadcast = next_broadcast(stream, timeout_secs).await;
    assert_eq!(broadcast.status, Status::Ok, "Expected data on {topic}, got {broadcast:?}");
    assert_eq!(broadcast.topic, topic, "Expected data on {topic}, got {broadcast:?}");
    broadcast.batch.expect("OK broadcast without batch")
}

pub async fn expect_fail<S>(stream: &mut S, topic: &str, timeout_secs: u64) -> String
where
    S: Stream<Item = Broadcast> + Unpin,
{
    let broadcast = next_broadcast(stream, timeout_secs).await;
    assert_eq!(broadcast.status, Status::Fail, "Expected failure on {topic}, got {broadcast:?}");
    assert_eq!(broadcast.topic, topic, "Expected failure on {topic}, got {broadcast:?}");
    broadcast.message
}
