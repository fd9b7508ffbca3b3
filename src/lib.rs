//! A gap-free event subscriber for SDS smart-contract topics.
//!
//! The subscriber resolves a set of topics from a [`TopicFilter`], backfills each topic's history
//! page by page from its last checkpoint, and then switches to live broadcasts. Live messages
//! published while the backfill runs are queued by the transport, so no event falls between the
//! two phases.
//!
//! The main entry point is [`SubscriberBuilder`]:
//!
//! ```rust,no_run
//! use sds_subscriber::{
//!     MemoryStore, SubscriberBuilder, TopicFilter,
//!     remote::{GatewayClient, RequestSocket},
//!     transport::TransportConnector,
//! };
//! use tokio_stream::StreamExt;
//!
//! # async fn example(
//! #     socket: impl RequestSocket,
//! #     connector: impl TransportConnector,
//! # ) -> Result<(), sds_subscriber::SubscriberError> {
//! let store = MemoryStore::new(TopicFilter::new().organization("sds").network_id("1"));
//! let subscriber = SubscriberBuilder::new("my-account")
//!     .page_size(200)
//!     .connect(GatewayClient::new(socket), store, connector)
//!     .await?;
//!
//! let mut subscription = subscriber.start().await?;
//! while let Some(broadcast) = subscription.events.next().await {
//!     if !broadcast.is_ok() {
//!         eprintln!("{}: {}", broadcast.topic, broadcast.message);
//!         continue;
//!     }
//!     // handle broadcast.batch
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Stream items
//!
//! [`Subscription::events`] yields [`Broadcast`]s: snapshot pages and live messages with
//! [`Status::Ok`], and failures with [`Status::Fail`]. A failed snapshot produces a failure on
//! the topic's key; a failure of the live phase is reported on the subscriber identity and ends
//! the stream.
//!
//! [`Subscription::health`] yields at most one [`HealthSignal`] when the remote service stops
//! answering liveness probes.
//!
//! # Ordering
//!
//! Pages of one topic arrive in page order. All snapshot pages arrive before the first live
//! message. There is no ordering across topics during the snapshot phase.
//!
//! # Checkpoints
//!
//! A topic's checkpoint is persisted in the [`ProgressStore`] before the page that advanced it is
//! forwarded. After a restart, events at the checkpoint timestamp may be delivered again.

#[macro_use]
mod logging;

pub mod remote;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

mod error;
mod message;
mod store;
mod subscriber;
mod types;

pub use error::{LivenessError, SubscriberError};
pub use message::{Broadcast, ParseError, Reply, Request, Status};
pub use store::{MemoryStore, ProgressStore, StoreError};
pub use subscriber::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_CONSECUTIVE_RECV_ERRORS,
    DEFAULT_PAGE_SIZE, EventStream, HealthSignal, HealthStream, Subscriber, SubscriberBuilder,
    SubscriberHandle, Subscription,
};
pub use types::{
    EventBatch, InvalidTopicKey, Log, TopicFilter, TopicKey, TopicState, Transaction,
};
