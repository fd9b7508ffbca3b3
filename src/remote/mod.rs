//! Request/reply access to the SDS gateway.
//!
//! [`RemoteClient`] is the narrow contract the subscriber consumes: topic resolution, snapshot
//! pages and liveness probes. [`GatewayClient`] implements it over any [`RequestSocket`] by
//! speaking the SDS [message format](crate::message).
//!
//! [`RobustClient`] wraps a client with:
//! * a total timeout per call
//! * exponential backoff retries, capped at a maximum delay
//!
//! Liveness probes are deliberately passed through without retries: the heartbeat monitor owns
//! their timing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use sds_subscriber::remote::{GatewayClient, RequestSocket, RobustClientBuilder};
//!
//! # fn example(socket: impl RequestSocket) {
//! let client = RobustClientBuilder::new(GatewayClient::new(socket))
//!     .call_timeout(Duration::from_secs(30))
//!     .max_retries(5)
//!     .build();
//! # }
//! ```

mod builder;
mod gateway;
mod robust;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    transport::TransportError,
    types::{EventBatch, TopicFilter, TopicKey},
};

pub use builder::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY,
    RobustClientBuilder,
};
pub use gateway::{GatewayClient, RequestSocket};
pub use robust::{IntoRobustClient, RobustClient};

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Operation timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(Arc<TransportError>),
    #[error("remote replied with failure: {0}")]
    Reply(String),
    #[error("failed to decode reply: {0}")]
    Decode(String),
}

impl Error {
    /// Decoding failures are deterministic, so retrying them is pointless.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Decode(_))
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Error::Transport(Arc::new(error))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

/// One page request of a topic's backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotQuery {
    pub key: TopicKey,
    /// Lower bound, the topic's checkpoint when the backfill started.
    pub from: u64,
    /// Upper bound; `0` leaves the window open until the server fixes it on the first page.
    pub to: u64,
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
}

/// A smart contract selected by a [`TopicFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTopic {
    pub key: TopicKey,
    pub topic_string: String,
    /// Timestamp of the block preceding the contract's deployment, the backfill start for topics
    /// that were never synced.
    pub pre_deploy_block_timestamp: u64,
}

/// The remote services the subscriber depends on.
pub trait RemoteClient: Send + Sync + 'static {
    /// Lists the smart contracts matching `filter`.
    fn resolve_topics(
        &self,
        filter: &TopicFilter,
    ) -> impl Future<Output = Result<Vec<ResolvedTopic>, Error>> + Send;

    /// Fetches one page of a topic's history, oldest events first.
    fn fetch_page(
        &self,
        query: &SnapshotQuery,
    ) -> impl Future<Output = Result<EventBatch, Error>> + Send;

    /// Asks the gateway whether it is healthy.
    fn probe_liveness(&self) -> impl Future<Output = Result<(), Error>> + Send;
}
