use std::sync::Arc;

use thiserror::Error;

use crate::{
    message::ParseError, remote::Error as RemoteError, store::StoreError,
    transport::TransportError,
};

/// Errors emitted by the subscriber.
///
/// `SubscriberError` values are returned by [`SubscriberBuilder::connect`] and
/// [`Subscriber::start`], and are carried inside failure [`Broadcast`]s produced by the
/// snapshot workers and the live loop.
///
/// [`SubscriberBuilder::connect`]: crate::SubscriberBuilder::connect
/// [`Subscriber::start`]: crate::Subscriber::start
/// [`Broadcast`]: crate::Broadcast
#[derive(Error, Debug, Clone)]
pub enum SubscriberError {
    /// Topic discovery against the remote categorizer failed.
    #[error("Topic resolution failed: {0}")]
    Resolution(RemoteError),

    /// The progress store rejected a write.
    #[error("Progress store error: {0}")]
    Store(#[from] StoreError),

    /// A remote request failed after all retries were spent.
    #[error("Remote request failed: {0}")]
    Remote(RemoteError),

    /// The publish/subscribe transport failed to connect, subscribe or receive.
    #[error("Transport error: {0}")]
    Transport(Arc<TransportError>),

    /// A broadcast could not be decoded.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The remote service stopped answering liveness probes.
    #[error("Liveness check failed: {0}")]
    Liveness(#[from] LivenessError),

    /// An internal ordering guarantee was broken, e.g. a topic completed its backfill twice.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The configured snapshot page size is invalid (must be greater than zero).
    #[error("Page size must be greater than 0")]
    InvalidPageSize,

    /// The heartbeat interval must be non-zero and shorter than the heartbeat timeout.
    #[error("Heartbeat interval must be greater than 0 and less than the heartbeat timeout")]
    InvalidHeartbeat,
}

impl From<TransportError> for SubscriberError {
    fn from(error: TransportError) -> Self {
        SubscriberError::Transport(Arc::new(error))
    }
}

impl From<RemoteError> for SubscriberError {
    fn from(error: RemoteError) -> Self {
        SubscriberError::Remote(error)
    }
}

/// Why the heartbeat monitor gave up on the remote service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LivenessError {
    /// No probe succeeded before the watchdog deadline.
    #[error("Server is not responding")]
    Timeout,

    /// A probe returned a failed reply or a transport error.
    #[error("Heartbeat probe failed: {0}")]
    ProbeFailed(String),
}
