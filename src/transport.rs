//! Publish/subscribe transport abstraction.
//!
//! The subscriber never speaks a wire protocol itself. It asks a [`TransportConnector`] for a
//! [`BroadcastTransport`], registers one filter per topic and then drains messages. A socket
//! library (ZeroMQ SUB sockets in the SDS deployment) plugs in by implementing both traits.

use thiserror::Error;

/// A multipart message: frame 0 is the topic, the remaining frames hold the reply body.
///
/// An empty frame list is the transport's closed sentinel.
pub type RawMessage = Vec<Vec<u8>>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("failed to subscribe to {filter:?}: {reason}")]
    Subscribe { filter: String, reason: String },
    #[error("receive failed: {0}")]
    Receive(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A connected subscriber socket.
pub trait BroadcastTransport: Send + 'static {
    /// Starts delivering messages whose topic frame begins with `filter`.
    ///
    /// Messages published after this call returns are queued by the transport until
    /// [`recv`](Self::recv) drains them.
    fn subscribe(
        &mut self,
        filter: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next message. An empty [`RawMessage`] means the transport was closed.
    fn recv(&mut self) -> impl Future<Output = Result<RawMessage, TransportError>> + Send;
}

/// Opens [`BroadcastTransport`]s on behalf of an account.
pub trait TransportConnector: Send + Sync + 'static {
    type Transport: BroadcastTransport;

    /// Connects to the broadcast endpoint as `identity`.
    fn connect(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
