//! SDS gateway message format.
//!
//! Requests are JSON objects `{"command": ..., "parameters": {...}}`; replies are
//! `{"status": "OK" | "fail", "message": ..., "parameters": {...}}`. A broadcast on the
//! publish/subscribe transport is a multipart message whose first frame is the topic and whose
//! remaining frames, concatenated, hold a reply.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::{SubscriberError, transport::RawMessage, types::EventBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "fail")]
    Fail,
}

/// A command sent to a request/reply service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Request {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), parameters: Map::new() }
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_owned(), value.into());
        self
    }
}

/// The answer of a request/reply service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Reply {
    #[must_use]
    pub fn ok(parameters: Map<String, Value>) -> Self {
        Self { status: Status::Ok, message: String::new(), parameters }
    }

    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self { status: Status::Fail, message: message.into(), parameters: Map::new() }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Decodes a reply from its JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if the bytes are not a valid reply.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(bytes).map_err(|e| ParseError::Json(e.to_string()))
    }

    /// Deserializes the reply parameters into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Parameters`] if the parameters do not match `T`.
    pub fn parameters_as<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_json::from_value(Value::Object(self.parameters.clone()))
            .map_err(|e| ParseError::Parameters(e.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected a topic frame and at least one reply frame, got {0} frame(s)")]
    MissingFrames(usize),
    #[error("topic frame is not valid UTF-8")]
    InvalidTopic,
    #[error("invalid reply: {0}")]
    Json(String),
    #[error("invalid reply parameters: {0}")]
    Parameters(String),
}

/// One item of the subscriber's event output.
///
/// Snapshot pages and live broadcasts are both delivered as `Broadcast`s. Failures are
/// delivered in-band with [`Status::Fail`] and no batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Topic the message belongs to: a [`TopicKey`](crate::TopicKey) string, or the subscriber
    /// identity for failures not tied to a topic.
    pub topic: String,
    pub status: Status,
    pub message: String,
    pub batch: Option<EventBatch>,
}

impl Broadcast {
    #[must_use]
    pub fn data(topic: impl Into<String>, batch: EventBatch) -> Self {
        Self { topic: topic.into(), status: Status::Ok, message: String::new(), batch: Some(batch) }
    }

    #[must_use]
    pub fn fail(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self { topic: topic.into(), status: Status::Fail, message: message.into(), batch: None }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Decodes a broadcast received from the publish/subscribe transport.
    ///
    /// An OK reply must carry an [`EventBatch`] in its parameters; a failed reply keeps only its
    /// message.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the frames do not form a valid broadcast.
    pub fn parse(frames: &RawMessage) -> Result<Self, ParseError> {
        let [topic, body @ ..] = frames.as_slice() else {
            return Err(ParseError::MissingFrames(0));
        };
        if body.is_empty() {
            return Err(ParseError::MissingFrames(frames.len()));
        }

        let topic = std::str::from_utf8(topic).map_err(|_| ParseError::InvalidTopic)?.to_owned();
        let reply = Reply::from_slice(&body.concat())?;

        let batch = match reply.status {
            Status::Ok => Some(reply.parameters_as::<EventBatch>()?),
            Status::Fail => None,
        };

        Ok(Self { topic, status: reply.status, message: reply.message, batch })
    }
}

impl From<(&str, SubscriberError)> for Broadcast {
    fn from((topic, error): (&str, SubscriberError)) -> Self {
        Broadcast::fail(topic, error.to_string())
    }
}

/// Forwards a message downstream, reporting whether the consumer is still listening.
pub(crate) trait TryStream {
    fn try_stream(&self, msg: Broadcast) -> bool;
}

impl TryStream for UnboundedSender<Broadcast> {
    fn try_stream(&self, msg: Broadcast) -> bool {
        trace!(topic = %msg.topic, status = ?msg.status, "Sending broadcast");
        if let Err(err) = self.send(msg) {
            warn!(error = %err, "Downstream channel closed, stopping stream");
            return false;
        }
        true
    }
}
