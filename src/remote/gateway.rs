use serde::Deserialize;
use serde_json::json;

use crate::{
    message::{Reply, Request},
    remote::{Error, RemoteClient, ResolvedTopic, SnapshotQuery},
    transport::TransportError,
    types::{EventBatch, TopicFilter, TopicKey},
};

/// A request/reply socket connected to the SDS gateway.
pub trait RequestSocket: Send + Sync + 'static {
    fn request(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;
}

/// [`RemoteClient`] speaking the SDS gateway commands over a [`RequestSocket`].
#[derive(Debug, Clone)]
pub struct GatewayClient<S> {
    socket: S,
}

#[derive(Deserialize)]
struct SmartcontractEntry {
    key: TopicKey,
    pre_deploy_block_timestamp: u64,
}

#[derive(Deserialize)]
struct SmartcontractFilterReply {
    smartcontracts: Vec<SmartcontractEntry>,
    topic_strings: Vec<String>,
}

impl<S: RequestSocket> GatewayClient<S> {
    #[must_use]
    pub fn new(socket: S) -> Self {
        Self { socket }
    }

    #[must_use]
    pub fn socket(&self) -> &S {
        &self.socket
    }

    async fn call(&self, request: Request) -> Result<Reply, Error> {
        let reply = self.socket.request(&request).await?;
        if !reply.is_ok() {
            return Err(Error::Reply(reply.message));
        }
        Ok(reply)
    }
}

impl<S: RequestSocket> RemoteClient for GatewayClient<S> {
    async fn resolve_topics(&self, filter: &TopicFilter) -> Result<Vec<ResolvedTopic>, Error> {
        let filter = serde_json::to_value(filter).map_err(|e| Error::Decode(e.to_string()))?;
        let request = Request::new("smartcontract_filters").param("topic_filter", filter);
        let reply = self.call(request).await?;

        let SmartcontractFilterReply { smartcontracts, topic_strings } =
            reply.parameters_as().map_err(|e| Error::Decode(e.to_string()))?;

        if smartcontracts.len() != topic_strings.len() {
            return Err(Error::Decode(format!(
                "{} smartcontracts but {} topic strings",
                smartcontracts.len(),
                topic_strings.len()
            )));
        }

        Ok(smartcontracts
            .into_iter()
            .zip(topic_strings)
            .map(|(sm, topic_string)| ResolvedTopic {
                key: sm.key,
                topic_string,
                pre_deploy_block_timestamp: sm.pre_deploy_block_timestamp,
            })
            .collect())
    }

    async fn fetch_page(&self, query: &SnapshotQuery) -> Result<EventBatch, Error> {
        let request = Request::new("snapshot_get")
            .param("smartcontract_key", json!(query.key))
            .param("block_timestamp_from", query.from)
            .param("block_timestamp_to", query.to)
            .param("page", query.page)
            .param("limit", query.limit);

        let reply = self.call(request).await?;
        reply.parameters_as().map_err(|e| Error::Decode(e.to_string()))
    }

    async fn probe_liveness(&self) -> Result<(), Error> {
        self.call(Request::new("heartbeat")).await.map(|_| ())
    }
}
