use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;

use crate::{
    remote::{Error, RemoteClient, ResolvedTopic, RobustClientBuilder, SnapshotQuery},
    types::{EventBatch, TopicFilter},
};

/// Client wrapper with built-in retry and timeout mechanisms.
#[derive(Debug, Clone)]
pub struct RobustClient<C> {
    pub(crate) inner: C,
    pub(crate) call_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl<C: RemoteClient> RobustClient<C> {
    /// Resolve the topics matching `filter` with retry and timeout.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn resolve_topics(&self, filter: &TopicFilter) -> Result<Vec<ResolvedTopic>, Error> {
        debug!("smartcontract_filters called");
        let result = self.try_operation(|| self.inner.resolve_topics(filter)).await;
        if let Err(e) = &result {
            error!(error = %e, "smartcontract_filters failed");
        }
        result
    }

    /// Fetch one snapshot page with retry and timeout.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn fetch_page(&self, query: &SnapshotQuery) -> Result<EventBatch, Error> {
        trace!(topic = %query.key, page = query.page, "snapshot_get called");
        let result = self.try_operation(|| self.inner.fetch_page(query)).await;
        if let Err(e) = &result {
            error!(topic = %query.key, page = query.page, error = %e, "snapshot_get failed");
        }
        result
    }

    /// Probe the remote service once.
    ///
    /// No retry and no timeout are applied: a probe that fails must be reported, and a probe that
    /// hangs is caught by the caller's watchdog.
    ///
    /// # Errors
    ///
    /// Propagates the wrapped client's error.
    pub async fn probe_liveness(&self) -> Result<(), Error> {
        self.inner.probe_liveness().await
    }

    /// Execute `operation` with exponential backoff and a total timeout.
    ///
    /// The whole sequence of attempts, including the backoff sleeps, must finish within
    /// `call_timeout`.
    ///
    /// # Errors
    /// <a name="retry-errors"></a>
    ///
    /// * [`Error::Timeout`] if `call_timeout` elapses.
    /// * The last attempt's error once `max_retries` retries were spent, or immediately for
    ///   errors that are not [retryable](Error::is_retryable).
    pub(crate) async fn try_operation<T, F, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay);

        timeout(
            self.call_timeout,
            operation
                .retry(retry_strategy)
                .when(Error::is_retryable)
                .notify(|err: &Error, dur: Duration| {
                    info!(error = %err, delay_ms = dur.as_millis(), "Remote error, retrying");
                })
                .sleep(tokio::time::sleep),
        )
        .await?
    }
}

/// Conversion trait for types that can be turned into a [`RobustClient`].
pub trait IntoRobustClient {
    type Client: RemoteClient;

    fn into_robust_client(self) -> RobustClient<Self::Client>;
}

impl<C: RemoteClient> IntoRobustClient for C {
    type Client = C;

    fn into_robust_client(self) -> RobustClient<C> {
        RobustClientBuilder::new(self).build()
    }
}

impl<C: RemoteClient> IntoRobustClient for RobustClient<C> {
    type Client = C;

    fn into_robust_client(self) -> RobustClient<C> {
        self
    }
}
