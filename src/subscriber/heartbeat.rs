//! Liveness watchdog for the remote service.
//!
//! The monitor probes the service every `interval` and arms a deadline of `timeout` that each
//! successful probe pushes back. The first probe failure or deadline expiry moves the monitor to
//! its terminal state: a single [`HealthSignal`] is emitted and the subscriber is stopped.

use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    LivenessError,
    remote::{RemoteClient, RobustClient},
};

/// Terminal health notification: the remote service is considered gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSignal {
    pub cause: LivenessError,
}

impl HealthSignal {
    /// Human-readable cause, e.g. `"Server is not responding"`.
    #[must_use]
    pub fn message(&self) -> String {
        self.cause.to_string()
    }
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

pub(crate) struct HeartbeatMonitor<C> {
    pub(crate) client: Arc<RobustClient<C>>,
    pub(crate) health: mpsc::UnboundedSender<HealthSignal>,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) cancel: CancellationToken,
}

impl<C: RemoteClient> HeartbeatMonitor<C> {
    /// Probes until the subscriber stops or the service is declared dead.
    ///
    /// Returns the failure that ended the monitor, or `None` if it was cancelled.
    pub(crate) async fn run(self) -> Option<LivenessError> {
        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);

        let failure = loop {
            let probe = tokio::select! {
                biased;

                () = self.cancel.cancelled() => return None,
                () = &mut deadline => break LivenessError::Timeout,
                probe = self.client.probe_liveness() => probe,
            };

            if let Err(e) = probe {
                break LivenessError::ProbeFailed(e.to_string());
            }
            deadline.as_mut().reset(Instant::now() + self.timeout);
            trace!("Heartbeat acknowledged");

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return None,
                () = &mut deadline => break LivenessError::Timeout,
                () = sleep(self.interval) => {}
            }
        };

        error!(error = %failure, "Remote service is unhealthy, stopping subscriber");
        if self.health.send(HealthSignal { cause: failure.clone() }).is_err() {
            debug!("Health stream dropped");
        }
        self.cancel.cancel();

        Some(failure)
    }
}
