use std::time::Duration;

use crate::remote::{RemoteClient, RobustClient};

/// Default total timeout of one remote call, retries included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default maximum number of retry attempts.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay between retries.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
/// Default cap on the delay between retries.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Builder for constructing a [`RobustClient`].
#[derive(Debug, Clone)]
pub struct RobustClientBuilder<C> {
    client: C,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl<C: RemoteClient> RobustClientBuilder<C> {
    /// Wraps `client` with the default timeout and retry settings.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Set the maximum time a call may take, retries included.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts.
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff retries.
    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Set the upper bound of the backoff delay.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Build the `RobustClient`.
    #[must_use]
    pub fn build(self) -> RobustClient<C> {
        debug!(
            call_timeout_ms = self.call_timeout.as_millis(),
            max_retries = self.max_retries,
            min_delay_ms = self.min_delay.as_millis(),
            "Building RobustClient"
        );

        RobustClient {
            inner: self.client,
            call_timeout: self.call_timeout,
            max_retries: self.max_retries,
            min_delay: self.min_delay,
            max_delay: self.max_delay.max(self.min_delay),
        }
    }
}
