use std::time::Duration;

use common::RetryPolicy;

/// Relay tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Identifies this instance in claim columns. Must be unique per
    /// running relay.
    pub worker_id: String,
    /// Maximum events claimed per cycle.
    pub batch_size: usize,
    /// Sleep between cycles that found less than a full batch.
    pub poll_interval: Duration,
    /// How long a claim keeps other relays away from a row.
    pub claim_lease: Duration,
    /// Backoff after failed cycles.
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("relay-{}", std::process::id()),
            batch_size: 10,
            poll_interval: Duration::from_secs(2),
            claim_lease: Duration::from_secs(30),
            retry: RetryPolicy::unbounded(),
        }
    }
}

impl RelayConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
