//! Retry policy with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

/// How long to wait between attempts and when to give up.
///
/// `max_attempts = None` retries forever; this is what the long-running relay
/// and projector loops use. Connection bootstrap uses a bounded policy so a
/// missing database is reported instead of blocking startup indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per consecutive failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates the default bounded policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never gives up.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Same delay for every retry.
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return self.base_delay.min(self.max_delay);
        }

        let mut delay = self.base_delay.as_secs_f64();
        for _ in 1..failures {
            delay *= self.multiplier;
            if delay >= self.max_delay.as_secs_f64() {
                return self.max_delay;
            }
        }

        Duration::from_secs_f64(delay).min(self.max_delay)
    }

    /// Returns true once `attempts` attempts have been used up.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Runs `op` until it succeeds or the policy is exhausted.
    ///
    /// Returns the last error when giving up.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(what, attempts, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if self.is_exhausted(attempts) => {
                    tracing::error!(what, attempts, error = %err, "giving up");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempts);
                    tracing::warn!(
                        what,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(50), Duration::from_millis(350));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = RetryPolicy::fixed(Duration::from_secs(2), None);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(9), Duration::from_secs(2));
        assert!(!policy.is_exhausted(1_000));
    }

    #[test]
    fn bounded_policy_exhausts() {
        let policy = RetryPolicy::new().with_max_attempts(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(Duration::from_millis(1), Some(3));

        let counter = Arc::clone(&calls);
        let result: Result<(), String> = policy
            .retry("always fails", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(Duration::from_millis(1), Some(5));

        let counter = Arc::clone(&calls);
        let result: Result<u32, String> = policy
            .retry("flaky", || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 { Err("not yet".to_string()) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }
}
