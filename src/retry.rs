//! Bounded exponential backoff for connection establishment
//!
//! Attempt `i` (0-based) that fails waits `base_delay * 2^i` before attempt
//! `i + 1`. The final attempt never waits; its failure ends the run.
//!
//! ```text
//! Attempting(0) -> Waiting -> Attempting(1) -> ... -> Attempting(max_retries) -> Failed
//!        \_____________________ any success ____________________/-> Succeeded
//! ```

use config::ConnectionOptions;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::errors::ConnHausError;

/// One transition of a retry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Waiting {
        attempt: u32,
        delay: Duration,
        last_error: String,
    },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: false,
        }
    }

    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self::new(options.max_retries, options.retry_delay()).with_jitter(options.retry_jitter)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Un-jittered delay after a failed attempt: `base_delay * 2^attempt`, saturating
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Delay to wait after `attempt` failed, or `None` when it was the last one
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay = self.backoff_delay(attempt);
        Some(if self.jitter { jittered(delay) } else { delay })
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ConnHausError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ConnHausError>>,
    {
        self.execute_observed(operation, |_| {}).await
    }

    /// Like [`RetryPolicy::execute`], reporting every state transition to `observer`
    pub async fn execute_observed<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut observer: O,
    ) -> Result<T, ConnHausError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ConnHausError>>,
        O: FnMut(&RetryState),
    {
        let mut attempt = 0;
        loop {
            observer(&RetryState::Attempting { attempt });

            let error = match operation(attempt).await {
                Ok(value) => {
                    observer(&RetryState::Succeeded {
                        attempts: attempt + 1,
                    });
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => error,
            };

            let last_error = match error {
                ConnHausError::Transient(message) => message,
                other => other.to_string(),
            };

            match self.delay_after(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        total = self.total_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "connection attempt failed, retrying"
                    );
                    observer(&RetryState::Waiting {
                        attempt,
                        delay,
                        last_error,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    let attempts = attempt + 1;
                    observer(&RetryState::Failed { attempts });
                    return Err(ConnHausError::exhausted(attempts, last_error));
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&ConnectionOptions::default())
    }
}

/// Spread a delay by up to ±25%
fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis().min(u64::MAX as u128) as u64;
    let range = millis / 4;
    if range == 0 {
        return delay;
    }
    let offset = rand::rng().random_range(0..=range * 2);
    Duration::from_millis(millis.saturating_sub(range).saturating_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total_attempts(), 4);
        assert_eq!(policy.delay_after(0), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(4000)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn test_zero_retries_never_waits() {
        let policy = RetryPolicy::new(0, Duration::from_millis(500));
        assert_eq!(policy.total_attempts(), 1);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(40), Duration::MAX);
        assert_eq!(policy.total_attempts(), u32::MAX);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000)).with_jitter(true);
        for _ in 0..50 {
            let delay = policy.delay_after(1).unwrap();
            assert!(delay >= Duration::from_millis(1500));
            assert!(delay <= Duration::from_millis(2500));
        }
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let mut states = Vec::new();

        let result: Result<(), _> = policy
            .execute_observed(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ConnHausError::transient("refused")) }
                },
                |state| states.push(state.clone()),
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, ConnHausError::ExhaustedRetries { attempts: 2, .. }));
        assert_eq!(
            err.to_string(),
            "Failed to establish connection after 2 attempts: refused"
        );
        assert_eq!(
            states,
            vec![
                RetryState::Attempting { attempt: 0 },
                RetryState::Waiting {
                    attempt: 0,
                    delay: Duration::from_millis(1),
                    last_error: "refused".to_string(),
                },
                RetryState::Attempting { attempt: 1 },
                RetryState::Failed { attempts: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_success_short_circuits() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let value = policy
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ConnHausError::transient("not yet"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_configuration_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnHausError::configuration("unsupported scheme")) }
            })
            .await;

        assert!(matches!(result, Err(ConnHausError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
