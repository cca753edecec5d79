// Retry policy for service requests
// Exponential backoff with jitter; a server back-off hint takes precedence

use crate::error::DocDbError;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            jitter: true,
        }
    }

    /// A policy that makes a single attempt
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn execute_async<F, T, Fut>(&self, operation: F) -> Result<T, DocDbError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DocDbError>>,
    {
        self.execute_if(DocDbError::is_retryable, operation).await
    }

    /// Like [`execute_async`](Self::execute_async), retrying only errors `should_retry` accepts
    pub async fn execute_if<P, F, T, Fut>(
        &self,
        should_retry: P,
        mut operation: F,
    ) -> Result<T, DocDbError>
    where
        P: Fn(&DocDbError) -> bool,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DocDbError>>,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) if !should_retry(&err) => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt, &err);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay before the next attempt; `attempt` counts from 1
    pub fn delay_for(&self, attempt: u32, err: &DocDbError) -> Duration {
        if let Some(hint) = err.retry_after() {
            return hint.min(self.max_delay);
        }
        self.calculate_delay(attempt)
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || exponential.is_zero() {
            return exponential;
        }

        // up to +20%, still capped
        let spread = exponential.as_millis() as u64 / 5;
        let extra = rand::thread_rng().gen_range(0..=spread);
        (exponential + Duration::from_millis(extra)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350))
            .with_jitter(false);
        let err = DocDbError::network("reset");

        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, &err), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1));
        let err = DocDbError::network("reset");

        for _ in 0..50 {
            let delay = policy.delay_for(2, &err);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(240));
        }
    }

    #[test]
    fn test_server_hint_wins() {
        let policy = RetryPolicy::default();
        let err = DocDbError::throttled("slow down", Some(Duration::from_millis(1500)));

        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_throttled_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute_async(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DocDbError::throttled("busy", Some(Duration::from_millis(10))))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .execute_async(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DocDbError::conflict("exists")) }
            })
            .await;

        assert_eq!(result.unwrap_err().status_code(), Some(409));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
