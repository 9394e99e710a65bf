use std::future::Future;
use std::time::Duration;

use quill_core::errors::ProviderError;

/// Retry policy for a single provider operation. Delays double on every
/// attempt; no jitter is added (deterministic backoff is a documented
/// simplification, not a correctness requirement).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    pub retries: u32,
    pub initial_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { retries: 3, initial_delay: Duration::from_millis(1000) }
    }
}

impl BackoffConfig {
    pub fn new(retries: u32, initial_delay: Duration) -> Self {
        Self { retries, initial_delay }
    }

    /// Delay before the retry following attempt number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `operation`, retrying transient failures (rate-limit or
/// connection-reset) until the retry budget is spent. Non-transient errors
/// and the final exhausted error propagate unchanged.
pub async fn run_with_backoff<T, F, Fut>(
    config: &BackoffConfig,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts_so_far = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempts_so_far < config.retries => {
                let wait = config.delay_for_attempt(attempts_so_far);
                tracing::debug!(
                    event_name = "scheduler.backoff.retry",
                    attempt = attempts_so_far + 1,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(wait).await;
                attempts_so_far += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use quill_core::errors::ProviderError;
    use tokio::time::Instant;

    use super::{run_with_backoff, BackoffConfig};

    #[test]
    fn delays_double_per_attempt() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = run_with_backoff(&BackoffConfig::default(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ProviderError::RateLimited("429".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two transient failures: 1s + 2s of deterministic backoff.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_propagate_without_retry() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = run_with_backoff(&BackoffConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Status { status: 400, message: "bad".to_string() }) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = run_with_backoff(
            &BackoffConfig::new(2, Duration::from_millis(100)),
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(ProviderError::ConnectionReset(format!("reset #{attempt}"))) }
            },
        )
        .await;

        assert_eq!(result, Err(ProviderError::ConnectionReset("reset #2".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
