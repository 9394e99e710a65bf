use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quill_core::config::BucketConfig;
use quill_core::errors::{ProviderError, SchedulerError};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::backoff::{run_with_backoff, BackoffConfig};
use crate::quota::DailyQuota;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Token bucket capacity; the bucket refills to this value every
    /// `refill_interval`, it does not accumulate.
    pub capacity: u32,
    pub refill_interval: Duration,
    pub max_in_flight: u32,
    pub backoff: BackoffConfig,
}

impl SchedulerConfig {
    pub fn from_bucket(bucket: &BucketConfig, backoff: BackoffConfig) -> Self {
        Self {
            capacity: bucket.capacity,
            refill_interval: Duration::from_secs(bucket.refill_interval_secs),
            max_in_flight: bucket.max_in_flight,
            backoff,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    available: u32,
    last_refill: Instant,
}

/// Admission gate in front of the generation provider.
///
/// `schedule` applies, in order: the shared daily-quota check (fail fast,
/// nothing consumed), the in-flight cap (a fair semaphore, so waiters are
/// served FIFO), one bucket token (waiting for the next refill when empty),
/// and finally the backoff executor around the operation itself. The daily
/// counter moves only when the operation ultimately succeeds.
///
/// The FIFO guarantee holds at the semaphore. With `max_in_flight` of 1
/// (the default for both buckets) that ordering carries through to token
/// grants; with a larger cap, the up-to-K admitted tasks race for tokens
/// on each refill and may be granted out of arrival order.
#[derive(Debug)]
pub struct Scheduler {
    name: &'static str,
    config: SchedulerConfig,
    bucket: Mutex<BucketState>,
    in_flight: Semaphore,
    quota: Arc<DailyQuota>,
}

impl Scheduler {
    pub fn new(name: &'static str, config: SchedulerConfig, quota: Arc<DailyQuota>) -> Self {
        Self {
            name,
            bucket: Mutex::new(BucketState {
                available: config.capacity,
                last_refill: Instant::now(),
            }),
            in_flight: Semaphore::new(config.max_in_flight as usize),
            config,
            quota,
        }
    }

    pub fn quota(&self) -> &Arc<DailyQuota> {
        &self.quota
    }

    pub async fn schedule<T, F, Fut>(&self, operation: F) -> Result<T, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.quota.check().await?;

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| SchedulerError::Provider(ProviderError::Other(
                "scheduler is shut down".to_string(),
            )))?;
        self.acquire_token().await;

        tracing::debug!(
            event_name = "scheduler.operation.admitted",
            scheduler = self.name,
            "operation admitted"
        );

        match run_with_backoff(&self.config.backoff, operation).await {
            Ok(value) => {
                self.quota.record_success().await;
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "scheduler.operation.failed",
                    scheduler = self.name,
                    error = %error,
                    transient = error.is_transient(),
                    "scheduled operation failed"
                );
                Err(SchedulerError::Provider(error))
            }
        }
    }

    /// Tokens currently in the bucket, after applying any due refill.
    /// Exposed for observability and tests.
    pub async fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        refill(&self.config, &mut bucket);
        bucket.available
    }

    async fn acquire_token(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                refill(&self.config, &mut bucket);
                if bucket.available > 0 {
                    bucket.available -= 1;
                    return;
                }
                self.config.refill_interval.saturating_sub(bucket.last_refill.elapsed())
            };
            tokio::time::sleep(wait).await;
        }
    }
}

fn refill(config: &SchedulerConfig, bucket: &mut BucketState) {
    let elapsed = bucket.last_refill.elapsed();
    if elapsed < config.refill_interval {
        return;
    }
    // Refill to capacity and advance the refill clock by whole intervals so
    // the cadence stays fixed rather than sliding with each admission.
    let periods = (elapsed.as_nanos() / config.refill_interval.as_nanos().max(1)) as u32;
    bucket.available = config.capacity;
    bucket.last_refill += config.refill_interval.saturating_mul(periods);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use quill_core::errors::{ProviderError, SchedulerError};
    use tokio::time::Instant;

    use super::{BackoffConfig, DailyQuota, Scheduler, SchedulerConfig};

    fn config(capacity: u32, refill_secs: u64) -> SchedulerConfig {
        SchedulerConfig {
            capacity,
            refill_interval: Duration::from_secs(refill_secs),
            max_in_flight: 1,
            backoff: BackoffConfig::new(3, Duration::from_millis(10)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_never_exceed_capacity() {
        let quota = Arc::new(DailyQuota::new(1000));
        let scheduler = Scheduler::new("lite", config(3, 60), quota);

        assert_eq!(scheduler.available_tokens().await, 3);
        tokio::time::advance(Duration::from_secs(600)).await;
        // Ten refill periods elapsed; the bucket still holds exactly capacity.
        assert_eq!(scheduler.available_tokens().await, 3);

        scheduler.schedule(|| async { Ok::<_, ProviderError>(()) }).await.expect("admit");
        assert_eq!(scheduler.available_tokens().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_wait_one_refill_interval_each_when_bucket_is_one() {
        let quota = Arc::new(DailyQuota::new(1000));
        let scheduler = Scheduler::new("heavy", config(1, 60), quota);
        let started = Instant::now();

        for expected_secs in [0u64, 60, 120] {
            scheduler.schedule(|| async { Ok::<_, ProviderError>(()) }).await.expect("admit");
            assert_eq!(started.elapsed(), Duration::from_secs(expected_secs));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quota_exhaustion_fails_fast_without_consuming_a_token() {
        let quota = Arc::new(DailyQuota::new(1));
        let scheduler = Scheduler::new("lite", config(5, 60), quota.clone());

        scheduler.schedule(|| async { Ok::<_, ProviderError>(()) }).await.expect("first admit");
        assert_eq!(scheduler.available_tokens().await, 4);
        assert_eq!(quota.used().await, 1);

        let denied = scheduler
            .schedule(|| async { Ok::<_, ProviderError>(()) })
            .await
            .expect_err("quota is spent");
        assert_eq!(denied, SchedulerError::QuotaExhausted { used: 1, limit: 1 });
        // Fail-fast: no token consumed, no backoff attempted.
        assert_eq!(scheduler.available_tokens().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_counts_once_per_success_not_per_retry() {
        let quota = Arc::new(DailyQuota::new(10));
        let scheduler = Scheduler::new("heavy", config(5, 60), quota.clone());
        let calls = AtomicU32::new(0);

        scheduler
            .schedule(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ProviderError::RateLimited("429".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .expect("eventually succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(quota.used().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_operations_do_not_touch_the_quota() {
        let quota = Arc::new(DailyQuota::new(10));
        let scheduler = Scheduler::new("heavy", config(5, 60), quota.clone());

        let result: Result<(), _> = scheduler
            .schedule(|| async {
                Err(ProviderError::Status { status: 400, message: "bad prompt".to_string() })
            })
            .await;

        assert!(matches!(
            result,
            Err(SchedulerError::Provider(ProviderError::Status { status: 400, .. }))
        ));
        assert_eq!(quota.used().await, 0);
    }
}
