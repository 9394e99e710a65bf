use quill_core::errors::SchedulerError;
use tokio::sync::Mutex;

/// Process-wide daily call budget, shared by every scheduler instance.
///
/// The counter increments exactly once per successful operation (never per
/// retry attempt) and is monotone until an explicit `reset`. All mutation
/// goes through the mutex so concurrent admissions cannot double-count.
#[derive(Debug)]
pub struct DailyQuota {
    limit: u32,
    used: Mutex<u32>,
}

impl DailyQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: Mutex::new(0) }
    }

    /// Fail-fast admission check. Consumes nothing.
    pub async fn check(&self) -> Result<(), SchedulerError> {
        let used = *self.used.lock().await;
        if used >= self.limit {
            return Err(SchedulerError::QuotaExhausted { used, limit: self.limit });
        }
        Ok(())
    }

    pub async fn record_success(&self) {
        let mut used = self.used.lock().await;
        *used += 1;
        if *used >= self.limit {
            tracing::warn!(
                event_name = "scheduler.quota.exhausted",
                used = *used,
                limit = self.limit,
                "daily quota reached, further admissions will fail"
            );
        }
    }

    pub async fn used(&self) -> u32 {
        *self.used.lock().await
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Roll the counter back to zero. The engine never calls this on its
    /// own; day-boundary scheduling belongs to the embedding process.
    pub async fn reset(&self) {
        *self.used.lock().await = 0;
    }
}
