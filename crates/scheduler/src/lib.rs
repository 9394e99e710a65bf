//! Rate-limited call scheduling for the generation provider.
//!
//! Every provider call flows through a `Scheduler`: a fail-fast daily quota
//! check, FIFO admission behind a token bucket and an in-flight cap, then
//! the operation itself wrapped in deterministic exponential backoff. Two
//! differently tuned instances (lite for classification and query
//! optimization, heavy for narrative generation) share one process-wide
//! `DailyQuota` handle - the quota models a provider-wide cap, the buckets
//! model per-call-class throughput.

pub mod backoff;
pub mod limiter;
pub mod quota;

pub use backoff::{run_with_backoff, BackoffConfig};
pub use limiter::{Scheduler, SchedulerConfig};
pub use quota::DailyQuota;
