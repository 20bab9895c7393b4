//! Exponential-backoff retry scheduling.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::alert::{AlertStatus, EmergencyAlert};
use crate::config::RetryPolicy;
use crate::queue::QueueManager;

/// Deterministic backoff component: `min(base * 2^retry_count, max)`.
#[must_use]
pub fn backoff_delay(policy: RetryPolicy, retry_count: u32) -> Duration {
    let base = Duration::from_millis(policy.base_delay_ms);
    let max = Duration::from_millis(policy.max_delay_ms);
    let delay = base.saturating_mul(2_u32.saturating_pow(retry_count));
    delay.min(max)
}

/// Re-submits failed-but-retryable alerts after a growing delay.
///
/// Re-entry goes through the normal `enqueue` path, so a retried alert
/// competes fairly with new arrivals of its tier.
pub struct RetryScheduler {
    queue: Arc<QueueManager>,
    policy: RetryPolicy,
}

impl RetryScheduler {
    #[must_use]
    pub fn new(queue: Arc<QueueManager>, policy: RetryPolicy) -> Self {
        Self { queue, policy }
    }

    /// Full delay for the next retry of an alert: deterministic backoff
    /// plus uniform random jitter.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let jitter = if self.policy.jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..self.policy.jitter_ms))
        };
        backoff_delay(self.policy, retry_count) + jitter
    }

    /// Increment the alert's retry counter and schedule re-submission.
    ///
    /// The processor guarantees `retry_count < max_retries` before calling
    /// this; the counter therefore never exceeds the budget.
    pub fn schedule(&self, mut alert: EmergencyAlert) {
        debug_assert!(alert.retries_remaining());

        alert.retry_count += 1;
        alert.status = AlertStatus::Queued;
        let delay = self.delay_for(alert.retry_count);

        info!(
            alert_id = %alert.id,
            retry = alert.retry_count,
            max_retries = alert.max_retries,
            delay_ms = delay.as_millis() as u64,
            "scheduling retry"
        );

        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(alert);
        });
    }
}
