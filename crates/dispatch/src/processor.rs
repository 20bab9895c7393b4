//! Alert processor: the channel fan-out engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashSet;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::alert::{
    AlertStatus, AttemptStatus, ChannelKind, DeliveryAttempt, EmergencyAlert, Priority,
};
use crate::channels::ChannelAdapter;
use crate::metrics::MetricsRecorder;
use crate::retry::RetryScheduler;
use crate::store::StatusStore;

/// Set of alert ids currently being fanned out.
///
/// Guarantees at most one concurrent processing pass per alert id:
/// `insert` has test-and-set semantics, so re-entrant drains observing
/// the same alert become no-ops.
#[derive(Clone, Default)]
pub struct ProcessingSet {
    ids: Arc<DashSet<String>>,
}

impl ProcessingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim an id. Returns false if it is already claimed.
    pub fn insert(&self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn remove(&self, id: &str) {
        self.ids.remove(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Result of one processing pass over an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another pass already holds this alert id; nothing was done.
    AlreadyProcessing,
    /// The alert's deadline lapsed before fan-out began.
    Expired,
    /// At least one channel accepted the alert.
    Delivered,
    /// All channels failed; a retry is scheduled.
    Retrying,
    /// All channels failed and no retry is possible.
    Failed,
}

/// Decides fan-out strategy, drives channel adapters, aggregates
/// delivery attempts, and routes failed-but-retryable alerts to the
/// retry scheduler.
pub struct AlertProcessor {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
    processing: ProcessingSet,
    retry: RetryScheduler,
    metrics: Arc<dyn MetricsRecorder>,
    store: Option<Arc<dyn StatusStore>>,
    early_exit_on_success: bool,
}

impl AlertProcessor {
    #[must_use]
    pub fn new(
        adapters: Vec<Arc<dyn ChannelAdapter>>,
        processing: ProcessingSet,
        retry: RetryScheduler,
        metrics: Arc<dyn MetricsRecorder>,
        early_exit_on_success: bool,
    ) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.kind(), a)).collect(),
            processing,
            retry,
            metrics,
            store: None,
            early_exit_on_success,
        }
    }

    /// Attach a terminal-status store.
    #[must_use]
    pub fn with_status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run one full processing pass over an alert.
    ///
    /// The outcome is primarily observed through attempt history, queue
    /// state, and metrics; the returned value exists for callers that
    /// drive the processor directly.
    pub async fn process(&self, alert: EmergencyAlert) -> ProcessOutcome {
        let alert_id = alert.id.clone();
        if !self.processing.insert(&alert_id) {
            debug!(alert_id = %alert_id, "alert already processing, skipping");
            return ProcessOutcome::AlreadyProcessing;
        }

        // The guard is released on every path out of the pass.
        let outcome = self.run_pass(alert).await;
        self.processing.remove(&alert_id);
        outcome
    }

    async fn run_pass(&self, mut alert: EmergencyAlert) -> ProcessOutcome {
        if alert.is_expired(Utc::now()) {
            alert.status = AlertStatus::Expired;
            warn!(
                alert_id = %alert.id,
                expires_at = ?alert.expires_at,
                "alert expired before dispatch"
            );
            self.metrics.record_expired();
            self.metrics
                .record_dispatch_outcome(&alert.id, Duration::ZERO, false);
            self.persist_terminal(&alert).await;
            return ProcessOutcome::Expired;
        }

        alert.status = AlertStatus::Processing;
        let start = Instant::now();
        let generation = alert.retry_count;

        let (attempts, any_retryable) = match alert.priority {
            Priority::Critical => self.fan_out_parallel(&alert, generation).await,
            _ => self.fan_out_sequential(&alert, generation).await,
        };

        let sent = attempts.iter().any(|a| a.status == AttemptStatus::Sent);
        alert.attempts.extend(attempts);
        let latency = start.elapsed();

        if sent {
            alert.status = AlertStatus::Delivered;
            info!(
                alert_id = %alert.id,
                priority = alert.priority.as_str(),
                latency_ms = latency.as_millis() as u64,
                "alert delivered"
            );
            self.metrics
                .record_dispatch_outcome(&alert.id, latency, true);
            self.persist_terminal(&alert).await;
            ProcessOutcome::Delivered
        } else if any_retryable && alert.retries_remaining() {
            self.retry.schedule(alert);
            ProcessOutcome::Retrying
        } else {
            alert.status = AlertStatus::Failed;
            error!(
                alert_id = %alert.id,
                priority = alert.priority.as_str(),
                retries = alert.retry_count,
                "alert permanently failed"
            );
            self.metrics
                .record_dispatch_outcome(&alert.id, latency, false);
            self.persist_terminal(&alert).await;
            ProcessOutcome::Failed
        }
    }

    /// Critical tier: issue all channel sends together, then join all
    /// outcomes before evaluating the alert-level result.
    async fn fan_out_parallel(
        &self,
        alert: &EmergencyAlert,
        generation: u32,
    ) -> (Vec<DeliveryAttempt>, bool) {
        let sends = alert
            .channels
            .iter()
            .map(|&channel| self.attempt_channel(alert, channel, generation));
        let results = join_all(sends).await;

        let any_retryable = results.iter().any(|(_, retryable)| *retryable);
        let attempts = results.into_iter().map(|(attempt, _)| attempt).collect();
        (attempts, any_retryable)
    }

    /// Lower tiers: one channel at a time, in the order listed on the
    /// alert, to conserve downstream provider capacity. All listed
    /// channels are attempted unless early exit is configured.
    async fn fan_out_sequential(
        &self,
        alert: &EmergencyAlert,
        generation: u32,
    ) -> (Vec<DeliveryAttempt>, bool) {
        let mut attempts = Vec::with_capacity(alert.channels.len());
        let mut any_retryable = false;

        for &channel in &alert.channels {
            let (attempt, retryable) = self.attempt_channel(alert, channel, generation).await;
            let sent = attempt.status == AttemptStatus::Sent;
            any_retryable |= retryable;
            attempts.push(attempt);

            if sent && self.early_exit_on_success {
                break;
            }
        }

        (attempts, any_retryable)
    }

    /// Drive one channel adapter, isolating its failure into the
    /// attempt record. Returns the attempt and whether its failure (if
    /// any) is worth an alert-level retry.
    async fn attempt_channel(
        &self,
        alert: &EmergencyAlert,
        channel: ChannelKind,
        generation: u32,
    ) -> (DeliveryAttempt, bool) {
        let mut attempt = DeliveryAttempt::begin(&alert.id, channel, generation);
        let start = Instant::now();

        let (success, retryable) = match self.adapters.get(&channel) {
            Some(adapter) => match adapter.send(alert).await {
                Ok(()) => {
                    attempt.finish_sent(start.elapsed());
                    (true, false)
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        alert_id = %alert.id,
                        channel = channel.as_str(),
                        error = %e,
                        "channel send failed"
                    );
                    attempt.finish_failed(start.elapsed(), e.to_string());
                    (false, retryable)
                }
            },
            None => {
                attempt.finish_failed(start.elapsed(), "no adapter configured for channel");
                (false, false)
            }
        };

        self.metrics
            .record_channel_outcome(channel, start.elapsed(), success);
        (attempt, retryable)
    }

    async fn persist_terminal(&self, alert: &EmergencyAlert) {
        if let Some(ref store) = self.store {
            if let Err(e) = store.record_terminal(alert).await {
                warn!(alert_id = %alert.id, error = %e, "failed to persist terminal status");
            }
        }
    }
}
