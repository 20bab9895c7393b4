//! Dispatch and per-channel delivery metrics.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::alert::{ChannelKind, Priority};

/// Narrow metrics interface consumed by the queue manager and processor.
///
/// The crate ships [`DispatchMetrics`] as the default implementation; host
/// applications can layer their own recorder on top (Prometheus, OTLP)
/// by implementing this trait.
pub trait MetricsRecorder: Send + Sync {
    /// One channel send finished, successfully or not.
    fn record_channel_outcome(&self, channel: ChannelKind, latency: Duration, success: bool);

    /// One alert reached a terminal outcome (delivered, failed, expired).
    fn record_dispatch_outcome(&self, alert_id: &str, latency: Duration, success: bool);

    /// An alert was evicted from a queue under capacity pressure.
    fn record_eviction(&self, priority: Priority);

    /// An alert expired before dispatch.
    fn record_expired(&self);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub failed: u64,
    pub total_latency_ms: u64,
}

impl ChannelStats {
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.sent + self.failed;
        if total == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / total as f64
        }
    }
}

/// Point-in-time view of dispatch health.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_alerts: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    pub expired: u64,
    pub evictions: u64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub per_channel: HashMap<ChannelKind, ChannelStats>,
}

/// In-memory metrics aggregator with rolling percentile estimation.
///
/// Percentiles use a sort-and-index estimator over the most recent N
/// dispatch latencies; exactness is not the goal, only monotonic
/// sensitivity to degradation.
pub struct DispatchMetrics {
    total_alerts: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    window: usize,
    recent_latencies: Mutex<VecDeque<u64>>,
    channels: Mutex<HashMap<ChannelKind, ChannelStats>>,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            total_alerts: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            window: window.max(1),
            recent_latencies: Mutex::new(VecDeque::with_capacity(window.max(1))),
            channels: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (average, p95, p99) = {
            let recent = self
                .recent_latencies
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut sorted: Vec<u64> = recent.iter().copied().collect();
            sorted.sort_unstable();
            let average = if sorted.is_empty() {
                0.0
            } else {
                sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
            };
            (average, percentile(&sorted, 0.95), percentile(&sorted, 0.99))
        };

        let per_channel = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        MetricsSnapshot {
            total_alerts: self.total_alerts.load(Ordering::Relaxed),
            successful_deliveries: self.successful.load(Ordering::Relaxed),
            failed_deliveries: self.failed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            average_latency_ms: average,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            per_channel,
        }
    }
}

impl MetricsRecorder for DispatchMetrics {
    fn record_channel_outcome(&self, channel: ChannelKind, latency: Duration, success: bool) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let stats = channels.entry(channel).or_default();
        if success {
            stats.sent += 1;
        } else {
            stats.failed += 1;
        }
        stats.total_latency_ms += latency.as_millis() as u64;
    }

    fn record_dispatch_outcome(&self, _alert_id: &str, latency: Duration, success: bool) {
        self.total_alerts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut recent = self
            .recent_latencies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if recent.len() == self.window {
            recent.pop_front();
        }
        recent.push_back(latency.as_millis() as u64);
    }

    fn record_eviction(&self, _priority: Priority) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards every sample to several recorders.
///
/// Used when a host application attaches its own recorder next to the
/// crate's internal [`DispatchMetrics`].
pub struct TeeRecorder {
    recorders: Vec<std::sync::Arc<dyn MetricsRecorder>>,
}

impl TeeRecorder {
    #[must_use]
    pub fn new(recorders: Vec<std::sync::Arc<dyn MetricsRecorder>>) -> Self {
        Self { recorders }
    }
}

impl MetricsRecorder for TeeRecorder {
    fn record_channel_outcome(&self, channel: ChannelKind, latency: Duration, success: bool) {
        for r in &self.recorders {
            r.record_channel_outcome(channel, latency, success);
        }
    }

    fn record_dispatch_outcome(&self, alert_id: &str, latency: Duration, success: bool) {
        for r in &self.recorders {
            r.record_dispatch_outcome(alert_id, latency, success);
        }
    }

    fn record_eviction(&self, priority: Priority) {
        for r in &self.recorders {
            r.record_eviction(priority);
        }
    }

    fn record_expired(&self) {
        for r in &self.recorders {
            r.record_expired();
        }
    }
}

/// Nearest-rank percentile over an ascending sample slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let metrics = DispatchMetrics::new(16);
        let snap = metrics.snapshot();
        assert_eq!(snap.total_alerts, 0);
        assert_eq!(snap.p95_latency_ms, 0);
        assert_eq!(snap.average_latency_ms, 0.0);
    }

    #[test]
    fn dispatch_outcomes_counted() {
        let metrics = DispatchMetrics::new(16);
        metrics.record_dispatch_outcome("a-1", Duration::from_millis(10), true);
        metrics.record_dispatch_outcome("a-2", Duration::from_millis(20), false);
        metrics.record_expired();
        metrics.record_eviction(Priority::Low);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_alerts, 2);
        assert_eq!(snap.successful_deliveries, 1);
        assert_eq!(snap.failed_deliveries, 1);
        assert_eq!(snap.expired, 1);
        assert_eq!(snap.evictions, 1);
        assert!((snap.average_latency_ms - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn channel_stats_split_by_outcome() {
        let metrics = DispatchMetrics::new(16);
        metrics.record_channel_outcome(ChannelKind::Push, Duration::from_millis(5), true);
        metrics.record_channel_outcome(ChannelKind::Push, Duration::from_millis(15), false);
        metrics.record_channel_outcome(ChannelKind::Email, Duration::from_millis(40), true);

        let snap = metrics.snapshot();
        let push = &snap.per_channel[&ChannelKind::Push];
        assert_eq!(push.sent, 1);
        assert_eq!(push.failed, 1);
        assert!((push.average_latency_ms() - 10.0).abs() < f64::EPSILON);
        assert_eq!(snap.per_channel[&ChannelKind::Email].sent, 1);
    }

    #[test]
    fn percentiles_track_degradation() {
        let metrics = DispatchMetrics::new(200);
        for i in 1..=100 {
            metrics.record_dispatch_outcome("a", Duration::from_millis(i), true);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.p95_latency_ms, 95);
        assert_eq!(snap.p99_latency_ms, 99);

        // a latency spike moves the upper percentiles
        for _ in 0..20 {
            metrics.record_dispatch_outcome("a", Duration::from_millis(500), true);
        }
        let degraded = metrics.snapshot();
        assert!(degraded.p99_latency_ms >= 500);
        assert!(degraded.p95_latency_ms >= snap.p95_latency_ms);
    }

    #[test]
    fn window_keeps_only_recent_samples() {
        let metrics = DispatchMetrics::new(4);
        for i in 0..10 {
            metrics.record_dispatch_outcome("a", Duration::from_millis(i * 100), true);
        }
        let recent = metrics.recent_latencies.lock().unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent.front().copied(), Some(600));
    }

    #[test]
    fn percentile_single_sample() {
        assert_eq!(percentile(&[42], 0.95), 42);
        assert_eq!(percentile(&[], 0.5), 0);
    }
}
