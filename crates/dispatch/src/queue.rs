//! Priority queue set and the dispatch queue manager.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

use crate::alert::{EmergencyAlert, Priority};
use crate::config::ModeController;
use crate::metrics::MetricsRecorder;
use std::sync::Arc;

/// Current depth of each priority queue plus in-flight alert count.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub processing: usize,
}

/// Four independent bounded FIFO queues, one per priority tier.
///
/// Each tier has exactly one producer path (`enqueue`) and one consumer
/// path (`drain_batch`), so each queue carries its own lock and no
/// cross-tier locking ever happens. `enqueue` never suspends.
pub struct QueueManager {
    // Indexed by Priority::ALL order: critical, high, medium, low.
    tiers: [Mutex<VecDeque<EmergencyAlert>>; 4],
    mode: ModeController,
    metrics: Arc<dyn MetricsRecorder>,
}

const fn tier_index(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

impl QueueManager {
    #[must_use]
    pub fn new(mode: ModeController, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            tiers: [
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
            ],
            mode,
            metrics,
        }
    }

    /// Insert an alert into its tier's queue, evicting least-urgent
    /// backlog first when the tier is at capacity.
    ///
    /// Eviction sacrifices the oldest entry of the lowest-priority
    /// non-empty queue at or below the inserted tier, and never the alert
    /// being inserted. The capacity check, eviction, and push happen under
    /// the tier's lock, so concurrent producers (dispatch callers, retry
    /// re-submissions) cannot race a queue past its cap. Capacity pressure
    /// is not surfaced to the caller; the dropped alert is logged and
    /// counted instead.
    pub fn enqueue(&self, alert: EmergencyAlert) {
        let priority = alert.priority;
        let max_size = self.mode.tier(priority).max_size;

        let mut queue = self.tiers[tier_index(priority)]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if queue.len() >= max_size {
            let evicted = self
                .evict_below(tier_index(priority))
                .or_else(|| queue.pop_front());
            if let Some(victim) = evicted {
                warn!(
                    alert_id = %victim.id,
                    priority = victim.priority.as_str(),
                    inserted_tier = priority.as_str(),
                    "queue at capacity, evicting oldest alert"
                );
                self.metrics.record_eviction(victim.priority);
            }
        }
        debug!(
            alert_id = %alert.id,
            priority = priority.as_str(),
            depth = queue.len() + 1,
            "alert enqueued"
        );
        queue.push_back(alert);
    }

    /// Remove and return up to `batch_size` alerts from the front of the
    /// given tier's queue, in FIFO order.
    pub fn drain_batch(&self, priority: Priority, batch_size: usize) -> Vec<EmergencyAlert> {
        let mut queue = self.tiers[tier_index(priority)]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let take = batch_size.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Current depth of one tier's queue.
    #[must_use]
    pub fn depth(&self, priority: Priority) -> usize {
        self.tiers[tier_index(priority)]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Depths of all four queues; the caller supplies the in-flight count.
    #[must_use]
    pub fn status(&self, processing: usize) -> QueueStatus {
        QueueStatus {
            critical: self.depth(Priority::Critical),
            high: self.depth(Priority::High),
            medium: self.depth(Priority::Medium),
            low: self.depth(Priority::Low),
            processing,
        }
    }

    /// Pop the oldest entry of the lowest-priority non-empty queue
    /// strictly below tier `idx`, scanning from low upward.
    ///
    /// Called while the caller holds the lock for `idx`; lower-tier locks
    /// are always acquired in ascending index order, so no lock cycle can
    /// form between concurrent enqueues.
    fn evict_below(&self, idx: usize) -> Option<EmergencyAlert> {
        for lower in (idx + 1..4).rev() {
            let evicted = self.tiers[lower]
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front();
            if evicted.is_some() {
                return evicted;
            }
        }
        None
    }
}
