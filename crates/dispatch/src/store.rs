//! Terminal-status persistence seam.

use async_trait::async_trait;

use crate::alert::EmergencyAlert;
use crate::error::StoreError;

/// Durable record of terminal alert outcomes.
///
/// The queues themselves are not durable; persisting delivered/failed
/// status here is what keeps a restart from resending already-delivered
/// alerts (at-least-once, not exactly-once). Writes are best-effort from
/// the processor's point of view: a store error is logged, never
/// propagated into the delivery pipeline.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Record an alert that has reached a terminal status. The full alert
    /// is handed over so its attempt history can be audited later.
    async fn record_terminal(&self, alert: &EmergencyAlert) -> Result<(), StoreError>;
}
