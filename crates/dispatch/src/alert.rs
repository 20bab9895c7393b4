//! Alert and delivery-attempt data model.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority tiers for emergency alerts.
///
/// Each tier has its own queue, retry budget, and fan-out strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Life-safety alerts; channels are raced in parallel.
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// All tiers, ordered from most to least urgent.
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Retry budget for this tier.
    #[must_use]
    pub const fn max_retries(self) -> u32 {
        match self {
            Self::Critical => 5,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Static delivery-time estimate reported to dispatch callers.
    #[must_use]
    pub const fn estimated_delivery(self) -> Duration {
        match self {
            Self::Critical => Duration::from_millis(100),
            Self::High => Duration::from_millis(500),
            Self::Medium => Duration::from_millis(2000),
            Self::Low => Duration::from_millis(5000),
        }
    }

    /// Display name for this tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Delivery media an alert can be fanned out across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Push,
    Email,
    Sms,
    Socket,
    Inbox,
}

impl ChannelKind {
    /// Display name for this channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Socket => "socket",
            Self::Inbox => "inbox",
        }
    }
}

/// Lifecycle state of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Processing,
    Sent,
    /// Externally confirmed receipt; upgraded outside the core.
    Delivered,
    Failed,
}

/// Lifecycle state of an alert as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Queued,
    Processing,
    Delivered,
    Failed,
    Expired,
}

impl AlertStatus {
    /// Terminal states are persisted and never re-enqueued.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Expired)
    }
}

/// Resolved contact endpoints for one recipient, keyed by channel.
///
/// Channels that need an endpoint (push token, email address, phone number)
/// read it from here; a missing entry is a deterministic, non-retryable
/// failure for that channel only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Caller-supplied alert definition.
///
/// The core assigns identity, retry counters, and attempt history itself;
/// callers only describe what to deliver, to whom, and how urgently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSpec {
    /// Source emergency event this alert belongs to.
    pub event_id: String,
    /// Single recipient of this alert.
    pub user_id: String,
    /// Event category, passed through to channels (e.g. "earthquake").
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Opaque payload forwarded to channel adapters untouched.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub priority: Priority,
    /// Channels to attempt, in order.
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub contacts: ContactInfo,
    /// If set and in the past, the alert is not dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// One emergency notification owed to one recipient — the unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub priority: Priority,
    pub channels: Vec<ChannelKind>,
    pub contacts: ContactInfo,
    /// Mutated only by the retry scheduler; never exceeds `max_retries`.
    pub retry_count: u32,
    /// Fixed at creation from the priority tier.
    pub max_retries: u32,
    /// Append-only audit history, one entry per (channel, try).
    pub attempts: Vec<DeliveryAttempt>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EmergencyAlert {
    /// Build the full alert from a caller spec, assigning identity and
    /// lifecycle counters.
    #[must_use]
    pub fn from_spec(spec: AlertSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_id: spec.event_id,
            user_id: spec.user_id,
            kind: spec.kind,
            title: spec.title,
            message: spec.message,
            data: spec.data,
            priority: spec.priority,
            channels: spec.channels,
            contacts: spec.contacts,
            retry_count: 0,
            max_retries: spec.priority.max_retries(),
            attempts: Vec::new(),
            status: AlertStatus::Queued,
            created_at: Utc::now(),
            expires_at: spec.expires_at,
        }
    }

    /// Whether the alert must no longer be dispatched.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Whether the retry budget allows another pass.
    #[must_use]
    pub fn retries_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }

}

/// One recorded try of one channel for one alert. Failed attempts are
/// retained for audit and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: String,
    pub alert_id: String,
    pub channel: ChannelKind,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock latency of the adapter call, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The alert's retry generation this attempt belongs to.
    pub retry_generation: u32,
}

impl DeliveryAttempt {
    /// Start a new attempt in the `Processing` state.
    #[must_use]
    pub fn begin(alert_id: &str, channel: ChannelKind, generation: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.to_string(),
            channel,
            status: AttemptStatus::Processing,
            started_at: Utc::now(),
            finished_at: None,
            latency_ms: None,
            error: None,
            retry_generation: generation,
        }
    }

    /// Close the attempt as sent.
    pub fn finish_sent(&mut self, latency: Duration) {
        self.status = AttemptStatus::Sent;
        self.finished_at = Some(Utc::now());
        self.latency_ms = Some(latency.as_millis() as u64);
    }

    /// Close the attempt as failed, recording the channel error.
    pub fn finish_failed(&mut self, latency: Duration, error: impl Into<String>) {
        self.status = AttemptStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.latency_ms = Some(latency.as_millis() as u64);
        self.error = Some(error.into());
    }
}
