//! Socket push via a broadcast channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::alert::{ChannelKind, EmergencyAlert, Priority};
use crate::error::ChannelError;

use super::ChannelAdapter;

/// Message pushed to connected socket sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketMessage {
    pub alert_id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub sent_at: DateTime<Utc>,
}

/// Fan-out to live socket sessions over a `tokio::sync::broadcast` channel.
///
/// Session handlers subscribe via [`SocketChannel::subscribe`] and filter
/// by `user_id` themselves. Delivery is best-effort: lagging receivers
/// drop the oldest messages, and a send with no connected receivers is a
/// retryable failure.
pub struct SocketChannel {
    tx: broadcast::Sender<SocketMessage>,
}

impl SocketChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a socket session to the alert stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SocketMessage> {
        self.tx.subscribe()
    }

    /// Number of currently connected receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ChannelAdapter for SocketChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Socket
    }

    async fn send(&self, alert: &EmergencyAlert) -> Result<(), ChannelError> {
        let message = SocketMessage {
            alert_id: alert.id.clone(),
            user_id: alert.user_id.clone(),
            kind: alert.kind.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            priority: alert.priority,
            sent_at: Utc::now(),
        };

        match self.tx.send(message) {
            Ok(receivers) => {
                debug!(alert_id = %alert.id, receivers, "socket push dispatched");
                Ok(())
            }
            Err(_) => Err(ChannelError::Disconnected),
        }
    }
}
