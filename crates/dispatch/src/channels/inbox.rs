//! In-app inbox channel backed by an in-memory per-user store.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::{ChannelKind, EmergencyAlert, Priority};
use crate::error::ChannelError;

use super::ChannelAdapter;

/// One inbox entry for a recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub alert_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub received_at: DateTime<Utc>,
    pub read: bool,
}

/// Persistent in-app inbox.
///
/// Entries are kept per user with a bounded history; the oldest entry is
/// dropped when a user's inbox is full. Durable storage behind this is a
/// host concern; the core only needs the write path.
pub struct InboxChannel {
    entries: Mutex<HashMap<String, VecDeque<InboxEntry>>>,
    max_per_user: usize,
}

impl InboxChannel {
    #[must_use]
    pub fn new(max_per_user: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_per_user: max_per_user.max(1),
        }
    }

    /// All inbox entries for a user, newest last.
    #[must_use]
    pub fn entries_for(&self, user_id: &str) -> Vec<InboxEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(user_id)
            .map(|inbox| inbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Count of unread entries for a user.
    #[must_use]
    pub fn unread_count(&self, user_id: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(user_id)
            .map_or(0, |inbox| inbox.iter().filter(|e| !e.read).count())
    }

    /// Mark one entry read. Returns false if the entry is unknown.
    pub fn mark_read(&self, user_id: &str, entry_id: &str) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get_mut(user_id)
            .and_then(|inbox| inbox.iter_mut().find(|e| e.id == entry_id))
            .map(|entry| entry.read = true)
            .is_some()
    }
}

#[async_trait]
impl ChannelAdapter for InboxChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Inbox
    }

    async fn send(&self, alert: &EmergencyAlert) -> Result<(), ChannelError> {
        let entry = InboxEntry {
            id: Uuid::new_v4().to_string(),
            alert_id: alert.id.clone(),
            kind: alert.kind.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            priority: alert.priority,
            received_at: Utc::now(),
            read: false,
        };

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let inbox = entries.entry(alert.user_id.clone()).or_default();
        if inbox.len() == self.max_per_user {
            inbox.pop_front();
        }
        inbox.push_back(entry);
        Ok(())
    }
}
