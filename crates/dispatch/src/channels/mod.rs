//! Channel adapter seam and the adapters the core owns.
//!
//! Push, email, and SMS gateways live outside the core; host applications
//! inject them as [`ChannelAdapter`] trait objects. The socket fan-out and
//! the in-app inbox have no external transport, so the crate ships them.

pub mod inbox;
pub mod socket;

use async_trait::async_trait;

use crate::alert::{ChannelKind, EmergencyAlert};
use crate::error::ChannelError;

/// One delivery medium.
///
/// Adapters own their internal timeouts; the core does not impose a
/// cross-channel deadline. Errors returned here are folded into the
/// alert's delivery attempts and never abort sibling channels.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Which channel this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Attempt delivery of the alert to its recipient.
    async fn send(&self, alert: &EmergencyAlert) -> Result<(), ChannelError>;
}
