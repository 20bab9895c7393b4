//! Error types for the dispatch core.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced synchronously to `dispatch()` callers.
///
/// Everything that happens after an alert is accepted (channel failures,
/// retries, expiry) is folded into delivery attempts and metrics instead
/// of propagating here.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The alert spec cannot be turned into a dispatchable alert
    #[error("invalid alert spec: {0}")]
    InvalidSpec(String),

    /// The dispatcher has been shut down
    #[error("dispatcher is shut down")]
    Shutdown,

    /// Recipient resolution failed during a broadcast
    #[error("recipient resolution failed: {0}")]
    ResolverFailed(String),
}

/// Errors produced by channel adapters.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The recipient has no endpoint for this channel.
    /// Deterministic: retrying the same alert cannot fix it.
    #[error("no {0} contact on file for recipient")]
    MissingContact(&'static str),

    /// The downstream provider rejected or failed the send
    #[error("provider error: {0}")]
    Provider(String),

    /// The adapter's internal timeout elapsed
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// The channel has no connected consumers (e.g. socket fan-out)
    #[error("channel has no connected receivers")]
    Disconnected,
}

impl ChannelError {
    /// Whether another alert-level pass could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::MissingContact(_) => false,
            Self::Provider(_) | Self::Timeout(_) | Self::Disconnected => true,
        }
    }
}

/// Error from the terminal-status store.
#[derive(Debug, Error)]
#[error("status store error: {0}")]
pub struct StoreError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_contact_is_not_retryable() {
        assert!(!ChannelError::MissingContact("push").is_retryable());
        assert!(ChannelError::Provider("503".to_string()).is_retryable());
        assert!(ChannelError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(ChannelError::Disconnected.is_retryable());
    }

    #[test]
    fn error_messages_name_the_cause() {
        let err = ChannelError::MissingContact("sms");
        assert!(err.to_string().contains("sms"));

        let err = DispatchError::InvalidSpec("no channels".to_string());
        assert!(err.to_string().contains("no channels"));
    }
}
