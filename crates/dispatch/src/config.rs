//! Dispatch configuration and the emergency-mode controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alert::Priority;

/// Per-tier queue and drain settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Queue capacity; inserting past it triggers eviction.
    pub max_size: usize,
    /// Alerts released per drain cycle.
    pub batch_size: usize,
    /// Drain cadence in milliseconds.
    pub batch_timeout_ms: u64,
    /// Alerts from one batch processed concurrently.
    pub concurrency: usize,
}

impl TierConfig {
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            batch_size: 50,
            batch_timeout_ms: 100,
            concurrency: 16,
        }
    }
}

/// One `TierConfig` per priority tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub critical: TierConfig,
    pub high: TierConfig,
    pub medium: TierConfig,
    pub low: TierConfig,
}

impl TierTable {
    #[must_use]
    pub const fn get(&self, priority: Priority) -> TierConfig {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Exponential backoff settings for alert-level retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform random jitter added per retry.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 1_000,
        }
    }
}

/// Full configuration for the dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Tier settings in normal operation.
    pub normal: TierTable,
    /// Tier settings while emergency mode is active.
    pub emergency: TierTable,
    pub retry: RetryPolicy,
    /// Stop attempting further channels on a non-critical alert once one
    /// has succeeded. Off by default: every listed channel is attempted
    /// so the audit trail stays complete.
    pub early_exit_on_success: bool,
    /// Number of recent latency samples kept for percentile estimation.
    pub metrics_window: usize,
    /// Cadence of the periodic metrics self-report.
    pub metrics_report_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            normal: TierTable {
                critical: TierConfig {
                    batch_timeout_ms: 100,
                    ..TierConfig::default()
                },
                high: TierConfig {
                    batch_timeout_ms: 250,
                    ..TierConfig::default()
                },
                medium: TierConfig {
                    batch_timeout_ms: 500,
                    batch_size: 25,
                    ..TierConfig::default()
                },
                low: TierConfig {
                    batch_timeout_ms: 1_000,
                    batch_size: 25,
                    ..TierConfig::default()
                },
            },
            emergency: TierTable {
                critical: TierConfig {
                    batch_timeout_ms: 50,
                    batch_size: 100,
                    concurrency: 32,
                    ..TierConfig::default()
                },
                high: TierConfig {
                    batch_timeout_ms: 100,
                    batch_size: 100,
                    concurrency: 32,
                    ..TierConfig::default()
                },
                medium: TierConfig {
                    batch_timeout_ms: 250,
                    batch_size: 50,
                    concurrency: 32,
                    ..TierConfig::default()
                },
                low: TierConfig {
                    batch_timeout_ms: 500,
                    batch_size: 50,
                    concurrency: 32,
                    ..TierConfig::default()
                },
            },
            retry: RetryPolicy::default(),
            early_exit_on_success: false,
            metrics_window: 1_024,
            metrics_report_interval_secs: 60,
        }
    }
}

/// Runtime switch between the normal and emergency tier tables.
///
/// Drain drivers re-read the active table at the top of every cycle, so a
/// mode change takes effect on the next cycle and never touches an alert
/// already in flight. Cheap to clone; all clones share the same switch.
#[derive(Debug, Clone)]
pub struct ModeController {
    config: Arc<DispatchConfig>,
    emergency: Arc<AtomicBool>,
}

impl ModeController {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config: Arc::new(config),
            emergency: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The currently active settings for a tier.
    #[must_use]
    pub fn tier(&self, priority: Priority) -> TierConfig {
        if self.emergency_active() {
            self.config.emergency.get(priority)
        } else {
            self.config.normal.get(priority)
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[must_use]
    pub fn emergency_active(&self) -> bool {
        self.emergency.load(Ordering::Relaxed)
    }

    /// Switch to the emergency tier table. Idempotent.
    pub fn enable_emergency_mode(&self) {
        if !self.emergency.swap(true, Ordering::Relaxed) {
            info!("emergency mode enabled");
        }
    }

    /// Restore the normal tier table. Idempotent.
    pub fn disable_emergency_mode(&self) {
        if self.emergency.swap(false, Ordering::Relaxed) {
            info!("emergency mode disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DispatchConfig::default();
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert!(!config.early_exit_on_success);
        assert!(config.normal.critical.batch_timeout_ms <= 100);
    }

    #[test]
    fn emergency_mode_swaps_tier_table_and_reverts() {
        let mode = ModeController::new(DispatchConfig::default());
        let normal = mode.tier(Priority::Critical);

        mode.enable_emergency_mode();
        let emergency = mode.tier(Priority::Critical);
        assert!(emergency.batch_timeout_ms < normal.batch_timeout_ms);
        assert!(emergency.batch_size > normal.batch_size);
        assert!(emergency.concurrency > normal.concurrency);

        mode.disable_emergency_mode();
        let restored = mode.tier(Priority::Critical);
        assert_eq!(restored.batch_timeout_ms, normal.batch_timeout_ms);
        assert_eq!(restored.batch_size, normal.batch_size);
    }

    #[test]
    fn mode_switches_are_idempotent() {
        let mode = ModeController::new(DispatchConfig::default());
        mode.enable_emergency_mode();
        mode.enable_emergency_mode();
        assert!(mode.emergency_active());

        mode.disable_emergency_mode();
        mode.disable_emergency_mode();
        assert!(!mode.emergency_active());
    }

    #[test]
    fn clones_share_the_switch() {
        let mode = ModeController::new(DispatchConfig::default());
        let clone = mode.clone();
        clone.enable_emergency_mode();
        assert!(mode.emergency_active());
    }

    #[test]
    fn config_deserializes_with_partial_overrides() {
        let toml_like = r#"{"early_exit_on_success": true, "retry": {"base_delay_ms": 500}}"#;
        let config: DispatchConfig = serde_json::from_str(toml_like).unwrap();
        assert!(config.early_exit_on_success);
        assert_eq!(config.retry.base_delay_ms, 500);
        // untouched fields fall back to defaults
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.normal.critical.max_size, 10_000);
    }
}
