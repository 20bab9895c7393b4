//! Alert dispatch core for the Siren emergency notification platform.
//!
//! Given an emergency event, this crate selects affected recipients,
//! queues one alert per recipient by priority tier, and fans each alert
//! out across its delivery channels (push, email, SMS, socket push,
//! in-app inbox) under the tier's latency budget. Critical alerts bypass
//! the queue and race their channels in parallel; lower tiers drain on
//! independent cadences and attempt channels sequentially. Failed alerts
//! retry with exponential backoff up to a tier-specific budget.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dispatch::{
//!     AlertSpec, ChannelKind, DispatchConfig, Dispatcher, Priority,
//!     channels::inbox::InboxChannel, channels::socket::SocketChannel,
//! };
//!
//! # async fn run() -> Result<(), dispatch::DispatchError> {
//! let dispatcher = Dispatcher::builder(DispatchConfig::default())
//!     .with_adapter(Arc::new(SocketChannel::new(1024)))
//!     .with_adapter(Arc::new(InboxChannel::new(100)))
//!     .build();
//! dispatcher.start();
//!
//! let receipt = dispatcher.dispatch(AlertSpec {
//!     event_id: "evt-42".to_string(),
//!     user_id: "user-7".to_string(),
//!     kind: "earthquake".to_string(),
//!     title: "Earthquake warning".to_string(),
//!     message: "Magnitude 6.1 detected".to_string(),
//!     data: Default::default(),
//!     priority: Priority::Critical,
//!     channels: vec![ChannelKind::Socket, ChannelKind::Inbox],
//!     contacts: Default::default(),
//!     expires_at: None,
//! })?;
//! println!("alert {} accepted", receipt.alert_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`QueueManager`] holds four bounded FIFO queues, one per tier, with
//!   least-urgent-first eviction under capacity pressure.
//! - [`AlertProcessor`] is the fan-out engine: parallel for critical,
//!   sequential for the rest, with per-channel failure isolation.
//! - [`RetryScheduler`] re-submits failed alerts after exponential
//!   backoff with jitter.
//! - [`ModeController`] switches batch sizes and drain cadences between
//!   normal and emergency tables at runtime.
//! - Channel gateways, recipient resolution, and durable status storage
//!   are injected behind the [`ChannelAdapter`], [`RecipientResolver`],
//!   and [`StatusStore`] traits.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod alert;
pub mod channels;
pub mod config;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod store;

pub use alert::{
    AlertSpec, AlertStatus, AttemptStatus, ChannelKind, ContactInfo, DeliveryAttempt,
    EmergencyAlert, Priority,
};
pub use channels::ChannelAdapter;
pub use config::{DispatchConfig, ModeController, RetryPolicy, TierConfig, TierTable};
pub use error::{ChannelError, DispatchError, StoreError};
pub use metrics::{DispatchMetrics, MetricsRecorder, MetricsSnapshot};
pub use processor::{AlertProcessor, ProcessOutcome, ProcessingSet};
pub use queue::{QueueManager, QueueStatus};
pub use resolver::{GeoPoint, RecipientFilters, RecipientResolver, ResolvedRecipient};
pub use retry::RetryScheduler;
pub use store::StatusStore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What `dispatch()` returns synchronously: acceptance, not delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub alert_id: String,
    /// Static per-tier estimate, not a measurement.
    pub estimated_delivery_ms: u64,
    /// Time spent inside the dispatch call itself.
    pub latency_ms: u64,
}

/// Aggregate result of a batch dispatch.
#[derive(Debug)]
pub struct BatchDispatchResult {
    pub dispatched: usize,
    pub failed: usize,
    pub results: Vec<Result<DispatchReceipt, DispatchError>>,
}

/// One emergency event fanned out to every recipient in range.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub event_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub priority: Priority,
    pub location: GeoPoint,
    pub radius_meters: f64,
    pub filters: RecipientFilters,
}

/// Aggregate result of a broadcast dispatch.
#[derive(Debug)]
pub struct BroadcastResult {
    pub recipients: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub alert_ids: Vec<String>,
}

/// Builder for [`Dispatcher`]; collects adapters and collaborator seams.
pub struct DispatcherBuilder {
    config: DispatchConfig,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
    resolver: Option<Arc<dyn RecipientResolver>>,
    store: Option<Arc<dyn StatusStore>>,
    external_metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl DispatcherBuilder {
    /// Register a channel adapter. Channels listed on an alert without a
    /// registered adapter fail deterministically for that channel.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Attach the geospatial recipient resolver used by broadcasts.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn RecipientResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Attach a durable store for terminal alert status.
    #[must_use]
    pub fn with_status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach an external metrics recorder next to the built-in one.
    #[must_use]
    pub fn with_metrics_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.external_metrics = Some(recorder);
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        let internal = Arc::new(DispatchMetrics::new(self.config.metrics_window));
        let recorder: Arc<dyn MetricsRecorder> = match self.external_metrics {
            Some(external) => Arc::new(metrics::TeeRecorder::new(vec![
                Arc::clone(&internal) as Arc<dyn MetricsRecorder>,
                external,
            ])),
            None => Arc::clone(&internal) as Arc<dyn MetricsRecorder>,
        };

        let mode = ModeController::new(self.config);
        let queue = Arc::new(QueueManager::new(mode.clone(), Arc::clone(&recorder)));
        let retry = RetryScheduler::new(Arc::clone(&queue), mode.retry_policy());
        let processing = ProcessingSet::new();

        let mut processor = AlertProcessor::new(
            self.adapters,
            processing.clone(),
            retry,
            recorder,
            mode.config().early_exit_on_success,
        );
        if let Some(store) = self.store {
            processor = processor.with_status_store(store);
        }

        Dispatcher {
            mode,
            queue,
            processor: Arc::new(processor),
            processing,
            metrics: internal,
            resolver: self.resolver,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

/// The dispatch service object.
///
/// Constructed once at startup with injected collaborators and passed by
/// reference to callers; there is no ambient global instance.
pub struct Dispatcher {
    mode: ModeController,
    queue: Arc<QueueManager>,
    processor: Arc<AlertProcessor>,
    processing: ProcessingSet,
    metrics: Arc<DispatchMetrics>,
    resolver: Option<Arc<dyn RecipientResolver>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Dispatcher {
    #[must_use]
    pub fn builder(config: DispatchConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            adapters: Vec::new(),
            resolver: None,
            store: None,
            external_metrics: None,
        }
    }

    /// Spawn the per-tier drain drivers and the periodic metrics report.
    /// Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for priority in Priority::ALL {
            self.spawn_drain_driver(priority);
        }
        self.spawn_metrics_reporter();
        info!("dispatcher started");
    }

    /// Stop all drain drivers. In-memory queues are lost; alerts whose
    /// terminal status was persisted are not resent after a restart.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        info!("dispatcher shut down");
    }

    /// Accept one alert for delivery.
    ///
    /// Critical alerts bypass the queue and begin fan-out immediately;
    /// other tiers enter their priority queue for the next drain cycle.
    /// The receipt means "accepted", never "delivered" — delivery is
    /// observed through metrics and the status store.
    pub fn dispatch(&self, spec: AlertSpec) -> Result<DispatchReceipt, DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Shutdown);
        }
        if spec.user_id.is_empty() {
            return Err(DispatchError::InvalidSpec("user_id is empty".to_string()));
        }
        if spec.channels.is_empty() {
            return Err(DispatchError::InvalidSpec(
                "no delivery channels listed".to_string(),
            ));
        }

        let start = Instant::now();
        let alert = EmergencyAlert::from_spec(spec);
        let receipt = DispatchReceipt {
            alert_id: alert.id.clone(),
            estimated_delivery_ms: alert.priority.estimated_delivery().as_millis() as u64,
            latency_ms: start.elapsed().as_millis() as u64,
        };

        if alert.priority == Priority::Critical {
            // Immediate bypass: no queue wait for the tightest tier.
            let processor = Arc::clone(&self.processor);
            tokio::spawn(async move {
                processor.process(alert).await;
            });
        } else {
            self.queue.enqueue(alert);
        }

        Ok(receipt)
    }

    /// Dispatch a list of alerts, sequentially from the caller's view.
    pub fn dispatch_batch(&self, specs: Vec<AlertSpec>) -> BatchDispatchResult {
        let results: Vec<Result<DispatchReceipt, DispatchError>> =
            specs.into_iter().map(|spec| self.dispatch(spec)).collect();
        let dispatched = results.iter().filter(|r| r.is_ok()).count();
        BatchDispatchResult {
            dispatched,
            failed: results.len() - dispatched,
            results,
        }
    }

    /// Fan one emergency event out to every eligible recipient in range.
    ///
    /// Recipients are resolved once for the whole broadcast; each then
    /// gets an individual alert on their preferred channels.
    pub async fn broadcast(&self, request: BroadcastRequest) -> Result<BroadcastResult, DispatchError> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| DispatchError::ResolverFailed("no resolver configured".to_string()))?;

        let recipients = resolver
            .resolve_recipients(request.location, request.radius_meters, &request.filters)
            .await?;
        info!(
            event_id = %request.event_id,
            recipients = recipients.len(),
            priority = request.priority.as_str(),
            "broadcast resolved"
        );

        let mut result = BroadcastResult {
            recipients: recipients.len(),
            dispatched: 0,
            failed: 0,
            alert_ids: Vec::with_capacity(recipients.len()),
        };

        for recipient in recipients {
            let spec = AlertSpec {
                event_id: request.event_id.clone(),
                user_id: recipient.user_id,
                kind: request.kind.clone(),
                title: request.title.clone(),
                message: request.message.clone(),
                data: request.data.clone(),
                priority: request.priority,
                channels: recipient.preferred_channels,
                contacts: recipient.contacts,
                expires_at: None,
            };
            match self.dispatch(spec) {
                Ok(receipt) => {
                    result.dispatched += 1;
                    result.alert_ids.push(receipt.alert_id);
                }
                Err(e) => {
                    debug!(error = %e, "broadcast recipient skipped");
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }

    /// Current queue depths and in-flight count.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status(self.processing.len())
    }

    /// Aggregated delivery metrics.
    #[must_use]
    pub fn dispatch_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Switch to emergency-mode batching on the next drain cycle.
    pub fn enable_emergency_mode(&self) {
        self.mode.enable_emergency_mode();
    }

    /// Restore normal batching on the next drain cycle.
    pub fn disable_emergency_mode(&self) {
        self.mode.disable_emergency_mode();
    }

    #[must_use]
    pub fn emergency_mode_active(&self) -> bool {
        self.mode.emergency_active()
    }

    fn spawn_drain_driver(&self, priority: Priority) {
        let queue = Arc::clone(&self.queue);
        let processor = Arc::clone(&self.processor);
        let mode = self.mode.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                // Re-read per cycle so emergency-mode switches apply on
                // the next cycle, never mid-batch.
                let tier = mode.tier(priority);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(tier.batch_timeout()) => {
                        let batch = queue.drain_batch(priority, tier.batch_size);
                        if batch.is_empty() {
                            continue;
                        }
                        debug!(
                            priority = priority.as_str(),
                            batch = batch.len(),
                            "draining batch"
                        );
                        futures::stream::iter(batch)
                            .for_each_concurrent(tier.concurrency, |alert| {
                                let processor = Arc::clone(&processor);
                                async move {
                                    processor.process(alert).await;
                                }
                            })
                            .await;
                    }
                }
            }
            debug!(priority = priority.as_str(), "drain driver stopped");
        });
    }

    fn spawn_metrics_reporter(&self) {
        let metrics = Arc::clone(&self.metrics);
        let cancel = self.cancel.clone();
        let interval = Duration::from_secs(self.mode.config().metrics_report_interval_secs);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        let snap = metrics.snapshot();
                        info!(
                            total_alerts = snap.total_alerts,
                            successful = snap.successful_deliveries,
                            failed = snap.failed_deliveries,
                            evictions = snap.evictions,
                            p95_latency_ms = snap.p95_latency_ms,
                            p99_latency_ms = snap.p99_latency_ms,
                            "dispatch health"
                        );
                    }
                }
            }
        });
    }
}
