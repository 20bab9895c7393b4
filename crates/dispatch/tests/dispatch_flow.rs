//! End-to-end tests driving a full dispatcher with live drain drivers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dispatch::channels::inbox::InboxChannel;
use dispatch::channels::socket::SocketChannel;
use dispatch::{
    AlertSpec, AlertStatus, ChannelAdapter, ChannelError, ChannelKind, ContactInfo,
    DispatchConfig, Dispatcher, EmergencyAlert, Priority, StatusStore, StoreError, TierConfig,
    TierTable,
};

struct CountingAdapter {
    channel: ChannelKind,
    succeed: bool,
    calls: AtomicU32,
}

impl CountingAdapter {
    fn new(channel: ChannelKind, succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            channel,
            succeed,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelAdapter for CountingAdapter {
    fn kind(&self) -> ChannelKind {
        self.channel
    }

    async fn send(&self, _alert: &EmergencyAlert) -> Result<(), ChannelError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.succeed {
            Ok(())
        } else {
            Err(ChannelError::Provider("gateway 503".to_string()))
        }
    }
}

#[derive(Default)]
struct CapturingStore {
    alerts: Mutex<Vec<EmergencyAlert>>,
}

impl CapturingStore {
    fn captured(&self) -> Vec<EmergencyAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusStore for CapturingStore {
    async fn record_terminal(&self, alert: &EmergencyAlert) -> Result<(), StoreError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn spec(priority: Priority, channels: Vec<ChannelKind>, event_id: &str) -> AlertSpec {
    AlertSpec {
        event_id: event_id.to_string(),
        user_id: "user-1".to_string(),
        kind: "earthquake".to_string(),
        title: "Earthquake warning".to_string(),
        message: "Magnitude 6.1 detected nearby".to_string(),
        data: HashMap::new(),
        priority,
        channels,
        contacts: ContactInfo::default(),
        expires_at: None,
    }
}

/// Let the paused clock advance in small steps so drain drivers, retry
/// timers, and spawned passes all get to run in between.
async fn settle(total: Duration) {
    let step = Duration::from_millis(50);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        tokio::time::sleep(step).await;
        tokio::task::yield_now().await;
        elapsed += step;
    }
}

#[tokio::test(start_paused = true)]
async fn queued_alerts_drain_and_deliver() {
    let push = CountingAdapter::new(ChannelKind::Push, true);
    let store = Arc::new(CapturingStore::default());
    let dispatcher = Dispatcher::builder(DispatchConfig::default())
        .with_adapter(push.clone())
        .with_status_store(store.clone())
        .build();
    dispatcher.start();

    for i in 0..3 {
        dispatcher
            .dispatch(spec(
                Priority::Medium,
                vec![ChannelKind::Push],
                &format!("evt-{i}"),
            ))
            .unwrap();
    }
    assert_eq!(dispatcher.queue_status().medium, 3);

    settle(Duration::from_millis(700)).await;

    assert_eq!(dispatcher.queue_status().medium, 0);
    assert_eq!(push.calls(), 3);
    let metrics = dispatcher.dispatch_metrics();
    assert_eq!(metrics.successful_deliveries, 3);
    assert_eq!(metrics.failed_deliveries, 0);

    let stored = store.captured();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|a| a.status == AlertStatus::Delivered));

    dispatcher.shutdown();
}

#[tokio::test(start_paused = true)]
async fn low_tier_flood_never_delays_critical() {
    let low_tier = TierConfig {
        max_size: 100,
        ..TierConfig::default()
    };
    let config = DispatchConfig {
        normal: TierTable {
            low: low_tier,
            ..DispatchConfig::default().normal
        },
        ..DispatchConfig::default()
    };

    let push = CountingAdapter::new(ChannelKind::Push, true);
    let dispatcher = Dispatcher::builder(config)
        .with_adapter(push.clone())
        .build();

    // no drain drivers running: the flood just sits in the low queue
    for i in 0..150 {
        dispatcher
            .dispatch(spec(
                Priority::Low,
                vec![ChannelKind::Push],
                &format!("evt-low-{i}"),
            ))
            .unwrap();
    }
    dispatcher
        .dispatch(spec(
            Priority::Critical,
            vec![ChannelKind::Push],
            "evt-critical",
        ))
        .unwrap();

    settle(Duration::from_millis(100)).await;

    // the critical alert bypassed the queue and was delivered while the
    // flooded low tier evicted only its own backlog
    assert_eq!(push.calls(), 1);
    let status = dispatcher.queue_status();
    assert_eq!(status.low, 100);
    assert_eq!(status.critical, 0);
    let metrics = dispatcher.dispatch_metrics();
    assert_eq!(metrics.successful_deliveries, 1);
    assert_eq!(metrics.evictions, 50);
}

#[tokio::test(start_paused = true)]
async fn failing_low_alert_exhausts_budget_and_stops() {
    let push = CountingAdapter::new(ChannelKind::Push, false);
    let store = Arc::new(CapturingStore::default());
    let dispatcher = Dispatcher::builder(DispatchConfig::default())
        .with_adapter(push.clone())
        .with_status_store(store.clone())
        .build();
    dispatcher.start();

    dispatcher
        .dispatch(spec(Priority::Low, vec![ChannelKind::Push], "evt-1"))
        .unwrap();

    // low tier: 1 initial pass + 1 retry, then permanent failure.
    // worst case: 1s drain + 2s backoff + 1s jitter + 1s drain, plus slack
    settle(Duration::from_secs(10)).await;

    assert_eq!(push.calls(), 2);
    let metrics = dispatcher.dispatch_metrics();
    assert_eq!(metrics.failed_deliveries, 1);
    assert_eq!(metrics.successful_deliveries, 0);
    assert_eq!(dispatcher.queue_status().low, 0);

    let stored = store.captured();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, AlertStatus::Failed);
    assert_eq!(stored[0].retry_count, stored[0].max_retries);
    assert_eq!(stored[0].attempts.len(), 2);

    // nothing further happens once the budget is spent
    settle(Duration::from_secs(30)).await;
    assert_eq!(push.calls(), 2);

    dispatcher.shutdown();
}

#[tokio::test(start_paused = true)]
async fn partial_success_is_delivered_without_retry() {
    let email = CountingAdapter::new(ChannelKind::Email, true);
    let sms = CountingAdapter::new(ChannelKind::Sms, false);
    let store = Arc::new(CapturingStore::default());
    let dispatcher = Dispatcher::builder(DispatchConfig::default())
        .with_adapter(email.clone())
        .with_adapter(sms.clone())
        .with_status_store(store.clone())
        .build();
    dispatcher.start();

    dispatcher
        .dispatch(spec(
            Priority::High,
            vec![ChannelKind::Email, ChannelKind::Sms],
            "evt-1",
        ))
        .unwrap();

    settle(Duration::from_millis(500)).await;

    assert_eq!(email.calls(), 1);
    assert_eq!(sms.calls(), 1);

    let stored = store.captured();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, AlertStatus::Delivered);
    assert_eq!(stored[0].attempts.len(), 2);
    assert_eq!(stored[0].retry_count, 0);

    // no retry ever fires
    settle(Duration::from_secs(5)).await;
    assert_eq!(sms.calls(), 1);

    dispatcher.shutdown();
}

#[tokio::test(start_paused = true)]
async fn emergency_mode_widens_batches_on_next_cycle() {
    let push = CountingAdapter::new(ChannelKind::Push, true);
    let dispatcher = Dispatcher::builder(DispatchConfig::default())
        .with_adapter(push.clone())
        .build();
    dispatcher.start();

    // normal high tier: batch_size 50 per 250ms cycle, so 60 alerts
    // need two cycles
    for i in 0..60 {
        dispatcher
            .dispatch(spec(
                Priority::High,
                vec![ChannelKind::Push],
                &format!("evt-{i}"),
            ))
            .unwrap();
    }

    settle(Duration::from_millis(300)).await;
    assert_eq!(push.calls(), 50);
    assert_eq!(dispatcher.queue_status().high, 10);

    settle(Duration::from_millis(300)).await;
    assert_eq!(push.calls(), 60);
    assert_eq!(dispatcher.queue_status().high, 0);

    // emergency mode: batch_size 100 per 100ms cycle. A 150-alert flood
    // clears within ~300ms, which normal batching could not do.
    dispatcher.enable_emergency_mode();
    assert!(dispatcher.emergency_mode_active());
    for i in 0..150 {
        dispatcher
            .dispatch(spec(
                Priority::High,
                vec![ChannelKind::Push],
                &format!("evt-surge-{i}"),
            ))
            .unwrap();
    }

    settle(Duration::from_millis(300)).await;
    assert_eq!(push.calls(), 210);
    assert_eq!(dispatcher.queue_status().high, 0);

    dispatcher.disable_emergency_mode();
    assert!(!dispatcher.emergency_mode_active());

    dispatcher.shutdown();
}

#[tokio::test(start_paused = true)]
async fn socket_and_inbox_channels_deliver_together() {
    let socket = Arc::new(SocketChannel::new(64));
    let inbox = Arc::new(InboxChannel::new(20));
    let mut rx = socket.subscribe();

    let dispatcher = Dispatcher::builder(DispatchConfig::default())
        .with_adapter(socket.clone())
        .with_adapter(inbox.clone())
        .build();
    dispatcher.start();

    dispatcher
        .dispatch(spec(
            Priority::Critical,
            vec![ChannelKind::Socket, ChannelKind::Inbox],
            "evt-1",
        ))
        .unwrap();

    settle(Duration::from_millis(100)).await;

    let pushed = rx.try_recv().expect("socket message pushed");
    assert_eq!(pushed.user_id, "user-1");
    assert_eq!(pushed.priority, Priority::Critical);

    let entries = inbox.entries_for("user-1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].alert_id, pushed.alert_id);
    assert_eq!(dispatcher.dispatch_metrics().successful_deliveries, 1);

    dispatcher.shutdown();
}
