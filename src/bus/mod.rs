//! The event bus: accepts domain events, batches them by priority, and hands
//! them to the connection hub for delivery. Every emitted event lands in the
//! bounded history, expired or not, until the age sweep takes it.

pub mod history;
pub mod metrics;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time;

use history::{EventHistory, EventHistoryQuery};
use metrics::{BusMetrics, BusMetricsSnapshot};

use crate::config::BusConfig;
use crate::errors::events::EventError;
use crate::models::events::{Event, EventPriority, EventType, SYSTEM_USER};
use crate::websockets::ConnectionHub;

#[derive(Debug)]
struct QueuedEvent {
    event: Event,
    /// Set once the event has already been retried; a second failure is
    /// terminal.
    redelivery: bool,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    hub: ConnectionHub,
    pending: Mutex<VecDeque<QueuedEvent>>,
    history: EventHistory,
    metrics: BusMetrics,
    paused: AtomicBool,
    shutting_down: AtomicBool,
    shutdown_notify: Notify,
    started: AtomicBool,
}

impl EventBus {
    pub fn new(config: BusConfig, hub: ConnectionHub) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                hub,
                pending: Mutex::new(VecDeque::new()),
                history: EventHistory::default(),
                metrics: BusMetrics::default(),
                paused: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the dispatch and history-cleanup loops. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let bus = self.clone();
        tokio::spawn(async move { bus.run_dispatcher().await });
        let bus = self.clone();
        tokio::spawn(async move { bus.run_cleanup().await });
    }

    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.shutdown_notify.notify_waiters();
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        tracing::info!("Event bus paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        tracing::info!("Event bus resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    // ---- emission --------------------------------------------------------

    /// Queues an event for dispatch. Non-blocking. Expired events are
    /// recorded in history but silently skipped for delivery.
    pub fn emit(&self, event: Event) {
        self.inner.metrics.record_emitted(event.r#type);
        self.inner.history.insert(event.clone());

        if event.is_expired() {
            tracing::debug!("Skipping already-expired event {}", event.id);
            return;
        }

        self.inner.pending.lock().unwrap().push_back(QueuedEvent {
            event,
            redelivery: false,
        });
    }

    /// Emits with the recipient overridden; generates a correlation id if
    /// the event arrived without one.
    pub fn emit_to_user(&self, user_id: impl Into<String>, mut event: Event) {
        event.user_id = user_id.into();
        if event.correlation_id.is_empty() {
            event.correlation_id = uuid::Uuid::new_v4().to_string();
        }

        self.emit(event);
    }

    /// Convenience constructor for queue lifecycle events. Priority defaults
    /// to high.
    pub fn emit_transaction_event(
        &self,
        r#type: EventType,
        user_id: impl Into<String>,
        data: Value,
        priority: Option<EventPriority>,
    ) -> Result<Event, EventError> {
        if !r#type.is_transaction_lifecycle() {
            return Err(EventError::NotTransactionEvent(r#type.as_str().to_string()));
        }

        let event = Event::new(r#type, user_id, data)
            .with_priority(priority.unwrap_or(EventPriority::High))
            .with_source("transaction-queue");
        self.emit(event.clone());

        Ok(event)
    }

    pub fn emit_balance_update(&self, user_id: impl Into<String>, data: Value) -> Event {
        let event = Event::new(EventType::BalanceUpdated, user_id, data)
            .with_priority(EventPriority::Medium)
            .with_source("ledger");
        self.emit(event.clone());

        event
    }

    /// Emits a system alert. An empty `affected_users` set produces a single
    /// broadcast event addressed to the `system` sentinel; otherwise one
    /// event per user.
    pub fn emit_system_alert(
        &self,
        message: &str,
        severity: &str,
        affected_users: &[String],
    ) -> Vec<Event> {
        let data = json!({ "message": message, "severity": severity });
        let alert = |user: &str| {
            Event::new(EventType::SystemAlert, user, data.clone())
                .with_priority(EventPriority::Critical)
                .with_source(SYSTEM_USER)
        };

        let events: Vec<Event> = if affected_users.is_empty() {
            vec![alert(SYSTEM_USER)]
        } else {
            affected_users.iter().map(|user| alert(user)).collect()
        };

        for event in &events {
            self.emit(event.clone());
        }

        events
    }

    // ---- queries ---------------------------------------------------------

    pub fn query(&self, query: &EventHistoryQuery) -> Vec<Event> {
        self.inner.history.query(query)
    }

    pub fn history_contains(&self, id: &uuid::Uuid) -> bool {
        self.inner.history.contains(id)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    pub fn metrics(&self) -> BusMetricsSnapshot {
        let status = if self.is_paused() { "paused" } else { "running" };

        self.inner
            .metrics
            .snapshot(status, self.pending_len(), self.inner.history.len())
    }

    // ---- dispatch --------------------------------------------------------

    async fn run_dispatcher(&self) {
        loop {
            tokio::select! {
                _ = time::sleep(Duration::from_millis(self.inner.config.dispatch_interval_ms)) => {}
                _ = self.inner.shutdown_notify.notified() => {}
            }
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            if self.inner.paused.load(Ordering::SeqCst) {
                continue;
            }

            self.dispatch_tick().await;
        }

        tracing::debug!("Event dispatcher stopped");
    }

    async fn dispatch_tick(&self) {
        let mut batch: Vec<QueuedEvent> = {
            let mut pending = self.inner.pending.lock().unwrap();
            let take = pending.len().min(self.inner.config.max_batch);
            pending.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }

        // Stable sort keeps FIFO order within a priority band.
        batch.sort_by(|a, b| {
            b.event
                .metadata
                .priority
                .score()
                .cmp(&a.event.metadata.priority.score())
        });

        for queued in batch {
            if queued.event.is_expired() {
                tracing::debug!("Skipping event {} that expired in queue", queued.event.id);
                continue;
            }

            let started = Instant::now();
            match self.inner.hub.process_event(&queued.event).await {
                Ok(delivered) => {
                    self.inner
                        .metrics
                        .record_dispatched(queued.event.r#type, started.elapsed());
                    tracing::trace!(
                        "Dispatched {} to {delivered} connections",
                        queued.event.r#type
                    );
                }
                Err(err) => {
                    self.inner.metrics.record_error(queued.event.r#type);

                    let retry = !queued.redelivery
                        && queued.event.metadata.retryable
                        && !queued.event.is_expired();
                    if retry {
                        tracing::warn!(
                            "Dispatch of event {} failed ({err}), retrying once",
                            queued.event.id
                        );
                        self.inner.pending.lock().unwrap().push_front(QueuedEvent {
                            event: queued.event,
                            redelivery: true,
                        });
                    } else {
                        tracing::error!(
                            "Dropping event {} after dispatch failure: {err}",
                            queued.event.id
                        );
                    }
                }
            }
        }

        // Sampled so a busy bus doesn't flood the log with summaries.
        if rand::random::<f64>() < 0.02 {
            let snapshot = self.metrics();
            tracing::debug!(
                "Bus summary: {} dispatched, {} errors, {:.1}/s",
                snapshot.total_dispatched,
                snapshot.total_errors,
                snapshot.throughput_per_sec
            );
        }
    }

    async fn run_cleanup(&self) {
        loop {
            tokio::select! {
                _ = time::sleep(self.inner.config.cleanup_interval) => {}
                _ = self.inner.shutdown_notify.notified() => {}
            }
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            let retention = chrono::TimeDelta::from_std(self.inner.config.history_retention)
                .unwrap_or_else(|_| chrono::TimeDelta::hours(24));
            let evicted = self.inner.history.evict_older_than(Utc::now() - retention);
            if evicted > 0 {
                tracing::debug!("Evicted {evicted} aged events from history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::HubConfig;
    use crate::models::websockets::{WsMessage, WsMessageType};

    fn fast_bus(hub: &ConnectionHub) -> EventBus {
        EventBus::new(
            BusConfig {
                dispatch_interval_ms: 10,
                ..Default::default()
            },
            hub.clone(),
        )
    }

    fn connect_subscribed(
        hub: &ConnectionHub,
        user: &str,
        types: &[EventType],
    ) -> mpsc::UnboundedReceiver<WsMessage> {
        let token = hub.obtain_token(user.to_string(), Value::Null);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.add_connection("peer".to_string(), user.to_string(), Value::Null, tx);
        hub.authenticate(id, token).unwrap();
        hub.subscribe(id, types.to_vec(), None).unwrap();

        rx
    }

    fn drain_events(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if frame.r#type == WsMessageType::Event {
                events.push(serde_json::from_value(frame.payload).unwrap());
            }
        }
        events
    }

    #[tokio::test]
    async fn batches_dispatch_highest_priority_first() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut rx = connect_subscribed(&hub, "u1", &[EventType::BalanceUpdated]);
        let bus = fast_bus(&hub);

        // queued before the dispatcher starts, so both land in one batch
        bus.emit(
            Event::new(EventType::BalanceUpdated, "u1", json!({ "marker": "low" }))
                .with_priority(EventPriority::Low),
        );
        bus.emit(
            Event::new(EventType::BalanceUpdated, "u1", json!({ "marker": "critical" }))
                .with_priority(EventPriority::Critical),
        );
        bus.start();
        time::sleep(Duration::from_millis(100)).await;

        let markers: Vec<String> = drain_events(&mut rx)
            .iter()
            .map(|e| e.data["marker"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(markers, vec!["critical", "low"]);
    }

    #[tokio::test]
    async fn failed_dispatch_retries_once_then_buffers() {
        let hub = ConnectionHub::new(HubConfig::default());
        let rx = connect_subscribed(&hub, "u1", &[EventType::BalanceUpdated]);
        drop(rx); // dead transport: the first dispatch attempt fails

        let bus = fast_bus(&hub);
        bus.start();
        bus.emit(Event::new(EventType::BalanceUpdated, "u1", json!({})));
        time::sleep(Duration::from_millis(150)).await;

        let snapshot = bus.metrics();
        assert_eq!(snapshot.total_errors, 1, "one failed attempt");
        assert_eq!(snapshot.total_dispatched, 1, "redelivery succeeded");
        assert_eq!(
            hub.buffered_event_count("u1"),
            1,
            "redelivery found the user offline and buffered"
        );
    }

    #[tokio::test]
    async fn expired_events_stay_in_history_but_never_deliver() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut rx = connect_subscribed(&hub, "u1", &[EventType::BalanceUpdated]);
        let bus = fast_bus(&hub);
        bus.start();

        let expired = Event::new(EventType::BalanceUpdated, "u1", json!({}))
            .with_expiry(Utc::now() - TimeDelta::seconds(1));
        let id = expired.id;
        bus.emit(expired);
        time::sleep(Duration::from_millis(100)).await;

        assert!(bus.history_contains(&id), "expired events are history too");
        assert!(drain_events(&mut rx).is_empty());
        assert_eq!(hub.buffered_event_count("u1"), 0);
    }

    #[tokio::test]
    async fn pause_holds_dispatch_until_resume() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut rx = connect_subscribed(&hub, "u1", &[EventType::BalanceUpdated]);
        let bus = fast_bus(&hub);
        bus.start();
        bus.pause();

        bus.emit(Event::new(EventType::BalanceUpdated, "u1", json!({})));
        time::sleep(Duration::from_millis(80)).await;
        assert!(drain_events(&mut rx).is_empty(), "paused bus must sit still");

        bus.resume();
        time::sleep(Duration::from_millis(80)).await;
        assert_eq!(drain_events(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn system_alert_broadcast_is_a_single_sentinel_event() {
        let hub = ConnectionHub::new(HubConfig::default());
        let bus = fast_bus(&hub);

        let broadcast = bus.emit_system_alert("maintenance window", "info", &[]);
        assert_eq!(broadcast.len(), 1);
        assert_eq!(broadcast[0].user_id, SYSTEM_USER);

        let targeted = bus.emit_system_alert(
            "your account",
            "warning",
            &["a".to_string(), "b".to_string()],
        );
        assert_eq!(targeted.len(), 2);
        assert!(targeted.iter().all(|e| e.user_id != SYSTEM_USER));
    }

    #[tokio::test]
    async fn transaction_emitter_rejects_non_lifecycle_types() {
        let hub = ConnectionHub::new(HubConfig::default());
        let bus = fast_bus(&hub);

        let err = bus
            .emit_transaction_event(EventType::BalanceUpdated, "u1", json!({}), None)
            .unwrap_err();
        assert!(matches!(err, EventError::NotTransactionEvent(_)));

        let event = bus
            .emit_transaction_event(EventType::TransactionCompleted, "u1", json!({}), None)
            .unwrap();
        assert_eq!(event.metadata.priority, EventPriority::High);
    }

    #[tokio::test]
    async fn emit_to_user_overrides_recipient_and_fills_correlation() {
        let hub = ConnectionHub::new(HubConfig::default());
        let bus = fast_bus(&hub);

        let mut event = Event::new(EventType::AccountCreated, "someone-else", json!({}));
        event.correlation_id = String::new();
        let id = event.id;
        bus.emit_to_user("u9", event);

        let stored = bus
            .query(&EventHistoryQuery {
                user_ids: Some(vec!["u9".to_string()]),
                ..Default::default()
            })
            .into_iter()
            .find(|e| e.id == id)
            .expect("event must be queryable by its new recipient");
        assert!(!stored.correlation_id.is_empty());
    }
}
