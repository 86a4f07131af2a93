//! The transaction queue: admits financial work items, schedules them across
//! a bounded set of concurrent processor tasks with priority and backoff
//! retry, and routes exhausted items to the dead-letter partition. Lifecycle
//! transitions are announced on the event bus.

pub mod metrics;
pub mod pending;
pub mod processor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Notify;
use tokio::time;

use metrics::{QueueMetrics, QueueMetricsSnapshot};
use pending::PendingQueue;
use processor::TransactionProcessor;

use crate::bus::EventBus;
use crate::config::QueueConfig;
use crate::errors::queue::QueueError;
use crate::models::events::{Event, EventPriority, EventType};
use crate::models::transactions::{QueuedTransaction, TransactionStatus};

#[derive(Clone)]
pub struct TransactionQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    config: RwLock<QueueConfig>,
    pending: Mutex<PendingQueue>,
    processing: DashMap<String, QueuedTransaction>,
    completed: DashMap<String, QueuedTransaction>,
    dead_letter: DashMap<String, QueuedTransaction>,
    processors: RwLock<Vec<Arc<dyn TransactionProcessor>>>,
    metrics: QueueMetrics,
    bus: EventBus,
    paused: AtomicBool,
    accepting: AtomicBool,
    shutting_down: AtomicBool,
    shutdown_notify: Notify,
    started: AtomicBool,
}

impl TransactionQueue {
    pub fn new(config: QueueConfig, bus: EventBus) -> Result<Self, QueueError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(QueueInner {
                config: RwLock::new(config),
                pending: Mutex::new(PendingQueue::default()),
                processing: DashMap::new(),
                completed: DashMap::new(),
                dead_letter: DashMap::new(),
                processors: RwLock::new(Vec::new()),
                metrics: QueueMetrics::default(),
                bus,
                paused: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
                shutting_down: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Spawns the dispatcher and retention-sweep loops. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move { queue.run_dispatcher().await });
        let queue = self.clone();
        tokio::spawn(async move { queue.run_retention_sweep().await });
    }

    // ---- admission -------------------------------------------------------

    /// Admits a pending transaction to the scheduler. Non-blocking; the
    /// eventual outcome is only observable via lifecycle events or [get].
    ///
    /// [get]: TransactionQueue::get
    #[tracing::instrument(skip_all, fields(id = %transaction.id, priority = transaction.priority.as_str()))]
    pub fn enqueue(&self, transaction: QueuedTransaction) -> Result<(), QueueError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::ShutdownInProgress);
        }
        if transaction.id.is_empty() {
            return Err(QueueError::InvalidItem("id must not be empty"));
        }
        if transaction.user_id.is_empty() {
            return Err(QueueError::InvalidItem("userId must not be empty"));
        }
        if transaction.status != TransactionStatus::Pending {
            return Err(QueueError::InvalidItem("status must be pending on admission"));
        }

        self.inner.metrics.record_queued();
        self.inner.pending.lock().unwrap().push(transaction);
        tracing::debug!("Transaction admitted to pending partition");

        Ok(())
    }

    /// Cancels a pending item. Items already processing (or unknown) return
    /// `false`; there is no cooperative cancellation once a processor holds
    /// the work.
    #[tracing::instrument(skip(self))]
    pub fn cancel(&self, id: &str) -> bool {
        let Some(mut transaction) = self.inner.pending.lock().unwrap().remove(id) else {
            return false;
        };

        transaction.status = TransactionStatus::Cancelled;
        transaction.completed_at = Some(Utc::now());
        self.inner.completed.insert(transaction.id.clone(), transaction);
        tracing::info!("Cancelled pending transaction");

        true
    }

    /// Snapshot of an item from any partition.
    pub fn get(&self, id: &str) -> Option<QueuedTransaction> {
        if let Some(found) = self.inner.processing.get(id) {
            return Some(found.clone());
        }
        if let Some(found) = self.inner.completed.get(id) {
            return Some(found.clone());
        }
        if let Some(found) = self.inner.dead_letter.get(id) {
            return Some(found.clone());
        }

        self.inner.pending.lock().unwrap().get(id)
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        tracing::info!("Transaction queue paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        tracing::info!("Transaction queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn register_processor(&self, processor: Arc<dyn TransactionProcessor>) {
        tracing::info!("Registered processor '{}'", processor.name());
        self.inner.processors.write().unwrap().push(processor);
    }

    /// Removes a processor by name. Returns whether anything was removed.
    pub fn unregister_processor(&self, name: &str) -> bool {
        let mut processors = self.inner.processors.write().unwrap();
        let before = processors.len();
        processors.retain(|processor| processor.name() != name);

        before != processors.len()
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        let status = if self.is_paused() { "paused" } else { "running" };

        self.inner.metrics.snapshot(
            status,
            self.inner.pending.lock().unwrap().len(),
            self.inner.processing.len(),
            self.inner.completed.len(),
            self.inner.dead_letter.len(),
        )
    }

    pub fn update_configuration(&self, config: QueueConfig) -> Result<(), QueueError> {
        config.validate()?;
        *self.inner.config.write().unwrap() = config;
        tracing::info!("Queue configuration updated");

        Ok(())
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config.read().unwrap().clone()
    }

    /// Stops admissions and the dispatcher, then waits up to the grace
    /// window for in-flight processing to drain. Whatever remains is left in
    /// the processing partition for post-mortem inspection.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.shutdown_notify.notify_waiters();

        let grace = self.inner.config.read().unwrap().shutdown_grace;
        let deadline = Instant::now() + grace;
        while !self.inner.processing.is_empty() && Instant::now() < deadline {
            time::sleep(Duration::from_millis(25)).await;
        }

        let stranded = self.inner.processing.len();
        if stranded > 0 {
            tracing::warn!("Shutdown grace elapsed with {stranded} transactions still processing");
        }
    }

    // ---- dispatch --------------------------------------------------------

    async fn run_dispatcher(&self) {
        loop {
            let interval = self.inner.config.read().unwrap().dispatch_interval_ms;
            tokio::select! {
                _ = time::sleep(Duration::from_millis(interval)) => {}
                _ = self.inner.shutdown_notify.notified() => {}
            }
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            if self.inner.paused.load(Ordering::SeqCst) {
                continue;
            }

            self.dispatch_tick();
        }

        tracing::debug!("Transaction dispatcher stopped");
    }

    fn dispatch_tick(&self) {
        let (max_concurrent, batch_size) = {
            let config = self.inner.config.read().unwrap();
            (config.max_concurrent_processing, config.batch_size)
        };

        let slots = max_concurrent.saturating_sub(self.inner.processing.len());
        if slots == 0 {
            return;
        }

        let batch = self
            .inner
            .pending
            .lock()
            .unwrap()
            .pop_due(slots.min(batch_size), Utc::now());

        for mut transaction in batch {
            transaction.status = TransactionStatus::Processing;
            transaction.processed_at = Some(Utc::now());
            self.inner.metrics.record_processing();
            self.inner
                .processing
                .insert(transaction.id.clone(), transaction.clone());

            // Emitted here, not in the task, so processing events leave in
            // batch (priority) order.
            self.emit_lifecycle(
                EventType::TransactionProcessing,
                &transaction,
                json!({
                    "transactionId": transaction.id,
                    "priority": transaction.priority.as_str(),
                    "retryCount": transaction.retry_count,
                }),
            );

            let queue = self.clone();
            tokio::spawn(async move { queue.run_transaction(transaction).await });
        }
    }

    async fn run_transaction(&self, transaction: QueuedTransaction) {
        let started = Instant::now();
        let timeout_ms = self.inner.config.read().unwrap().processing_timeout_ms;
        let processors: Vec<Arc<dyn TransactionProcessor>> =
            self.inner.processors.read().unwrap().clone();

        let id = transaction.id.clone();
        let outcome = time::timeout(
            Duration::from_millis(timeout_ms),
            Self::run_processors(processors, &transaction),
        )
        .await;

        match outcome {
            Ok(Ok(())) => self.complete(transaction, started),
            Ok(Err(message)) => self.handle_failure(transaction, message),
            // The abandoned processor future may keep running; its outcome
            // is ignored, which is why processors must be idempotent.
            Err(_) => {
                tracing::warn!("Transaction {id} hit the processing timeout");
                self.handle_failure(transaction, "processing timeout".to_string());
            }
        }
    }

    async fn run_processors(
        processors: Vec<Arc<dyn TransactionProcessor>>,
        transaction: &QueuedTransaction,
    ) -> Result<(), String> {
        for processor in processors {
            processor
                .process(transaction)
                .await
                .map_err(|err| err.to_string())?;
        }

        Ok(())
    }

    fn complete(&self, mut transaction: QueuedTransaction, started: Instant) {
        self.inner.processing.remove(&transaction.id);

        transaction.status = TransactionStatus::Completed;
        transaction.completed_at = Some(Utc::now());
        self.inner.metrics.record_completion(started.elapsed());

        self.emit_lifecycle(
            EventType::TransactionCompleted,
            &transaction,
            json!({
                "transactionId": transaction.id,
                "retryCount": transaction.retry_count,
                "processingTimeMs": started.elapsed().as_millis() as u64,
            }),
        );

        tracing::debug!("Transaction {} completed", transaction.id);
        self.inner
            .completed
            .insert(transaction.id.clone(), transaction);
    }

    fn handle_failure(&self, mut transaction: QueuedTransaction, message: String) {
        self.inner.metrics.record_failure();
        self.inner.processing.remove(&transaction.id);
        transaction.error_message = Some(message.clone());

        let will_retry = transaction.retry_count < transaction.max_retries;
        self.emit_lifecycle(
            EventType::TransactionFailed,
            &transaction,
            json!({
                "transactionId": transaction.id,
                "error": message,
                "retryCount": transaction.retry_count,
                "willRetry": will_retry,
            }),
        );

        if will_retry {
            let config = self.inner.config.read().unwrap();
            let delay = backoff_delay_ms(
                config.retry_delay_ms,
                config.max_retry_delay_ms,
                transaction.retry_count,
            );
            drop(config);

            transaction.retry_count += 1;
            transaction.status = TransactionStatus::Pending;
            transaction.scheduled_at =
                Utc::now() + chrono::TimeDelta::milliseconds(delay as i64);

            tracing::warn!(
                "Transaction {} failed ({message}), retry {}/{} in {delay}ms",
                transaction.id,
                transaction.retry_count,
                transaction.max_retries,
            );
            self.inner.pending.lock().unwrap().push(transaction);
        } else {
            transaction.status = TransactionStatus::Failed;

            tracing::error!(
                "Transaction {} exhausted its {} retries, moving to dead letter",
                transaction.id,
                transaction.max_retries,
            );
            self.inner
                .dead_letter
                .insert(transaction.id.clone(), transaction);
        }
    }

    /// Lifecycle events of one transaction share its id as correlation id.
    fn emit_lifecycle(
        &self,
        r#type: EventType,
        transaction: &QueuedTransaction,
        data: serde_json::Value,
    ) {
        let event = Event::new(r#type, transaction.user_id.clone(), data)
            .with_priority(EventPriority::High)
            .with_source("transaction-queue")
            .with_correlation_id(transaction.id.clone());

        self.inner.bus.emit(event);
    }

    async fn run_retention_sweep(&self) {
        loop {
            let interval = self.inner.config.read().unwrap().retention_sweep_interval;
            tokio::select! {
                _ = time::sleep(interval) => {}
                _ = self.inner.shutdown_notify.notified() => {}
            }
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            let retention = self.inner.config.read().unwrap().completed_retention;
            let cutoff = Utc::now()
                - chrono::TimeDelta::from_std(retention)
                    .unwrap_or_else(|_| chrono::TimeDelta::hours(24));

            let before = self.inner.completed.len() + self.inner.dead_letter.len();
            self.inner
                .completed
                .retain(|_, item| item.completed_at.is_none_or(|at| at >= cutoff));
            self.inner
                .dead_letter
                .retain(|_, item| item.processed_at.is_none_or(|at| at >= cutoff));
            let evicted = before
                .saturating_sub(self.inner.completed.len() + self.inner.dead_letter.len());
            if evicted > 0 {
                tracing::debug!("Retention sweep evicted {evicted} settled transactions");
            }
        }
    }
}

/// `min(retry_delay * 2^retry_count, max_retry_delay)`, saturating.
fn backoff_delay_ms(retry_delay_ms: u64, max_retry_delay_ms: u64, retry_count: u32) -> u64 {
    let factor = 1u64.checked_shl(retry_count.min(63)).unwrap_or(u64::MAX);

    retry_delay_ms
        .saturating_mul(factor)
        .min(max_retry_delay_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use super::processor::ProcessorError;

    use crate::bus::history::EventHistoryQuery;
    use crate::config::{BusConfig, HubConfig};
    use crate::models::transactions::TransactionPriority;
    use crate::websockets::ConnectionHub;

    // Succeeds after an optional number of initial failures.
    struct FlakyProcessor {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyProcessor {
        fn failing_first(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TransactionProcessor for FlakyProcessor {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn process(&self, _transaction: &QueuedTransaction) -> Result<(), ProcessorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_millis(5)).await;

            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProcessorError::new("ledger unavailable"));
            }
            Ok(())
        }
    }

    struct SlowProcessor {
        hold: Duration,
    }

    #[async_trait]
    impl TransactionProcessor for SlowProcessor {
        fn name(&self) -> &str {
            "slow"
        }

        async fn process(&self, _transaction: &QueuedTransaction) -> Result<(), ProcessorError> {
            time::sleep(self.hold).await;
            Ok(())
        }
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            dispatch_interval_ms: 10,
            retry_delay_ms: 10,
            max_retry_delay_ms: 100,
            processing_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn build(config: QueueConfig) -> (TransactionQueue, EventBus) {
        let hub = ConnectionHub::new(HubConfig::default());
        let bus = EventBus::new(BusConfig::default(), hub);
        let queue = TransactionQueue::new(config, bus.clone()).expect("valid config");

        (queue, bus)
    }

    fn tx(id: &str, priority: TransactionPriority, max_retries: u32) -> QueuedTransaction {
        QueuedTransaction::new(id, "u1", json!({ "amount": 10 }), priority, max_retries)
    }

    fn lifecycle_events(bus: &EventBus, r#type: EventType) -> Vec<Event> {
        bus.query(&EventHistoryQuery {
            event_types: Some(vec![r#type]),
            ..Default::default()
        })
    }

    async fn wait_for_status(
        queue: &TransactionQueue,
        id: &str,
        status: TransactionStatus,
    ) -> QueuedTransaction {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(snapshot) = queue.get(id)
                && snapshot.status == status
            {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {status:?}");
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn happy_path_emits_processing_then_completed() {
        let (queue, bus) = build(fast_config());
        queue.register_processor(FlakyProcessor::failing_first(0));
        queue.start();

        queue
            .enqueue(tx("t1", TransactionPriority::High, 3))
            .unwrap();
        let snapshot = wait_for_status(&queue, "t1", TransactionStatus::Completed).await;

        assert_eq!(snapshot.retry_count, 0);
        assert!(snapshot.completed_at.is_some());

        let processing = lifecycle_events(&bus, EventType::TransactionProcessing);
        let completed = lifecycle_events(&bus, EventType::TransactionCompleted);
        assert_eq!(processing.len(), 1);
        assert_eq!(completed.len(), 1);
        assert!(processing[0].timestamp <= completed[0].timestamp);
        assert!(lifecycle_events(&bus, EventType::TransactionFailed).is_empty());
    }

    #[tokio::test]
    async fn retries_back_off_then_recover() {
        let (queue, bus) = build(fast_config());
        let processor = FlakyProcessor::failing_first(2);
        queue.register_processor(processor.clone());
        queue.start();

        let started = Instant::now();
        queue
            .enqueue(tx("t2", TransactionPriority::Medium, 3))
            .unwrap();
        let snapshot = wait_for_status(&queue, "t2", TransactionStatus::Completed).await;

        assert_eq!(snapshot.retry_count, 2);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(
            started.elapsed() >= Duration::from_millis(30),
            "backoff must impose 10ms + 20ms delays"
        );
        assert_eq!(lifecycle_events(&bus, EventType::TransactionFailed).len(), 2);
        assert_eq!(lifecycle_events(&bus, EventType::TransactionCompleted).len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_route_to_dead_letter() {
        let (queue, bus) = build(fast_config());
        queue.register_processor(FlakyProcessor::failing_first(u32::MAX));
        queue.start();

        queue.enqueue(tx("t3", TransactionPriority::High, 2)).unwrap();
        let snapshot = wait_for_status(&queue, "t3", TransactionStatus::Failed).await;

        assert_eq!(snapshot.retry_count, snapshot.max_retries);
        assert_eq!(lifecycle_events(&bus, EventType::TransactionFailed).len(), 3);
        assert!(!queue.cancel("t3"), "dead-lettered items are terminal");
        assert_eq!(queue.metrics().dead_letter_count, 1);
    }

    #[tokio::test]
    async fn zero_max_retries_dead_letters_on_first_failure() {
        let (queue, bus) = build(fast_config());
        queue.register_processor(FlakyProcessor::failing_first(u32::MAX));
        queue.start();

        queue.enqueue(tx("t4", TransactionPriority::Low, 0)).unwrap();
        wait_for_status(&queue, "t4", TransactionStatus::Failed).await;

        assert_eq!(lifecycle_events(&bus, EventType::TransactionFailed).len(), 1);
    }

    #[tokio::test]
    async fn timeouts_count_as_failures() {
        let config = QueueConfig {
            processing_timeout_ms: 1_000,
            ..fast_config()
        };
        let (queue, _bus) = build(config);
        queue.register_processor(Arc::new(SlowProcessor {
            hold: Duration::from_secs(5),
        }));
        queue.start();

        queue.enqueue(tx("t5", TransactionPriority::High, 0)).unwrap();
        let snapshot = wait_for_status(&queue, "t5", TransactionStatus::Failed).await;

        assert_eq!(snapshot.error_message.as_deref(), Some("processing timeout"));
    }

    #[tokio::test]
    async fn concurrency_cap_is_never_exceeded() {
        let config = QueueConfig {
            max_concurrent_processing: 2,
            batch_size: 10,
            ..fast_config()
        };
        let (queue, _bus) = build(config);
        queue.register_processor(Arc::new(SlowProcessor {
            hold: Duration::from_millis(50),
        }));
        queue.start();

        for i in 0..6 {
            queue
                .enqueue(tx(&format!("c{i}"), TransactionPriority::Medium, 0))
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            let snapshot = queue.metrics();
            assert!(snapshot.processing_count <= 2, "cap breached");
            if snapshot.completed_count == 6 {
                break;
            }
            assert!(Instant::now() < deadline, "queue never drained");
            time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn pause_holds_dispatch_and_resume_releases_it() {
        let (queue, _bus) = build(fast_config());
        queue.register_processor(FlakyProcessor::failing_first(0));
        queue.start();
        queue.pause();

        for i in 0..3 {
            queue
                .enqueue(tx(&format!("p{i}"), TransactionPriority::High, 0))
                .unwrap();
        }
        time::sleep(Duration::from_millis(80)).await;
        let held = queue.metrics();
        assert_eq!(held.pending_count, 3);
        assert_eq!(held.completed_count, 0, "nothing may process while paused");

        queue.resume();
        for i in 0..3 {
            wait_for_status(&queue, &format!("p{i}"), TransactionStatus::Completed).await;
        }
    }

    #[tokio::test]
    async fn cancel_only_reaches_pending_items() {
        let (queue, _bus) = build(fast_config());
        queue.pause();
        queue.start();

        queue.enqueue(tx("c1", TransactionPriority::Low, 0)).unwrap();
        assert!(queue.cancel("c1"));
        assert!(!queue.cancel("c1"), "second cancel finds nothing pending");
        assert_eq!(
            queue.get("c1").unwrap().status,
            TransactionStatus::Cancelled
        );
        assert!(!queue.cancel("missing"));
    }

    #[tokio::test]
    async fn critical_items_preempt_within_a_batch() {
        let config = QueueConfig {
            batch_size: 5,
            max_concurrent_processing: 5,
            ..fast_config()
        };
        let (queue, bus) = build(config);
        queue.register_processor(FlakyProcessor::failing_first(0));
        queue.pause();
        queue.start();

        for i in 0..10 {
            queue
                .enqueue(tx(&format!("low{i}"), TransactionPriority::Low, 0))
                .unwrap();
        }
        queue.enqueue(tx("crit", TransactionPriority::Critical, 0)).unwrap();
        queue.resume();

        wait_for_status(&queue, "crit", TransactionStatus::Completed).await;
        for i in 0..10 {
            wait_for_status(&queue, &format!("low{i}"), TransactionStatus::Completed).await;
        }

        let processing = lifecycle_events(&bus, EventType::TransactionProcessing);
        let crit_at = processing
            .iter()
            .find(|e| e.data["transactionId"] == json!("crit"))
            .map(|e| e.timestamp)
            .expect("critical processing event");
        for event in &processing {
            if event.data["transactionId"] != json!("crit") {
                assert!(
                    crit_at <= event.timestamp,
                    "critical must enter processing first"
                );
            }
        }
    }

    #[tokio::test]
    async fn enqueue_validates_and_shutdown_refuses_new_work() {
        let (queue, _bus) = build(fast_config());
        queue.start();

        let bad = tx("", TransactionPriority::Low, 0);
        assert!(matches!(
            queue.enqueue(bad),
            Err(QueueError::InvalidItem(_))
        ));

        queue.shutdown().await;
        assert!(matches!(
            queue.enqueue(tx("late", TransactionPriority::Low, 0)),
            Err(QueueError::ShutdownInProgress)
        ));
    }

    #[tokio::test]
    async fn configuration_updates_are_validated() {
        let (queue, _bus) = build(fast_config());

        let invalid = QueueConfig {
            batch_size: 0,
            ..fast_config()
        };
        assert!(matches!(
            queue.update_configuration(invalid),
            Err(QueueError::InvalidConfig(_))
        ));

        let valid = QueueConfig {
            batch_size: 3,
            ..fast_config()
        };
        queue.update_configuration(valid).unwrap();
        assert_eq!(queue.config().batch_size, 3);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay_ms(10, 1_000, 0), 10);
        assert_eq!(backoff_delay_ms(10, 1_000, 1), 20);
        assert_eq!(backoff_delay_ms(10, 1_000, 3), 80);
        assert_eq!(backoff_delay_ms(10, 1_000, 30), 1_000, "capped at the ceiling");
        assert_eq!(backoff_delay_ms(10, 1_000, 200), 1_000, "huge counts saturate");
    }
}
