use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::events::EventType;

const EMA_ALPHA: f64 = 0.1;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone)]
struct TypeMetrics {
    count: u64,
    error_count: u64,
    avg_processing_ms: Option<f64>,
}

/// Counters for the event bus: totals, per-type breakdown, and a 30 s
/// throughput window.
#[derive(Debug, Default)]
pub struct BusMetrics {
    total_emitted: AtomicU64,
    total_dispatched: AtomicU64,
    total_errors: AtomicU64,
    per_type: DashMap<EventType, TypeMetrics>,
    dispatches: Mutex<VecDeque<Instant>>,
    last_processed_at: Mutex<Option<DateTime<Utc>>>,
}

impl BusMetrics {
    pub fn record_emitted(&self, r#type: EventType) {
        self.total_emitted.fetch_add(1, Ordering::Relaxed);
        self.per_type.entry(r#type).or_default().count += 1;
    }

    pub fn record_dispatched(&self, r#type: EventType, elapsed: Duration) {
        self.total_dispatched.fetch_add(1, Ordering::Relaxed);

        let sample = elapsed.as_secs_f64() * 1_000.0;
        let mut entry = self.per_type.entry(r#type).or_default();
        entry.avg_processing_ms = Some(match entry.avg_processing_ms {
            Some(prev) => (1.0 - EMA_ALPHA) * prev + EMA_ALPHA * sample,
            None => sample,
        });
        drop(entry);

        let now = Instant::now();
        let mut window = self.dispatches.lock().unwrap();
        window.push_back(now);
        while window
            .front()
            .is_some_and(|at| now.duration_since(*at) > THROUGHPUT_WINDOW)
        {
            window.pop_front();
        }

        *self.last_processed_at.lock().unwrap() = Some(Utc::now());
    }

    pub fn record_error(&self, r#type: EventType) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.per_type.entry(r#type).or_default().error_count += 1;
    }

    pub fn throughput_per_sec(&self) -> f64 {
        let now = Instant::now();
        let mut window = self.dispatches.lock().unwrap();
        while window
            .front()
            .is_some_and(|at| now.duration_since(*at) > THROUGHPUT_WINDOW)
        {
            window.pop_front();
        }

        window.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64()
    }

    /// Health in [0,100], degraded by dispatch failure rate and queue
    /// backlog.
    pub fn health_score(&self, backlog: usize) -> f64 {
        let dispatched = self.total_dispatched.load(Ordering::Relaxed) as f64;
        let errors = self.total_errors.load(Ordering::Relaxed) as f64;

        let failure_rate = if dispatched + errors > 0.0 {
            errors / (dispatched + errors)
        } else {
            0.0
        };
        let backlog_penalty = ((backlog as f64 / 1_000.0) * 40.0).min(40.0);

        (100.0 - 60.0 * failure_rate - backlog_penalty).clamp(0.0, 100.0)
    }

    pub fn snapshot(
        &self,
        status: &'static str,
        pending: usize,
        history_size: usize,
    ) -> BusMetricsSnapshot {
        let per_type = self
            .per_type
            .iter()
            .map(|entry| {
                (
                    entry.key().as_str().to_string(),
                    TypeMetricsSnapshot {
                        count: entry.value().count,
                        error_count: entry.value().error_count,
                        avg_processing_time_ms: entry.value().avg_processing_ms.unwrap_or(0.0),
                    },
                )
            })
            .collect();

        BusMetricsSnapshot {
            status,
            pending_count: pending,
            history_size,
            total_emitted: self.total_emitted.load(Ordering::Relaxed),
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput_per_sec(),
            last_processed_at: *self.last_processed_at.lock().unwrap(),
            health_score: self.health_score(pending),
            per_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypeMetricsSnapshot {
    pub count: u64,
    pub error_count: u64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BusMetricsSnapshot {
    pub status: &'static str,
    pub pending_count: usize,
    pub history_size: usize,
    pub total_emitted: u64,
    pub total_dispatched: u64,
    pub total_errors: u64,
    pub throughput_per_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,
    pub health_score: f64,
    pub per_type: BTreeMap<String, TypeMetricsSnapshot>,
}
