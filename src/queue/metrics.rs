use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use utoipa::ToSchema;

const EMA_ALPHA: f64 = 0.1;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5);

/// Running counters for the transaction queue. Counters are atomics; the
/// EMA and the throughput window sit behind short-lived mutexes that are
/// never held across an await.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    total_queued: AtomicU64,
    total_processing: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    avg_processing_ms: Mutex<Option<f64>>,
    completions: Mutex<VecDeque<Instant>>,
}

impl QueueMetrics {
    pub fn record_queued(&self) {
        self.total_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing(&self) {
        self.total_processing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self, elapsed: Duration) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);

        let sample = elapsed.as_secs_f64() * 1_000.0;
        let mut ema = self.avg_processing_ms.lock().unwrap();
        *ema = Some(match *ema {
            Some(prev) => (1.0 - EMA_ALPHA) * prev + EMA_ALPHA * sample,
            None => sample,
        });

        let mut window = self.completions.lock().unwrap();
        let now = Instant::now();
        window.push_back(now);
        while window
            .front()
            .is_some_and(|at| now.duration_since(*at) > THROUGHPUT_WINDOW)
        {
            window.pop_front();
        }
    }

    pub fn record_failure(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throughput_per_sec(&self) -> f64 {
        let mut window = self.completions.lock().unwrap();
        let now = Instant::now();
        while window
            .front()
            .is_some_and(|at| now.duration_since(*at) > THROUGHPUT_WINDOW)
        {
            window.pop_front();
        }

        window.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64()
    }

    /// Health in [0,100], degraded by the attempt-level error rate and by
    /// pending backlog depth. Consumers treat <60 as degraded, <40 as
    /// critical.
    pub fn health_score(&self, pending_depth: usize) -> f64 {
        let completed = self.total_completed.load(Ordering::Relaxed) as f64;
        let failed = self.total_failed.load(Ordering::Relaxed) as f64;

        let error_rate = if completed + failed > 0.0 {
            failed / (completed + failed)
        } else {
            0.0
        };
        let depth_penalty = ((pending_depth as f64 / 500.0) * 40.0).min(40.0);

        (100.0 - 60.0 * error_rate - depth_penalty).clamp(0.0, 100.0)
    }

    pub fn snapshot(
        &self,
        status: &'static str,
        pending: usize,
        processing: usize,
        completed: usize,
        dead_letter: usize,
    ) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            status,
            pending_count: pending,
            processing_count: processing,
            completed_count: completed,
            dead_letter_count: dead_letter,
            total_queued: self.total_queued.load(Ordering::Relaxed),
            total_processing: self.total_processing.load(Ordering::Relaxed),
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            avg_processing_time_ms: self.avg_processing_ms.lock().unwrap().unwrap_or(0.0),
            throughput_per_sec: self.throughput_per_sec(),
            health_score: self.health_score(pending),
        }
    }
}

/// Value-copy view of the queue's counters, safe to hand to the admin API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetricsSnapshot {
    pub status: &'static str,
    pub pending_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub dead_letter_count: usize,
    pub total_queued: u64,
    pub total_processing: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub avg_processing_time_ms: f64,
    pub throughput_per_sec: f64,
    pub health_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_starts_at_first_sample() {
        let metrics = QueueMetrics::default();
        metrics.record_completion(Duration::from_millis(100));

        let snapshot = metrics.snapshot("running", 0, 0, 1, 0);
        assert!((snapshot.avg_processing_time_ms - 100.0).abs() < 1e-6);
    }

    #[test]
    fn ema_smooths_later_samples() {
        let metrics = QueueMetrics::default();
        metrics.record_completion(Duration::from_millis(100));
        metrics.record_completion(Duration::from_millis(200));

        // 0.9 * 100 + 0.1 * 200
        let snapshot = metrics.snapshot("running", 0, 0, 2, 0);
        assert!((snapshot.avg_processing_time_ms - 110.0).abs() < 1e-6);
    }

    #[test]
    fn health_degrades_with_failures_and_depth() {
        let metrics = QueueMetrics::default();
        assert!((metrics.health_score(0) - 100.0).abs() < f64::EPSILON);

        metrics.record_completion(Duration::from_millis(5));
        metrics.record_failure();
        let with_errors = metrics.health_score(0);
        assert!(with_errors < 100.0);

        let with_backlog = metrics.health_score(10_000);
        assert!(with_backlog < with_errors, "deep backlog must cost health");
    }
}
