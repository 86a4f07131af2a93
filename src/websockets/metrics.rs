use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use utoipa::ToSchema;

/// Counters for the connection hub. Connection/subscription/buffer totals
/// come from the owning maps at snapshot time; only the rates live here.
#[derive(Debug, Default)]
pub struct HubMetrics {
    events_processed: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    events_buffered: AtomicU64,
}

impl HubMetrics {
    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffered(&self) {
        self.events_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Health in [0,100], degraded by the send failure rate and by buffer
    /// pressure.
    pub fn health_score(&self, buffered_events: usize) -> f64 {
        let sent = self.messages_sent.load(Ordering::Relaxed) as f64;
        let failures = self.send_failures.load(Ordering::Relaxed) as f64;

        let failure_rate = if sent + failures > 0.0 {
            failures / (sent + failures)
        } else {
            0.0
        };
        let buffer_penalty = ((buffered_events as f64 / 1_000.0) * 20.0).min(20.0);

        (100.0 - 80.0 * failure_rate - buffer_penalty).clamp(0.0, 100.0)
    }

    pub fn snapshot(
        &self,
        connections: usize,
        authenticated: usize,
        subscriptions: usize,
        buffered_users: usize,
        buffered_events: usize,
    ) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            connection_count: connections,
            authenticated_count: authenticated,
            subscription_count: subscriptions,
            buffered_users,
            buffered_events,
            events_processed: self.events_processed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            events_buffered: self.events_buffered.load(Ordering::Relaxed),
            health_score: self.health_score(buffered_events),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubMetricsSnapshot {
    pub connection_count: usize,
    pub authenticated_count: usize,
    pub subscription_count: usize,
    pub buffered_users: usize,
    pub buffered_events: usize,
    pub events_processed: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub events_buffered: u64,
    pub health_score: f64,
}
