use serde::Serialize;
use utoipa::ToSchema;

use crate::bus::metrics::BusMetricsSnapshot;
use crate::queue::metrics::QueueMetricsSnapshot;
use crate::websockets::metrics::HubMetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SystemGrade {
    Healthy,
    Degraded,
    Critical,
}

impl SystemGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Healthy
        } else if score >= 60.0 {
            Self::Degraded
        } else {
            Self::Critical
        }
    }
}

/// Composite health: weighted blend of the three components' scores.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: SystemGrade,
    pub score: f64,
    pub queue: QueueMetricsSnapshot,
    pub events: BusMetricsSnapshot,
    pub websocket: HubMetricsSnapshot,
}

impl HealthResponse {
    pub fn from_snapshots(
        queue: QueueMetricsSnapshot,
        events: BusMetricsSnapshot,
        websocket: HubMetricsSnapshot,
    ) -> Self {
        let score = 0.4 * queue.health_score
            + 0.3 * events.health_score
            + 0.3 * websocket.health_score;

        Self {
            status: SystemGrade::from_score(score),
            score,
            queue,
            events,
            websocket,
        }
    }
}
