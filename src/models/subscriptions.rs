use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::events::{Event, EventType};
use crate::models::filters::SubscriptionFilter;

/// Delivery channels a subscription may name. Only `websocket` is wired to a
/// transport; the rest are accepted and ignored at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionChannel {
    Websocket,
    Webhook,
    Sse,
    Push,
}

/// A user's registered interest in a set of event types, optionally narrowed
/// by structured filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub event_types: HashSet<EventType>,
    pub channels: HashSet<SubscriptionChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<SubscriptionFilter>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(
        user_id: impl Into<String>,
        event_types: HashSet<EventType>,
        filters: Option<Vec<SubscriptionFilter>>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            event_types,
            channels: HashSet::from([SubscriptionChannel::Websocket]),
            filters,
            is_active: true,
            created_at: now,
            last_activity: Some(now),
        }
    }

    /// Whether this subscription should receive `event`. The user must own
    /// the event, the type must be subscribed, and every filter must pass.
    /// Events addressed to the `system` sentinel skip the ownership check for
    /// subscriptions listening to system alerts.
    pub fn matches_event(&self, event: &Event) -> bool {
        if !self.is_active || !self.event_types.contains(&event.r#type) {
            return false;
        }

        let user_match = if event.is_system() {
            self.event_types.contains(&EventType::SystemAlert)
        } else {
            self.user_id == event.user_id
        };
        if !user_match {
            return false;
        }

        match &self.filters {
            Some(filters) => filters.iter().all(|filter| filter.matches(event)),
            None => true,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    /// A subscription is stale once its last activity is further back than
    /// `threshold`. Never-active subscriptions fall back to their creation
    /// time.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        let reference = self.last_activity.unwrap_or(self.created_at);

        match (now - reference).to_std() {
            Ok(idle) => idle > threshold,
            Err(_) => false, // activity in the future, clock skew
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::events::SYSTEM_USER;
    use crate::models::filters::FilterOperator;

    fn subscription(user: &str, types: &[EventType]) -> Subscription {
        Subscription::new(user, types.iter().copied().collect(), None)
    }

    #[test]
    fn matches_on_user_type_and_active_flag() {
        let sub = subscription("u1", &[EventType::TransactionCompleted]);
        let event = Event::new(EventType::TransactionCompleted, "u1", json!({}));

        assert!(sub.matches_event(&event));

        let other_user = Event::new(EventType::TransactionCompleted, "u2", json!({}));
        assert!(!sub.matches_event(&other_user));

        let other_type = Event::new(EventType::BalanceUpdated, "u1", json!({}));
        assert!(!sub.matches_event(&other_type));

        let mut inactive = subscription("u1", &[EventType::TransactionCompleted]);
        inactive.is_active = false;
        assert!(!inactive.matches_event(&event));
    }

    #[test]
    fn system_events_broadcast_to_alert_listeners() {
        let listener = subscription("u1", &[EventType::SystemAlert]);
        let bystander = subscription("u2", &[EventType::TransactionCompleted]);
        let alert = Event::new(EventType::SystemAlert, SYSTEM_USER, json!({ "severity": "warn" }));

        assert!(listener.matches_event(&alert), "any alert listener gets system events");
        assert!(!bystander.matches_event(&alert));
    }

    #[test]
    fn all_filters_must_pass() {
        let filters = vec![
            SubscriptionFilter {
                field: "metadata.source".into(),
                operator: FilterOperator::Equals,
                value: json!("payroll"),
            },
            SubscriptionFilter {
                field: "data.amount".into(),
                operator: FilterOperator::GreaterThan,
                value: json!(10),
            },
        ];
        let sub = Subscription::new(
            "u1",
            HashSet::from([EventType::TransactionCompleted]),
            Some(filters),
        );

        let matching = Event::new(EventType::TransactionCompleted, "u1", json!({ "amount": 50 }))
            .with_source("payroll");
        assert!(sub.matches_event(&matching));

        let wrong_source = Event::new(EventType::TransactionCompleted, "u1", json!({ "amount": 50 }))
            .with_source("adhoc");
        assert!(!sub.matches_event(&wrong_source));
    }

    #[test]
    fn staleness_uses_last_activity() {
        let mut sub = subscription("u1", &[EventType::BalanceUpdated]);
        let now = Utc::now();

        assert!(!sub.is_stale(Duration::from_secs(3600), now));

        sub.last_activity = Some(now - chrono::TimeDelta::hours(2));
        assert!(sub.is_stale(Duration::from_secs(3600), now));
    }
}
