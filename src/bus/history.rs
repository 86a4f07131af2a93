use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::events::{Event, EventPriority, EventType};

/// Parameters for a history scan. Every field is optional; an empty query
/// returns the most recent `DEFAULT_LIMIT` events.
#[derive(Debug, Clone, Default)]
pub struct EventHistoryQuery {
    pub event_types: Option<Vec<EventType>>,
    pub user_ids: Option<Vec<String>>,
    pub priorities: Option<Vec<EventPriority>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    pub limit: Option<usize>,
}

pub const DEFAULT_LIMIT: usize = 100;

/// Bounded-by-age record of every emitted event, keyed by event id. Expired
/// events live here too until the age sweep takes them.
#[derive(Debug, Default)]
pub struct EventHistory {
    entries: DashMap<Uuid, Event>,
}

impl EventHistory {
    pub fn insert(&self, event: Event) {
        self.entries.insert(event.id, event);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    /// Drops entries older than `cutoff`. Returns how many were evicted.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, event| event.timestamp >= cutoff);

        before.saturating_sub(self.entries.len())
    }

    /// Scans under read protection and returns matches in descending
    /// timestamp order.
    pub fn query(&self, query: &EventHistoryQuery) -> Vec<Event> {
        let mut matches: Vec<Event> = self
            .entries
            .iter()
            .filter(|entry| Self::matches(entry.value(), query))
            .map(|entry| entry.value().clone())
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(query.limit.unwrap_or(DEFAULT_LIMIT));

        matches
    }

    fn matches(event: &Event, query: &EventHistoryQuery) -> bool {
        if let Some(types) = &query.event_types
            && !types.contains(&event.r#type)
        {
            return false;
        }
        if let Some(users) = &query.user_ids
            && !users.contains(&event.user_id)
        {
            return false;
        }
        if let Some(priorities) = &query.priorities
            && !priorities.contains(&event.metadata.priority)
        {
            return false;
        }
        if let Some(start) = query.start_time
            && event.timestamp < start
        {
            return false;
        }
        if let Some(end) = query.end_time
            && event.timestamp > end
        {
            return false;
        }
        if let Some(source) = &query.source
            && event.metadata.source != *source
        {
            return false;
        }
        if let Some(wanted) = &query.tags {
            let Some(tags) = &event.metadata.tags else {
                return false;
            };
            if !wanted.iter().all(|tag| tags.contains(tag)) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    fn stored(history: &EventHistory, r#type: EventType, user: &str, source: &str) -> Event {
        let event = Event::new(r#type, user, json!({})).with_source(source);
        history.insert(event.clone());
        event
    }

    #[test]
    fn query_filters_compose() {
        let history = EventHistory::default();
        let hit = stored(&history, EventType::BalanceUpdated, "u1", "ledger");
        stored(&history, EventType::BalanceUpdated, "u2", "ledger");
        stored(&history, EventType::SystemAlert, "u1", "ledger");
        stored(&history, EventType::BalanceUpdated, "u1", "adhoc");

        let results = history.query(&EventHistoryQuery {
            event_types: Some(vec![EventType::BalanceUpdated]),
            user_ids: Some(vec!["u1".to_string()]),
            source: Some("ledger".to_string()),
            ..Default::default()
        });

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit.id);
    }

    #[test]
    fn results_come_newest_first_and_respect_limit() {
        let history = EventHistory::default();
        let mut old = Event::new(EventType::SystemAlert, "u1", json!({}));
        old.timestamp = Utc::now() - TimeDelta::minutes(10);
        history.insert(old.clone());
        let fresh = stored(&history, EventType::SystemAlert, "u1", "remit");

        let results = history.query(&EventHistoryQuery::default());
        assert_eq!(results[0].id, fresh.id);
        assert_eq!(results[1].id, old.id);

        let limited = history.query(&EventHistoryQuery {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, fresh.id);
    }

    #[test]
    fn age_eviction_drops_only_stale_entries() {
        let history = EventHistory::default();
        let mut stale = Event::new(EventType::BalanceUpdated, "u1", json!({}));
        stale.timestamp = Utc::now() - TimeDelta::hours(25);
        history.insert(stale.clone());
        let fresh = stored(&history, EventType::BalanceUpdated, "u1", "ledger");

        let evicted = history.evict_older_than(Utc::now() - TimeDelta::hours(24));

        assert_eq!(evicted, 1);
        assert!(!history.contains(&stale.id));
        assert!(history.contains(&fresh.id));
    }
}
