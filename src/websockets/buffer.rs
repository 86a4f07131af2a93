use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::events::Event;

#[derive(Debug, Clone)]
struct BufferedEvent {
    event: Event,
    buffered_at: DateTime<Utc>,
}

/// Bounded FIFO of events waiting for a user to come back online. Overflow
/// drops from the head so the newest events survive.
#[derive(Debug, Default)]
pub struct OfflineBuffer {
    entries: VecDeque<BufferedEvent>,
}

impl OfflineBuffer {
    pub fn push(&mut self, event: Event, capacity: usize) {
        while self.entries.len() >= capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(BufferedEvent {
            event,
            buffered_at: Utc::now(),
        });
    }

    /// Takes everything, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        self.entries.drain(..).map(|entry| entry.event).collect()
    }

    /// Drops entries buffered longer than `ttl` ago.
    pub fn prune(&mut self, ttl: Duration, now: DateTime<Utc>) {
        self.entries.retain(|entry| {
            (now - entry.buffered_at)
                .to_std()
                .is_ok_and(|age| age <= ttl)
                || now < entry.buffered_at
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::events::EventType;

    fn event(marker: u64) -> Event {
        Event::new(EventType::BalanceUpdated, "u1", json!({ "marker": marker }))
    }

    #[test]
    fn overflow_evicts_the_oldest() {
        let mut buffer = OfflineBuffer::default();
        for i in 0..101 {
            buffer.push(event(i), 100);
        }

        assert_eq!(buffer.len(), 100);
        let drained = buffer.drain();
        assert_eq!(drained[0].data["marker"], json!(1), "event 0 must be gone");
        assert_eq!(drained[99].data["marker"], json!(100));
    }

    #[test]
    fn drain_preserves_enqueue_order() {
        let mut buffer = OfflineBuffer::default();
        for i in 0..5 {
            buffer.push(event(i), 100);
        }

        let markers: Vec<u64> = buffer
            .drain()
            .iter()
            .map(|e| e.data["marker"].as_u64().unwrap())
            .collect();
        assert_eq!(markers, vec![0, 1, 2, 3, 4]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn prune_drops_aged_entries() {
        let mut buffer = OfflineBuffer::default();
        buffer.push(event(0), 100);
        buffer.push(event(1), 100);

        buffer.prune(Duration::from_secs(60), Utc::now());
        assert_eq!(buffer.len(), 2, "fresh entries survive");

        buffer.prune(Duration::from_secs(0), Utc::now() + chrono::TimeDelta::seconds(5));
        assert!(buffer.is_empty(), "aged entries go");
    }
}
