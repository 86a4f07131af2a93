use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::models::transactions::QueuedTransaction;

/// Wraps a transaction for heap ordering: priority first, then earliest
/// `scheduled_at`, then admission order.
#[derive(Debug)]
struct PendingItem {
    transaction: QueuedTransaction,
    seq: u64,
}

impl PartialEq for PendingItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for PendingItem {}

impl PartialOrd for PendingItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.transaction
            .priority
            .score()
            .cmp(&other.transaction.priority.score())
            // earlier scheduled_at wins within a priority
            .then_with(|| other.transaction.scheduled_at.cmp(&self.transaction.scheduled_at))
            // admission order settles exact timestamp ties
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The pending partition. All mutations go through this struct (behind the
/// queue's mutex), which is what keeps retry re-admission race-free.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<PendingItem>,
    seq: u64,
}

impl PendingQueue {
    pub fn push(&mut self, transaction: QueuedTransaction) {
        let seq = self.seq;
        self.seq += 1;

        self.heap.push(PendingItem { transaction, seq });
    }

    /// Pops up to `max` items that are due at `now`. Items scheduled in the
    /// future (retry delays) are skipped over and stay pending, so a delayed
    /// critical item never blocks due lower-priority work.
    pub fn pop_due(&mut self, max: usize, now: DateTime<Utc>) -> Vec<QueuedTransaction> {
        let mut due = Vec::with_capacity(max);
        let mut deferred = Vec::new();

        while due.len() < max {
            let Some(item) = self.heap.pop() else {
                break;
            };

            if item.transaction.scheduled_at > now {
                deferred.push(item);
            } else {
                due.push(item.transaction);
            }
        }

        for item in deferred {
            self.heap.push(item);
        }

        due
    }

    /// Removes a pending item by id.
    pub fn remove(&mut self, id: &str) -> Option<QueuedTransaction> {
        let mut removed = None;

        self.heap.retain(|item| {
            if item.transaction.id == id && removed.is_none() {
                removed = Some(item.transaction.clone());
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn get(&self, id: &str) -> Option<QueuedTransaction> {
        self.heap
            .iter()
            .find(|item| item.transaction.id == id)
            .map(|item| item.transaction.clone())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
