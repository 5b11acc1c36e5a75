//! Deterministic millisecond timer queue.
//!
//! The queue uses **event delivery** rather than stored callbacks: [`TimerQueue::pop_due`] hands
//! back a [`TimerEvent`] carrying the payload and the [`TimerId`] it was scheduled under, and the
//! caller routes it to the owning device. Cancelling an id guarantees it is never delivered.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A timer that came due.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerEvent<T> {
    pub id: TimerId,
    pub deadline_ms: u64,
    pub payload: T,
}

#[derive(Debug)]
struct Pending<T> {
    deadline_ms: u64,
    id: TimerId,
    payload: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ms == other.deadline_ms && self.id == other.id
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    // Ties on the deadline fire in scheduling order; ids are allocated monotonically.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline_ms, self.id).cmp(&(other.deadline_ms, other.id))
    }
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    heap: BinaryHeap<Reverse<Pending<T>>>,
    live: HashSet<TimerId>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            heap: BinaryHeap::new(),
            live: HashSet::new(),
        }
    }

    pub fn schedule(&mut self, deadline_ms: u64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Reverse(Pending {
            deadline_ms,
            id,
            payload,
        }));
        id
    }

    /// Cancels `id`. Returns `false` if the timer already fired or was never scheduled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.live.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest deadline among timers that are still live.
    pub fn next_deadline_ms(&mut self) -> Option<u64> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(p)| p.deadline_ms)
    }

    /// Removes and returns the earliest live timer whose deadline is `<= now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerEvent<T>> {
        self.discard_cancelled();
        if self.heap.peek()?.0.deadline_ms > now_ms {
            return None;
        }
        let Reverse(pending) = self.heap.pop()?;
        self.live.remove(&pending.id);
        Some(TimerEvent {
            id: pending.id,
            deadline_ms: pending.deadline_ms,
            payload: pending.payload,
        })
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.live.contains(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_deadline_then_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(20, "b");
        q.schedule(10, "a");
        q.schedule(20, "c");

        assert_eq!(q.pop_due(5), None);
        let fired: Vec<_> = std::iter::from_fn(|| q.pop_due(20))
            .map(|e| e.payload)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut q = TimerQueue::new();
        let id = q.schedule(10, 1u8);
        q.schedule(30, 2u8);
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert_eq!(q.next_deadline_ms(), Some(30));
        assert_eq!(q.pop_due(100).map(|e| e.payload), Some(2));
        assert_eq!(q.pop_due(100), None);
    }

    #[test]
    fn fired_timer_is_no_longer_pending() {
        let mut q = TimerQueue::new();
        let id = q.schedule(1, ());
        assert!(q.is_pending(id));
        let ev = q.pop_due(1).unwrap();
        assert_eq!(ev.id, id);
        assert!(!q.is_pending(id));
        assert!(!q.cancel(id));
    }
}
