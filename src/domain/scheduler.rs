use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::domain::events::SimEvent;

/// Handle of a scheduled wakeup, used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

#[derive(Debug, Clone)]
struct Scheduled {
    time: f64,
    seq: u64,
    id: EventId,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties at equal time break FIFO on the insertion counter, which is
        // what makes a run replayable.
        self.time.total_cmp(&other.time).then_with(|| self.seq.cmp(&other.seq))
    }
}

/// The logical clock plus the priority queue of pending wakeups.
///
/// Cancellation is modeled by marking an id stale; the entry stays in the
/// heap and is discarded on pop. The clock itself is advanced by the engine
/// when it processes a popped wakeup, never here.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    next_id: u64,
    stale: HashSet<EventId>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    /// Schedules `event` at absolute time `time` and returns its handle.
    pub fn schedule_at(&mut self, time: f64, event: SimEvent) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { time, seq, id, event }));
        id
    }

    /// Marks a wakeup stale. Unknown ids are ignored: the wakeup may already
    /// have fired.
    pub fn cancel(&mut self, id: EventId) {
        self.stale.insert(id);
    }

    /// Pops the earliest non-stale wakeup.
    pub fn pop(&mut self) -> Option<(f64, SimEvent)> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if self.stale.remove(&entry.id) {
                continue;
            }
            return Some((entry.time, entry.event));
        }
        None
    }

    /// Earliest pending wakeup time, ignoring stale entries.
    pub fn peek_time(&mut self) -> Option<f64> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if self.stale.contains(&entry.id) {
                let id = entry.id;
                self.heap.pop();
                self.stale.remove(&id);
                continue;
            }
            return Some(entry.time);
        }
        None
    }

    pub fn is_empty(&mut self) -> bool {
        self.peek_time().is_none()
    }
}
