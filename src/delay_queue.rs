//! Time-ordered queue of pending expirations.
//!
//! Any shard may enqueue concurrently; a single consumer blocks in
//! [`DelayQueue::dequeue`] until the earliest entry is due or the queue is
//! closed. Entries are never cancelled: consumers revalidate what they pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::clock::{span, Clock};

struct Delayed<K> {
    due: i64,
    seq: u64,
    key: K,
}

// Reversed so the std max-heap pops the earliest due first, FIFO among equals.
impl<K> Ord for Delayed<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<K> PartialOrd for Delayed<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> PartialEq for Delayed<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<K> Eq for Delayed<K> {}

struct State<K> {
    heap: BinaryHeap<Delayed<K>>,
    seq: u64,
    closed: bool,
}

impl<K> State<K> {
    fn pop_due(&mut self, now: i64) -> Option<(K, i64)> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|d| (d.key, d.due))
    }
}

/// A blocking delay queue keyed by absolute clock ticks.
pub struct DelayQueue<K> {
    state: Mutex<State<K>>,
    ready: Condvar,
    clock: Arc<dyn Clock>,
}

impl<K> DelayQueue<K> {
    /// Create an empty queue reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                seq: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            clock,
        }
    }

    /// Current time in the queue's unit.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Schedule `key` to be released at `due`.
    ///
    /// Returns `false` and drops the key if the queue is closed.
    pub fn enqueue(&self, key: K, due: i64) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let seq = state.seq;
        state.seq = state.seq.wrapping_add(1);
        let earliest = state.heap.peek().map_or(true, |head| due < head.due);
        state.heap.push(Delayed { due, seq, key });
        drop(state);

        // Only a new head can shorten the consumer's sleep.
        if earliest {
            self.ready.notify_one();
        }
        true
    }

    /// Block until the earliest entry is due and return it.
    ///
    /// Returns `None` once the queue has been closed.
    pub fn dequeue(&self) -> Option<(K, i64)> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            let now = self.clock.now();
            if let Some(ready) = state.pop_due(now) {
                return Some(ready);
            }
            match state.heap.peek().map(|head| head.due) {
                Some(due) => {
                    let wait = self.park_time(due - now);
                    self.ready.wait_for(&mut state, wait);
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    /// Pop the earliest entry if it is already due, without blocking.
    pub fn try_dequeue(&self) -> Option<(K, i64)> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let now = self.clock.now();
        state.pop_due(now)
    }

    /// Close the queue and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.heap.clear();
        drop(state);
        self.ready.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending entries, stale ones included.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn park_time(&self, ticks: i64) -> Duration {
        let wait = span(self.clock.unit(), ticks.max(1));
        match self.clock.poll_interval() {
            Some(limit) => wait.min(limit),
            None => wait,
        }
    }
}

impl<K> fmt::Debug for DelayQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DelayQueue")
            .field("pending", &state.heap.len())
            .field("closed", &state.closed)
            .finish()
    }
}
