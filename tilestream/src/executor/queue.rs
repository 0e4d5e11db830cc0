//! FIFO work queue drained against a wall-clock budget.
//!
//! Work that may be expensive (decoding tiles, handing visualizations to the
//! renderer) is queued and drained in bounded slices, so the host regains
//! control between ticks.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tilestream::executor::{BudgetedQueue, Deadline};
//!
//! let mut queue = BudgetedQueue::new(Duration::from_millis(10));
//! queue.push(frame);
//!
//! let deadline = Deadline::start(queue.budget());
//! while let Some(frame) = queue.next_within(&deadline) {
//!     decode(frame);
//! }
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A wall-clock cutoff for one drain.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts the clock.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Whether more than the budget has elapsed.
    ///
    /// Checked before each item, so the first item of a drain always runs.
    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Items processed.
    pub processed: usize,
    /// Items left for the next tick.
    pub remaining: usize,
}

/// FIFO queue with a per-drain time budget.
#[derive(Debug)]
pub struct BudgetedQueue<T> {
    items: VecDeque<T>,
    budget: Duration,
}

impl<T> BudgetedQueue<T> {
    pub fn new(budget: Duration) -> Self {
        Self {
            items: VecDeque::new(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Pops the oldest item unless `deadline` expired.
    pub fn next_within(&mut self, deadline: &Deadline) -> Option<T> {
        if deadline.expired() {
            return None;
        }
        self.items.pop_front()
    }

    /// Processes items in order until empty or out of budget.
    pub fn drain_within<F>(&mut self, mut process: F) -> DrainReport
    where
        F: FnMut(T),
    {
        let deadline = Deadline::start(self.budget);
        let mut processed = 0;
        while let Some(item) = self.next_within(&deadline) {
            process(item);
            processed += 1;
        }
        DrainReport {
            processed,
            remaining: self.items.len(),
        }
    }

    /// Keeps only the items for which `keep` returns true.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.items.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Delay before the next tick: immediately while work remains, otherwise
/// `idle`.
pub fn next_delay(backlog: bool, idle: Duration) -> Duration {
    if backlog {
        Duration::ZERO
    } else {
        idle
    }
}
