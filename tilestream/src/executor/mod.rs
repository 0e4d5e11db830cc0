//! Cooperative, time-budgeted work queues.
//!
//! The engine runs on a single thread. Expensive work is queued and drained
//! in slices bounded by a [`Deadline`]; after each slice the host gets
//! control back and schedules the next tick after [`next_delay`].

mod queue;

pub use queue::{next_delay, BudgetedQueue, Deadline, DrainReport};
