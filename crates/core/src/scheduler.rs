//! Deterministic delayed-task queue.
//!
//! The session never sleeps. It schedules events on a [`Scheduler`] with a
//! delay relative to the queue's virtual clock, and whoever drives the session
//! advances that clock: tests by hand, the runtime from `tokio::time`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle to a scheduled task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Entry<E> {
    due: Duration,
    id: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.id) == (other.due, other.id)
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.id).cmp(&(other.due, other.id))
    }
}

/// A min-queue of events keyed by virtual due time.
///
/// Events due at the same instant fire in the order they were scheduled.
#[derive(Debug)]
pub struct Scheduler<E> {
    now: Duration,
    next_id: u64,
    queue: BinaryHeap<Reverse<Entry<E>>>,
    cancelled: HashSet<u64>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
        }
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Queues `event` to fire once `delay` has elapsed from now.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse(Entry {
            due: self.now + delay,
            id,
            event,
        }));
        TaskId(id)
    }

    /// Cancels a pending task. Cancelling a fired or unknown task is a no-op.
    pub fn cancel(&mut self, task: TaskId) {
        if self.queue.iter().any(|Reverse(e)| e.id == task.0) {
            self.cancelled.insert(task.0);
        }
    }

    /// Drops every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.cancelled.clear();
    }

    /// Time until the earliest live task is due, `Duration::ZERO` if it is
    /// already overdue, or `None` when nothing is pending.
    pub fn next_due_in(&mut self) -> Option<Duration> {
        self.discard_cancelled_head();
        self.queue
            .peek()
            .map(|Reverse(e)| e.due.saturating_sub(self.now))
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_due_in().is_none()
    }

    /// Advances virtual time by `by`. Due events are then drained with
    /// [`Scheduler::pop_due`].
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Removes and returns the earliest event due at or before now.
    ///
    /// Time does not move while draining, so events scheduled by a handler
    /// with a zero delay are also returned in the same drain.
    pub fn pop_due(&mut self) -> Option<E> {
        self.discard_cancelled_head();
        if self.queue.peek().is_some_and(|Reverse(e)| e.due <= self.now) {
            self.queue.pop().map(|Reverse(e)| e.event)
        } else {
            None
        }
    }

    fn discard_cancelled_head(&mut self) {
        while let Some(Reverse(head)) = self.queue.peek() {
            if self.cancelled.remove(&head.id) {
                self.queue.pop();
            } else {
                break;
            }
        }
    }
}
