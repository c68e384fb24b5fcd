//! Sequential work queues and progress events.
//!
//! Allocation, price checks and resource confirmation all walk a list of
//! items strictly one at a time and report "N of Total" as they go. A
//! [`SequentialQueue`] makes that contract explicit: it hands out the next item
//! only once the previous one has been marked complete, and every item comes
//! wrapped in a [`ProgressEvent`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// One step of a sequential loop
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent<T> {
    /// 1-based position of this item
    pub current: usize,
    /// Number of items in the loop
    pub total: usize,
    /// The item being processed
    pub item: T,
}

impl<T> ProgressEvent<T> {
    /// Whether this is the final item of the loop
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.current == self.total
    }

    /// Map the carried item, keeping the position
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProgressEvent<U> {
        ProgressEvent {
            current: self.current,
            total: self.total,
            item: f(self.item),
        }
    }
}

impl<T> fmt::Display for ProgressEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.current, self.total)
    }
}

/// A queue that releases its items one at a time
///
/// `advance` returns `None` while an item is in flight, so a caller cannot
/// start item *k+1* before item *k* has been reported through
/// [`SequentialQueue::complete_current`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialQueue<T> {
    pending: VecDeque<T>,
    total: usize,
    started: usize,
    completed: usize,
}

impl<T> Default for SequentialQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            total: 0,
            started: 0,
            completed: 0,
        }
    }
}

impl<T> SequentialQueue<T> {
    /// Create a queue over the given items, in order
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let pending: VecDeque<T> = items.into_iter().collect();
        Self {
            total: pending.len(),
            pending,
            started: 0,
            completed: 0,
        }
    }

    /// Number of items the queue was created with
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Number of items handed out so far
    #[must_use]
    pub const fn started(&self) -> usize {
        self.started
    }

    /// Number of items reported complete
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.completed
    }

    /// Number of items not yet handed out
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Whether an item has been handed out but not completed
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.started > self.completed
    }

    /// Whether every item has been handed out and completed
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && !self.in_flight()
    }

    /// Hand out the next item, unless one is still in flight
    pub fn advance(&mut self) -> Option<ProgressEvent<T>> {
        if self.in_flight() {
            return None;
        }
        let item = self.pending.pop_front()?;
        self.started += 1;
        Some(ProgressEvent {
            current: self.started,
            total: self.total,
            item,
        })
    }

    /// Report the in-flight item as done (successfully or not)
    ///
    /// Returns `false` if nothing was in flight.
    pub fn complete_current(&mut self) -> bool {
        if self.in_flight() {
            self.completed += 1;
            true
        } else {
            false
        }
    }
}

impl<T> Iterator for SequentialQueue<T> {
    type Item = ProgressEvent<T>;

    /// Hands out the next item and immediately marks it complete
    ///
    /// Convenient for synchronous consumers that process each item before
    /// asking for the next one.
    fn next(&mut self) -> Option<Self::Item> {
        let event = self.advance()?;
        self.complete_current();
        Some(event)
    }
}
