// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The wake-time queue (spec section 5, "Concurrency & Resource Model"):
//! orders connection contexts by the earliest deadline among their next
//! retransmit, pacing slot, PTO, or idle timeout.
//!
//! A `BinaryHeap` gives a "pop the smallest deadline" operation in
//! `O(log n)` rather than a linear scan over all pending connections.

use alloc::collections::BinaryHeap;
use core::cmp::Ordering;
use quic_core::time::Timestamp;

/// A connection handle paired with the deadline it should next be polled at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Entry<H> {
    deadline: Timestamp,
    handle: H,
}

// `BinaryHeap` is a max-heap; reverse the comparison so the earliest
// deadline sorts to the top.
impl<H: Eq> Ord for Entry<H> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl<H: Eq> PartialOrd for Entry<H> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of connection handles ordered by wake deadline.
pub struct WakeupQueue<H: Eq> {
    heap: BinaryHeap<Entry<H>>,
}

impl<H: Eq> Default for WakeupQueue<H> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<H: Eq> WakeupQueue<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules (or reschedules) `handle` to be polled at `deadline`. A
    /// connection may appear more than once; only the earliest entry still
    /// pending is meaningful, so callers should treat `pop` results for an
    /// already-rearmed handle as stale and re-check the connection's actual
    /// deadline before acting.
    pub fn schedule(&mut self, handle: H, deadline: Timestamp) {
        self.heap.push(Entry { deadline, handle });
    }

    /// The smallest deadline currently queued, without removing it.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Pops the handle with the earliest deadline.
    pub fn pop(&mut self) -> Option<(H, Timestamp)> {
        self.heap.pop().map(|entry| (entry.handle, entry.deadline))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::time::{Clock, NoopClock};
    use core::time::Duration;

    #[test]
    fn pops_in_deadline_order_not_insertion_order() {
        let mut queue: WakeupQueue<u32> = WakeupQueue::new();
        let now = NoopClock.get_time();

        queue.schedule(1, now + Duration::from_millis(300));
        queue.schedule(2, now + Duration::from_millis(100));
        queue.schedule(3, now + Duration::from_millis(200));

        assert_eq!(queue.pop().map(|(h, _)| h), Some(2));
        assert_eq!(queue.pop().map(|(h, _)| h), Some(3));
        assert_eq!(queue.pop().map(|(h, _)| h), Some(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn next_deadline_peeks_without_removing() {
        let mut queue: WakeupQueue<u32> = WakeupQueue::new();
        let now = NoopClock.get_time();
        queue.schedule(1, now);
        assert_eq!(queue.next_deadline(), Some(now));
        assert_eq!(queue.len(), 1);
    }
}
