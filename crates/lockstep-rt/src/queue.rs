// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Continuation queues.
//!
//! Unbounded FIFO: any thread may push, only the thread inside `resume`
//! pops. The scheduler keeps two of these, explicit (yield) and implicit
//! (posted work and marshals).

use crossbeam::queue::SegQueue;
use lockstep_sync::ContinuationItem;

pub(crate) struct ContinuationQueue {
    items: SegQueue<ContinuationItem>,
    label: &'static str,
}

impl ContinuationQueue {
    pub fn new(label: &'static str) -> Self {
        Self {
            items: SegQueue::new(),
            label,
        }
    }

    pub fn push(&self, item: ContinuationItem) {
        self.items.push(item);
        log::trace!("{} queue: push ({} pending)", self.label, self.items.len());
    }

    /// Pop one item from the front.
    pub fn pop(&self) -> Option<ContinuationItem> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
