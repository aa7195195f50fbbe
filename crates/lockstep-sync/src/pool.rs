// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Registered waiters and their free list.
//!
//! A waiter is armed when a wait registers, fired exactly once by whichever
//! of notify or cancel claims `completed` first, then reset and returned to
//! the pool. Each arming bumps `epoch`, so a cancel callback left over from
//! an earlier arming can tell it is stale.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;

use crate::cancel::CancelRegistration;
use crate::continuation::ContinuationItem;

pub(crate) struct Waiter {
    completed: AtomicBool,
    epoch: AtomicU64,
    slot: Mutex<WaiterSlot>,
}

#[derive(Default)]
struct WaiterSlot {
    item: Option<ContinuationItem>,
    registration: Option<CancelRegistration>,
    cancelled: Option<Arc<AtomicBool>>,
}

/// What a firing path takes out of a claimed waiter.
pub(crate) struct Fired {
    pub item: Option<ContinuationItem>,
    pub registration: Option<CancelRegistration>,
    pub cancelled: Option<Arc<AtomicBool>>,
}

impl Waiter {
    fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            slot: Mutex::new(WaiterSlot::default()),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Load a continuation for a new registration. Returns the new epoch.
    pub fn arm(&self, item: ContinuationItem, cancelled: Option<Arc<AtomicBool>>) -> u64 {
        let mut slot = self.slot.lock();
        slot.item = Some(item);
        slot.cancelled = cancelled;
        self.completed.store(false, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Claim the right to fire. True for exactly one caller per arming.
    pub fn claim(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    /// Store the cancel registration, unless the waiter already fired or
    /// was re-armed; then the registration is handed back for disposal.
    pub fn attach(&self, epoch: u64, registration: CancelRegistration) -> Option<CancelRegistration> {
        let mut slot = self.slot.lock();
        // `claim` runs before the firing path takes this lock, so either we
        // see `completed` here or the firing path sees the registration.
        if self.epoch() != epoch || self.completed.load(Ordering::Acquire) {
            return Some(registration);
        }
        slot.registration = Some(registration);
        None
    }

    /// Empty the slot after a successful `claim`.
    pub fn take(&self) -> Fired {
        let mut slot = self.slot.lock();
        Fired {
            item: slot.item.take(),
            registration: slot.registration.take(),
            cancelled: slot.cancelled.take(),
        }
    }
}

/// Bounded lock-free free list. Steady-state waits reuse waiters instead
/// of allocating; overflow is simply dropped.
pub(crate) struct WaiterPool {
    free: ArrayQueue<Arc<Waiter>>,
}

impl WaiterPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn acquire(&self) -> Arc<Waiter> {
        self.free.pop().unwrap_or_else(|| Arc::new(Waiter::new()))
    }

    /// Return a fired (or never armed) waiter.
    pub fn release(&self, waiter: Arc<Waiter>) {
        {
            let mut slot = waiter.slot.lock();
            *slot = WaiterSlot::default();
        }
        let _ = self.free.push(waiter);
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ContinuationItem {
        ContinuationItem::bare(Box::new(|| {}))
    }

    #[test]
    fn claim_is_exactly_once_per_arming() {
        let waiter = Waiter::new();
        let first = waiter.arm(item(), None);
        assert!(waiter.claim());
        assert!(!waiter.claim());
        let second = waiter.arm(item(), None);
        assert_eq!(second, first + 1);
        assert!(waiter.claim());
    }

    #[test]
    fn pool_reuses_released_waiters() {
        let pool = WaiterPool::new(4);
        let w = pool.acquire();
        let ptr = Arc::as_ptr(&w);
        pool.release(w);
        assert_eq!(pool.idle(), 1);
        let again = pool.acquire();
        assert_eq!(Arc::as_ptr(&again), ptr);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_drops_overflow() {
        let pool = WaiterPool::new(1);
        pool.release(Arc::new(Waiter::new()));
        pool.release(Arc::new(Waiter::new()));
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn release_clears_slot() {
        let pool = WaiterPool::new(2);
        let w = pool.acquire();
        w.arm(item(), Some(Arc::new(AtomicBool::new(false))));
        pool.release(w);
        let w = pool.acquire();
        let fired = w.take();
        assert!(fired.item.is_none());
        assert!(fired.cancelled.is_none());
    }
}
