// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution environment bound to a scheduler.
//!
//! `send` runs a callback inline, always. `post` runs it inline when the
//! caller is the thread currently inside `resume`, and otherwise defers it
//! to the scheduler's implicit queue for the next `resume`. The dispatcher
//! holds no queue of its own.
//!
//! The dispatcher is installed as this thread's current environment for the
//! whole of every `resume` and every poll of a spawned coroutine.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use lockstep_sync::ContinuationItem;

use crate::scheduler::Shared;

thread_local! {
    static CURRENT: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };
}

#[derive(Clone)]
pub struct Dispatcher {
    shared: Weak<Shared>,
}

impl Dispatcher {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// The environment installed on this thread, if any.
    pub fn current() -> Option<Dispatcher> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Run `f` now, on this thread.
    pub fn send<F: FnOnce()>(&self, f: F) {
        f();
    }

    /// Run `f` now if this is the resuming thread, else at the next
    /// `resume`. The ambient context is captured for the deferred case.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(shared) = self.shared.upgrade() else {
            log::warn!("post to a dropped scheduler; callback discarded");
            return;
        };
        let item = ContinuationItem::capture(Box::new(f), &*shared.context);
        shared.post(item);
    }

    /// Post without snapshotting ambient context.
    pub(crate) fn post_item(&self, item: ContinuationItem) {
        match self.shared.upgrade() {
            Some(shared) => shared.post(item),
            None => log::warn!("post to a dropped scheduler; continuation discarded"),
        }
    }

    pub(crate) fn shared(&self) -> Option<Arc<Shared>> {
        self.shared.upgrade()
    }

    /// Make this the current environment until the guard drops.
    pub(crate) fn install(&self) -> EnvGuard {
        let prev = CURRENT.with(|current| current.replace(Some(self.clone())));
        EnvGuard { prev }
    }

    /// True when both dispatchers drive the same scheduler.
    pub fn same_scheduler(&self, other: &Dispatcher) -> bool {
        Weak::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.shared.upgrade().map(|s| s.name.clone());
        f.debug_struct("Dispatcher").field("scheduler", &name).finish()
    }
}

/// Restores the previous environment on drop, unwinding included.
pub(crate) struct EnvGuard {
    prev: Option<Dispatcher>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let replaced = CURRENT.with(|current| current.replace(prev));
        drop(replaced);
    }
}
