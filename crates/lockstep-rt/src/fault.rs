// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Unhandled coroutine faults.
//!
//! When a spawned body fails, the scheduler builds an [`UnhandledFault`],
//! lets every observer inspect and adjust it, then resolves the completion
//! handle and finally re-raises, in that order, according to the two flags.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TaskError;

/// Fault record handed to observers. Both flags default to true: the error
/// reaches the completion handle and is re-raised synchronously.
#[derive(Debug, Clone)]
pub struct UnhandledFault {
    pub cause: TaskError,
    /// Re-raise out of `spawn_task`/`resume`.
    pub rethrow_synchronously: bool,
    /// Resolve the completion handle with the error instead of success.
    pub rethrow_in_completion: bool,
}

impl UnhandledFault {
    pub fn new(cause: TaskError) -> Self {
        Self {
            cause,
            rethrow_synchronously: true,
            rethrow_in_completion: true,
        }
    }

    /// Mark the fault handled: no re-raise, completion resolves `Ok`.
    pub fn suppress(&mut self) {
        self.rethrow_synchronously = false;
        self.rethrow_in_completion = false;
    }
}

pub type FaultObserver = Arc<dyn Fn(&mut UnhandledFault) + Send + Sync + 'static>;

/// Identifies a registered observer for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Observer list. Called in registration order, outside the lock, so an
/// observer may add or remove observers.
#[derive(Default)]
pub(crate) struct FaultObservers {
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, FaultObserver)>>,
}

impl FaultObservers {
    pub fn add(&self, observer: FaultObserver) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn notify(&self, fault: &mut UnhandledFault) {
        let snapshot: Vec<FaultObserver> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in snapshot {
            observer(fault);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault() -> UnhandledFault {
        UnhandledFault::new(TaskError::Panicked("x".into()))
    }

    #[test]
    fn defaults_rethrow_both_ways() {
        let f = fault();
        assert!(f.rethrow_synchronously);
        assert!(f.rethrow_in_completion);
    }

    #[test]
    fn observers_run_in_order_and_can_mutate() {
        let observers = FaultObservers::default();
        observers.add(Arc::new(|f: &mut UnhandledFault| {
            f.rethrow_synchronously = false;
        }));
        observers.add(Arc::new(|f: &mut UnhandledFault| {
            // Sees the first observer's change.
            assert!(!f.rethrow_synchronously);
            f.rethrow_in_completion = false;
        }));
        let mut f = fault();
        observers.notify(&mut f);
        assert!(!f.rethrow_synchronously);
        assert!(!f.rethrow_in_completion);
    }

    #[test]
    fn removed_observer_is_not_called() {
        let observers = FaultObservers::default();
        let id = observers.add(Arc::new(|f: &mut UnhandledFault| f.suppress()));
        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        let mut f = fault();
        observers.notify(&mut f);
        assert!(f.rethrow_synchronously);
    }
}
