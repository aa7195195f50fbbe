// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Spawned coroutine.
//!
//! The task's waker is its continuation: waking goes through the task's
//! dispatcher, so a wake on the resuming thread polls inline and a wake
//! from anywhere else lands in the implicit queue. Every poll runs with the
//! dispatcher installed and with panics caught, and a finished body is
//! routed through the fault observers before its handle resolves.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use lockstep_sync::ContinuationItem;
use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::dispatcher::Dispatcher;
use crate::error::{BoxError, TaskError};
use crate::fault::UnhandledFault;
use crate::handle::{Completion, TaskHandle};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// Task lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// Suspended, nothing queued.
    Idle = 0,
    /// A run is queued or about to happen.
    Scheduled = 1,
    /// Being polled.
    Running = 2,
    /// Woken while being polled; must be polled again.
    Notified = 3,
    /// Body finished.
    Complete = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::Notified,
            _ => Self::Complete,
        }
    }
}

pub(crate) struct Task {
    id: u64,
    state: AtomicU8,
    future: Mutex<Option<BoxFuture>>,
    completion: Arc<Completion>,
    dispatcher: Dispatcher,
}

impl Task {
    pub fn new(id: u64, future: BoxFuture, dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(TaskState::Scheduled as u8),
            future: Mutex::new(Some(future)),
            completion: Arc::new(Completion::new()),
            dispatcher,
        })
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.id, self.completion.clone())
    }

    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Poll until the body suspends or finishes. A wake that lands while
    /// the body is being polled makes it poll again before returning.
    ///
    /// Returns the fault cause when it must be re-raised by the caller.
    pub fn run(self: &Arc<Self>) -> Option<TaskError> {
        if self.state() == TaskState::Complete {
            return None;
        }

        let _env = self.dispatcher.install();
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            self.state.store(TaskState::Running as u8, Ordering::Release);

            let finished = {
                let mut slot = self.future.lock();
                let Some(fut) = slot.as_mut() else {
                    self.state
                        .store(TaskState::Complete as u8, Ordering::Release);
                    return None;
                };
                match panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
                    Ok(Poll::Pending) => None,
                    Ok(Poll::Ready(result)) => {
                        *slot = None;
                        Some(result.map_err(TaskError::failed))
                    }
                    Err(payload) => {
                        *slot = None;
                        Some(Err(TaskError::from_panic(payload)))
                    }
                }
            };

            if let Some(result) = finished {
                self.state
                    .store(TaskState::Complete as u8, Ordering::Release);
                return self.finish(result);
            }

            let parked = self.state.compare_exchange(
                TaskState::Running as u8,
                TaskState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if parked.is_ok() {
                return None;
            }
            // Notified mid-poll.
            trace!("task {} woken while running, polling again", self.id);
        }
    }

    fn finish(&self, result: Result<(), TaskError>) -> Option<TaskError> {
        let cause = match result {
            Ok(()) => {
                debug!("task {} completed", self.id);
                self.completion.resolve(Ok(()));
                return None;
            }
            Err(cause) => cause,
        };

        let mut fault = UnhandledFault::new(cause);
        if let Some(shared) = self.dispatcher.shared() {
            shared.observers.notify(&mut fault);
        }

        let outcome = if fault.rethrow_in_completion {
            Err(fault.cause.clone())
        } else {
            Ok(())
        };
        self.completion.resolve(outcome);

        if fault.rethrow_synchronously {
            error!("task {} faulted: {}", self.id, fault.cause);
            Some(fault.cause)
        } else {
            debug!("task {} fault handled by observer: {}", self.id, fault.cause);
            None
        }
    }

    /// Run entered from a queue; faults are parked for `resume` to raise.
    fn run_posted(self: Arc<Self>) {
        let Some(cause) = self.run() else {
            return;
        };
        match self.dispatcher.shared() {
            Some(shared) => shared.park_fault(cause, self.handle()),
            None => error!("task {} faulted after its scheduler dropped: {}", self.id, cause),
        }
    }

    fn schedule(self: Arc<Self>) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match TaskState::from_u8(current) {
                TaskState::Idle => TaskState::Scheduled,
                TaskState::Running => TaskState::Notified,
                // Already queued, already flagged, or done.
                _ => return,
            };
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if next == TaskState::Scheduled => break,
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
        let dispatcher = self.dispatcher.clone();
        dispatcher.post_item(ContinuationItem::bare(Box::new(move || self.run_posted())));
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.clone().schedule();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            TaskState::Idle,
            TaskState::Scheduled,
            TaskState::Running,
            TaskState::Notified,
            TaskState::Complete,
        ] {
            assert_eq!(TaskState::from_u8(state as u8), state);
        }
        assert_eq!(TaskState::from_u8(200), TaskState::Complete);
    }
}
