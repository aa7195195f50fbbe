// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion handle for a spawned coroutine.
//!
//! Resolved once, when the body finishes: `Ok(())`, or the fault cause if
//! the fault record asked for it. The handle can be polled by the host or
//! awaited from another coroutine.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::TaskError;

/// Result slot shared between a task and its handles.
pub(crate) struct Completion {
    state: Mutex<CompletionState>,
}

#[derive(Default)]
struct CompletionState {
    result: Option<Result<(), TaskError>>,
    waiters: Vec<Waker>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CompletionState::default()),
        }
    }

    pub fn resolve(&self, result: Result<(), TaskError>) {
        let waiters = {
            let mut state = self.state.lock();
            state.result = Some(result);
            mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn get(&self) -> Option<Result<(), TaskError>> {
        self.state.lock().result.clone()
    }
}

/// Handle to a spawned coroutine's completion. Dropping it does not affect
/// the coroutine.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    completion: Arc<Completion>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64, completion: Arc<Completion>) -> Self {
        Self { id, completion }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the coroutine has finished (non-blocking).
    pub fn is_complete(&self) -> bool {
        self.completion.get().is_some()
    }

    /// The outcome, once finished.
    pub fn result(&self) -> Option<Result<(), TaskError>> {
        self.completion.get()
    }
}

impl Future for TaskHandle {
    type Output = Result<(), TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.completion.state.lock();
        if let Some(result) = &state.result {
            return Poll::Ready(result.clone());
        }
        if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn resolve_wakes_awaiters_once() {
        let completion = Arc::new(Completion::new());
        let mut handle = TaskHandle::new(1, completion.clone());
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut handle).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut handle).poll(&mut cx).is_pending());
        assert!(!handle.is_complete());

        completion.resolve(Ok(()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(handle.is_complete());
        assert!(matches!(Pin::new(&mut handle).poll(&mut cx), Poll::Ready(Ok(()))));
    }

    #[test]
    fn clones_share_the_result() {
        let completion = Arc::new(Completion::new());
        let handle = TaskHandle::new(2, completion.clone());
        let other = handle.clone();
        completion.resolve(Err(TaskError::Panicked("late".into())));
        assert!(matches!(other.result(), Some(Err(TaskError::Panicked(m))) if m == "late"));
        assert_eq!(handle.id(), 2);
    }
}
