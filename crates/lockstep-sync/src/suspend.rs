// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Suspension points.
//!
//! A suspension point answers three questions: can the caller continue
//! right away, where does the continuation go if not, and what does the
//! caller get once it is resumed. Yield, marshal and signal waits are all
//! implementations of the same trait; `Suspend` turns any of them into a
//! `Future` a coroutine can `.await`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

use crate::continuation::Continuation;

pub trait SuspensionPoint {
    type Output;

    /// True when no suspension is needed.
    fn is_ready(&self) -> bool;

    /// Register `continuation` to run once the point completes. Takes an
    /// ambient-context snapshot where the point supports one.
    fn on_resume(&mut self, continuation: Continuation);

    /// Same as `on_resume` but never snapshots ambient context.
    fn on_resume_unflowed(&mut self, continuation: Continuation) {
        self.on_resume(continuation);
    }

    /// Result for the caller. Only meaningful after `is_ready` returned true
    /// or the registered continuation ran.
    fn outcome(&mut self) -> Self::Output;
}

/// Firing record shared between a `Suspend` and its registered continuation.
struct ResumeCell {
    fired: AtomicBool,
    waker: AtomicWaker,
}

impl ResumeCell {
    fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Future adapter over a suspension point.
///
/// First poll: ready points complete immediately with no allocation. Other
/// points get a continuation that records the firing and wakes the polling
/// task; the outcome is read on the poll that follows.
pub struct Suspend<P> {
    point: P,
    resumed: Option<Arc<ResumeCell>>,
}

impl<P: SuspensionPoint> Suspend<P> {
    pub fn new(point: P) -> Self {
        Self {
            point,
            resumed: None,
        }
    }

    pub fn point(&self) -> &P {
        &self.point
    }

    /// Would the next poll complete?
    pub fn is_ready(&self) -> bool {
        match &self.resumed {
            Some(cell) => cell.fired(),
            None => self.point.is_ready(),
        }
    }

    pub fn into_point(self) -> P {
        self.point
    }
}

impl<P: SuspensionPoint + Unpin> Future for Suspend<P> {
    type Output = P::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(cell) = &this.resumed {
            if cell.fired() {
                return Poll::Ready(this.point.outcome());
            }
            cell.waker.register(cx.waker());
            // Re-check: the continuation may have fired before registration.
            if cell.fired() {
                return Poll::Ready(this.point.outcome());
            }
            return Poll::Pending;
        }

        if this.point.is_ready() {
            return Poll::Ready(this.point.outcome());
        }

        let cell = Arc::new(ResumeCell {
            fired: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        });
        cell.waker.register(cx.waker());
        let fire = cell.clone();
        this.resumed = Some(cell.clone());
        this.point.on_resume(Box::new(move || {
            fire.fired.store(true, Ordering::Release);
            fire.waker.wake();
        }));

        // Points may complete inline during registration.
        if cell.fired() {
            Poll::Ready(this.point.outcome())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::task::{Wake, Waker};

    /// Point that parks its continuation for the test to fire by hand.
    #[derive(Default)]
    struct Manual {
        ready: bool,
        inline: bool,
        parked: Arc<Mutex<Option<Continuation>>>,
    }

    impl SuspensionPoint for Manual {
        type Output = &'static str;

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn on_resume(&mut self, continuation: Continuation) {
            if self.inline {
                continuation();
            } else {
                *self.parked.lock().unwrap() = Some(continuation);
            }
        }

        fn outcome(&mut self) -> &'static str {
            "done"
        }
    }

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn poll_once<F: Future + Unpin>(fut: &mut F, waker: &Waker) -> Poll<F::Output> {
        Pin::new(fut).poll(&mut Context::from_waker(waker))
    }

    #[test]
    fn ready_point_completes_without_registering() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut fut = Suspend::new(Manual {
            ready: true,
            ..Default::default()
        });
        assert!(fut.is_ready());
        assert_eq!(poll_once(&mut fut, &waker), Poll::Ready("done"));
        assert!(fut.point().parked.lock().unwrap().is_none());
    }

    #[test]
    fn pending_point_wakes_when_fired() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let parked = Arc::new(Mutex::new(None));
        let mut fut = Suspend::new(Manual {
            parked: parked.clone(),
            ..Default::default()
        });

        assert_eq!(poll_once(&mut fut, &waker), Poll::Pending);
        assert_eq!(poll_once(&mut fut, &waker), Poll::Pending);
        assert!(!fut.is_ready());

        let continuation = parked.lock().unwrap().take().expect("registered");
        continuation();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(fut.is_ready());
        assert_eq!(poll_once(&mut fut, &waker), Poll::Ready("done"));
    }

    #[test]
    fn inline_completion_during_registration() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut fut = Suspend::new(Manual {
            inline: true,
            ..Default::default()
        });
        assert_eq!(poll_once(&mut fut, &waker), Poll::Ready("done"));
    }
}
