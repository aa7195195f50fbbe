// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Frame-driven scheduler.
//!
//! Two FIFOs of continuations. The explicit queue holds coroutines that
//! yielded; the implicit queue holds work posted from other threads (or from
//! this thread outside `resume`) and marshals. One `resume` call:
//!
//! 1. drains the implicit queue until it is empty,
//! 2. counts the explicit queue once,
//! 3. runs exactly that many explicit items, draining the implicit queue
//!    again after each one.
//!
//! Anything yielded during the call waits for the next one, so each frame
//! advances one generation of already-waiting work.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use lockstep_sync::context::ContextCapture;
use lockstep_sync::error::invariant_violation;
use lockstep_sync::{ContinuationItem, Suspend};
use log::debug;
use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BoxError, SchedulerError, TaskError};
use crate::fault::{FaultObservers, ObserverId, UnhandledFault};
use crate::handle::TaskHandle;
use crate::points::{MarshalPoint, YieldPoint};
use crate::queue::ContinuationQueue;
use crate::task::Task;

/// Cooperative scheduler driven by explicit `resume` calls.
///
/// Clones share the same queues. Only one thread may be inside `resume` at
/// a time; any thread may spawn, post, or complete work.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

/// State shared between the scheduler, its dispatchers, suspension points
/// and tasks.
pub(crate) struct Shared {
    pub name: String,
    /// Yielded coroutines.
    pub explicit: ContinuationQueue,
    /// Posted work and marshals.
    pub implicit: ContinuationQueue,
    /// Set for the whole extent of one `resume`, on the thread running it.
    resuming_thread: Mutex<Option<ThreadId>>,
    pub observers: FaultObservers,
    /// Faults raised by tasks polled inline, oldest first, waiting for
    /// `resume` to return them.
    parked_faults: Mutex<VecDeque<SchedulerError>>,
    pub context: Arc<dyn ContextCapture>,
    next_task_id: AtomicU64,
}

/// Queue depths at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    pub explicit: usize,
    pub implicit: usize,
}

impl PendingCounts {
    pub fn is_empty(&self) -> bool {
        self.explicit == 0 && self.implicit == 0
    }
}

impl Shared {
    pub fn on_resuming_thread(&self) -> bool {
        *self.resuming_thread.lock() == Some(thread::current().id())
    }

    /// Run now on the resuming thread, else defer to the implicit queue.
    pub fn post(&self, item: ContinuationItem) {
        if self.on_resuming_thread() {
            item.invoke();
        } else {
            self.implicit.push(item);
        }
    }

    pub fn park_fault(&self, cause: TaskError, task: TaskHandle) {
        self.parked_faults
            .lock()
            .push_back(SchedulerError::Unhandled { cause, task });
    }

    fn has_parked_fault(&self) -> bool {
        !self.parked_faults.lock().is_empty()
    }

    /// Surface the oldest parked fault, if any. The rest stay parked.
    fn take_fault(&self) -> Result<(), SchedulerError> {
        match self.parked_faults.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Resuming-thread marker for one `resume`; cleared on drop, unwinding
/// included.
struct ResumeMarker<'a> {
    shared: &'a Shared,
}

impl<'a> ResumeMarker<'a> {
    fn enter(shared: &'a Shared) -> Result<Self, SchedulerError> {
        let mut slot = shared.resuming_thread.lock();
        if let Some(owner) = *slot {
            return Err(SchedulerError::AlreadyResuming(owner));
        }
        *slot = Some(thread::current().id());
        Ok(Self { shared })
    }
}

impl Drop for ResumeMarker<'_> {
    fn drop(&mut self) {
        *self.shared.resuming_thread.lock() = None;
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: config.name,
                explicit: ContinuationQueue::new("explicit"),
                implicit: ContinuationQueue::new("implicit"),
                resuming_thread: Mutex::new(None),
                observers: FaultObservers::default(),
                parked_faults: Mutex::new(VecDeque::new()),
                context: config.context,
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Execution environment bound to this scheduler.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(&self.shared)
    }

    /// Start `body` now, on this thread, and run it to its first suspension.
    ///
    /// Later resumptions happen on whichever thread is inside `resume`. If
    /// the body fails before suspending, the fault observers run before this
    /// returns, and `Err` is returned unless they cleared
    /// `rethrow_synchronously`. The error carries the task's handle, already
    /// resolved per `rethrow_in_completion`.
    pub fn spawn_task<F>(&self, body: F) -> Result<TaskHandle, SchedulerError>
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = Task::new(id, Box::pin(body), self.dispatcher());
        let handle = task.handle();
        debug!("{}: spawning task {}", self.shared.name, id);
        match task.run() {
            Some(cause) => Err(SchedulerError::Unhandled {
                cause,
                task: handle,
            }),
            None => Ok(handle),
        }
    }

    /// Unconditional suspension until a later `resume`.
    pub fn yield_now(&self) -> Suspend<YieldPoint> {
        Suspend::new(self.yield_point())
    }

    /// Continue on the resuming thread: immediately if already there,
    /// otherwise at the next `resume`.
    pub fn marshal(&self) -> Suspend<MarshalPoint> {
        Suspend::new(self.marshal_point())
    }

    pub fn yield_point(&self) -> YieldPoint {
        YieldPoint::new(&self.shared)
    }

    pub fn marshal_point(&self) -> MarshalPoint {
        MarshalPoint::new(&self.shared)
    }

    /// Advance one frame.
    ///
    /// Faults from coroutine bodies come back as `Err` after the
    /// continuation that surfaced them, one per call; whatever is still
    /// queued stays queued for the next call. Faults still parked from an
    /// earlier call are returned first, before anything runs. A panic from
    /// a raw continuation is not caught and unwinds out of this call.
    pub fn resume(&self) -> Result<(), SchedulerError> {
        let _marker = ResumeMarker::enter(&self.shared)?;
        self.shared.take_fault()?;
        let _env = self.dispatcher().install();

        let mut ran = self.drain_implicit()?;
        let batch = self.shared.explicit.len();
        for _ in 0..batch {
            // Single consumer: nothing else pops, so the counted items are there.
            let Some(item) = self.shared.explicit.pop() else {
                invariant_violation("explicit queue held fewer items than counted");
            };
            item.invoke();
            ran += 1;
            self.shared.take_fault()?;
            ran += self.drain_implicit()?;
        }

        if ran > 0 {
            debug!(
                "{}: resumed {} yielded, {} total continuation(s)",
                self.shared.name, batch, ran
            );
        }
        Ok(())
    }

    fn drain_implicit(&self) -> Result<usize, SchedulerError> {
        let mut ran = 0;
        while let Some(item) = self.shared.implicit.pop() {
            item.invoke();
            ran += 1;
            self.shared.take_fault()?;
        }
        Ok(ran)
    }

    /// Call `resume` until both queues are empty with no parked fault, or
    /// `max_frames` frames have run. Returns the number of frames run.
    pub fn resume_until_idle(&self, max_frames: usize) -> Result<usize, SchedulerError> {
        let mut frames = 0;
        while frames < max_frames && !self.is_idle() {
            self.resume()?;
            frames += 1;
        }
        Ok(frames)
    }

    fn is_idle(&self) -> bool {
        self.shared.explicit.is_empty()
            && self.shared.implicit.is_empty()
            && !self.shared.has_parked_fault()
    }

    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            explicit: self.shared.explicit.len(),
            implicit: self.shared.implicit.len(),
        }
    }

    /// True on the thread currently inside `resume`.
    pub fn is_resuming_thread(&self) -> bool {
        self.shared.on_resuming_thread()
    }

    /// Observe coroutine-body faults. Observers may change the fault's
    /// rethrow flags; they run before the completion handle resolves.
    pub fn on_unhandled_fault<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&mut UnhandledFault) + Send + Sync + 'static,
    {
        self.shared.observers.add(Arc::new(observer))
    }

    pub fn remove_fault_observer(&self, id: ObserverId) -> bool {
        self.shared.observers.remove(id)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .finish()
    }
}
