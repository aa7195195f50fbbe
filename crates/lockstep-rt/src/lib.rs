// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lockstep runtime: a manually driven cooperative scheduler.
//!
//! No worker threads, no timers. The host calls [`Scheduler::resume`] once
//! per frame from its driver thread and every suspended coroutine advances
//! only inside that call. Work completed on other threads is marshalled back
//! onto the driver thread, and only when it is not already there.
//!
//! Components:
//! - scheduler: spawn/yield/marshal/resume, the two continuation queues
//! - dispatcher: send/post execution environment bound to a scheduler
//! - points: yield and marshal suspension points
//! - task: spawned coroutine, waker, fault interception
//! - handle: completion handle for a spawned coroutine
//! - fault: unhandled-fault record and observers
//! - queue: lock-free continuation FIFO
//! - config: scheduler configuration
//!
//! The wait primitive and suspension-point plumbing live in `lockstep-sync`
//! and are re-exported here.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod handle;
pub mod points;
mod queue;
pub mod scheduler;
mod task;

pub use config::SchedulerConfig;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, SchedulerError, TaskError};
pub use fault::{ObserverId, UnhandledFault};
pub use handle::TaskHandle;
pub use points::{MarshalPoint, YieldPoint};
pub use scheduler::{PendingCounts, Scheduler};

pub use lockstep_sync::{
    CancelRegistration, CancelToken, ContextCapture, ContextSnapshot, Continuation,
    ContinuationItem, InvariantViolation, NoContext, SignalConfig, Suspend, SuspensionPoint,
    Wait, WaitError, WaitHandle, WaitSignal,
};
