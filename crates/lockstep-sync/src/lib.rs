// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Synchronization primitives for the lockstep scheduler.
//!
//! Nothing in here knows about frames or `resume`. These are the pieces the
//! scheduler moves around and the wait primitive coroutines park on.
//!
//! Components:
//! - continuation: `ContinuationItem`, the unit every queue holds
//! - context: ambient-context snapshot/restore capability
//! - suspend: `SuspensionPoint` trait + `Suspend` future adapter
//! - cancel: `CancelToken` with callback registration
//! - pool: free list of registered waiters
//! - signal: `WaitSignal`, broadcast wait/notify with cancellation

pub mod cancel;
pub mod context;
pub mod continuation;
pub mod error;
mod pool;
pub mod signal;
pub mod suspend;

pub use cancel::{CancelRegistration, CancelToken};
pub use context::{ContextCapture, ContextSnapshot, NoContext};
pub use continuation::{Continuation, ContinuationItem};
pub use error::{InvariantViolation, WaitError};
pub use signal::{SignalConfig, Wait, WaitHandle, WaitSignal};
pub use suspend::{Suspend, SuspensionPoint};
