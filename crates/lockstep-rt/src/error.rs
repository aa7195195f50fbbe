// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler and coroutine errors.

use std::any::Any;
use std::sync::Arc;
use std::thread::ThreadId;

use thiserror::Error;

use crate::handle::TaskHandle;

/// Error type coroutine bodies return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a spawned coroutine faulted. Cheap to clone, so the same cause can
/// resolve the completion handle and be re-raised.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Body returned `Err`.
    #[error("task failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// Body panicked with the given message.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub(crate) fn failed(error: BoxError) -> Self {
        TaskError::Failed(Arc::from(error))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        TaskError::Panicked(msg)
    }
}

/// Errors surfaced synchronously by `spawn_task` and `resume`.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A coroutine faulted and its fault record still asked for a
    /// synchronous re-raise after the observers ran. `task` is the faulted
    /// coroutine's handle, already resolved per `rethrow_in_completion`.
    #[error("unhandled fault in task {}: {cause}", .task.id())]
    Unhandled { cause: TaskError, task: TaskHandle },
    /// `resume` was entered while another `resume` is in progress.
    #[error("resume entered while {0:?} is already resuming")]
    AlreadyResuming(ThreadId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        match TaskError::from_panic(caught) {
            TaskError::Panicked(msg) => assert_eq!(msg, "boom 7"),
            other => panic!("expected Panicked, got {:?}", other),
        }

        let caught = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert!(matches!(TaskError::from_panic(caught), TaskError::Panicked(m) if m == "static"));

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(5u8)).unwrap_err();
        assert!(matches!(TaskError::from_panic(caught), TaskError::Panicked(m) if m == "unknown panic"));
    }

    #[test]
    fn failed_keeps_source_message() {
        let err = TaskError::failed("disk on fire".into());
        assert_eq!(err.to_string(), "task failed: disk on fire");
        let again = err.clone();
        assert_eq!(again.to_string(), err.to_string());
    }
}
