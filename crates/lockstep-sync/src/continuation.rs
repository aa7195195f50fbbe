// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Continuation items.
//!
//! A `ContinuationItem` is created at a suspension point, owned by whichever
//! queue or waiter holds it, and consumed by exactly one `invoke`.

use std::fmt;
use std::sync::Arc;

use crate::context::{ContextCapture, ContextSnapshot};

/// The rest of a coroutine's work after a suspension point.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Continuation plus the ambient snapshot taken when it was registered.
pub struct ContinuationItem {
    continuation: Continuation,
    context: Option<Arc<dyn ContextSnapshot>>,
}

/// Entry point shared by every context-restoring invocation. The snapshot
/// gets a borrowed closure over a stack slot, so no per-item allocation.
static TRAMPOLINE: fn(&mut Option<Continuation>) = run_slot;

fn run_slot(slot: &mut Option<Continuation>) {
    if let Some(continuation) = slot.take() {
        continuation();
    }
}

impl ContinuationItem {
    pub fn new(continuation: Continuation, context: Option<Arc<dyn ContextSnapshot>>) -> Self {
        Self {
            continuation,
            context,
        }
    }

    /// Item with no snapshot; runs under whatever context is current.
    pub fn bare(continuation: Continuation) -> Self {
        Self::new(continuation, None)
    }

    /// Item carrying whatever `capture` snapshots right now.
    pub fn capture(continuation: Continuation, capture: &dyn ContextCapture) -> Self {
        Self::new(continuation, capture.capture())
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Run the continuation, inside its snapshot when there is one.
    pub fn invoke(self) {
        let Self {
            continuation,
            context,
        } = self;
        match context {
            None => continuation(),
            Some(snapshot) => {
                let mut slot = Some(continuation);
                snapshot.run(&mut || TRAMPOLINE(&mut slot));
            }
        }
    }
}

impl fmt::Debug for ContinuationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationItem")
            .field("has_context", &self.has_context())
            .finish_non_exhaustive()
    }
}
