// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ambient context that flows across suspensions.
//!
//! A suspension point may take a snapshot of call-scoped state when a
//! continuation is registered. The snapshot is installed again around the
//! continuation when it runs, wherever that happens. Hosts with no such
//! state plug in [`NoContext`] and pay nothing.

use std::sync::Arc;

/// Captured ambient state, restorable around a continuation.
pub trait ContextSnapshot: Send + Sync {
    /// Run `body` with this snapshot current. Whatever was current before
    /// must be current again when this returns.
    fn run(&self, body: &mut dyn FnMut());
}

/// Source of snapshots. Consulted at registration time, on the registering
/// thread.
pub trait ContextCapture: Send + Sync {
    /// `None` means nothing worth restoring; the continuation then runs
    /// under whatever state is current when it is invoked.
    fn capture(&self) -> Option<Arc<dyn ContextSnapshot>>;
}

/// Capture that never snapshots anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextCapture for NoContext {
    fn capture(&self) -> Option<Arc<dyn ContextSnapshot>> {
        None
    }
}

/// Shared handle to [`NoContext`], the default for every config.
pub fn no_context() -> Arc<dyn ContextCapture> {
    Arc::new(NoContext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_context_captures_nothing() {
        assert!(NoContext.capture().is_none());
        assert!(no_context().capture().is_none());
    }
}
