// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Yield and marshal suspension points.

use std::sync::{Arc, Weak};

use lockstep_sync::{Continuation, ContinuationItem, SuspensionPoint};

use crate::scheduler::Shared;

fn item(shared: &Shared, continuation: Continuation, flow: bool) -> ContinuationItem {
    if flow {
        ContinuationItem::capture(continuation, &*shared.context)
    } else {
        ContinuationItem::bare(continuation)
    }
}

/// Always suspends. The continuation goes to the explicit queue and runs in
/// a later `resume`, never the one that is currently draining.
#[derive(Debug, Clone)]
pub struct YieldPoint {
    shared: Weak<Shared>,
}

impl YieldPoint {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    fn enqueue(&self, continuation: Continuation, flow: bool) {
        let Some(shared) = self.shared.upgrade() else {
            log::warn!("yield on a dropped scheduler; continuation discarded");
            return;
        };
        shared.explicit.push(item(&shared, continuation, flow));
    }
}

impl SuspensionPoint for YieldPoint {
    type Output = ();

    fn is_ready(&self) -> bool {
        false
    }

    fn on_resume(&mut self, continuation: Continuation) {
        self.enqueue(continuation, true);
    }

    fn on_resume_unflowed(&mut self, continuation: Continuation) {
        self.enqueue(continuation, false);
    }

    fn outcome(&mut self) {}
}

/// Suspends only off the resuming thread. On it, completes immediately;
/// anywhere else the continuation goes to the implicit queue.
#[derive(Debug, Clone)]
pub struct MarshalPoint {
    shared: Weak<Shared>,
}

impl MarshalPoint {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    fn enqueue(&self, continuation: Continuation, flow: bool) {
        let Some(shared) = self.shared.upgrade() else {
            log::warn!("marshal on a dropped scheduler; continuation discarded");
            return;
        };
        let item = item(&shared, continuation, flow);
        shared.post(item);
    }
}

impl SuspensionPoint for MarshalPoint {
    type Output = ();

    fn is_ready(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.on_resuming_thread())
    }

    fn on_resume(&mut self, continuation: Continuation) {
        self.enqueue(continuation, true);
    }

    fn on_resume_unflowed(&mut self, continuation: Continuation) {
        self.enqueue(continuation, false);
    }

    fn outcome(&mut self) {}
}
