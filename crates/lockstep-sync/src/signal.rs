// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Broadcast wait signal.
//!
//! A condition-variable substitute that needs no external lock around the
//! check. A wait captures the current generation; `notify_all` bumps it.
//! A handle whose generation has moved on is satisfied, no matter whether
//! the notify happened before or after the caller got around to suspending.
//!
//! Registered waiters live in a front buffer. `notify_all` swaps it for an
//! empty one under the lock and fires the swapped-out batch after releasing
//! it, so the lock is held O(1) however many waiters there are, and waits
//! registered while the batch fires land in the fresh buffer untouched.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::context::{self, ContextCapture};
use crate::continuation::{Continuation, ContinuationItem};
use crate::error::{invariant_violation, WaitError};
use crate::pool::{Waiter, WaiterPool};
use crate::suspend::{Suspend, SuspensionPoint};

/// Future returned by [`WaitSignal::wait`].
pub type Wait = Suspend<WaitHandle>;

/// Signal configuration.
#[derive(Clone)]
pub struct SignalConfig {
    /// Max idle waiters kept for reuse.
    pub pool_capacity: usize,
    /// Snapshot source for continuations registered on this signal.
    pub context: Arc<dyn ContextCapture>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 64,
            context: context::no_context(),
        }
    }
}

impl fmt::Debug for SignalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalConfig")
            .field("pool_capacity", &self.pool_capacity)
            .finish_non_exhaustive()
    }
}

/// Broadcast wait/notify primitive. Clones share the same signal.
#[derive(Clone)]
pub struct WaitSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    buffers: Mutex<Buffers>,
    pool: WaiterPool,
    context: Arc<dyn ContextCapture>,
}

struct Buffers {
    generation: u64,
    /// Waiters registered since the last notify.
    front: Vec<Arc<Waiter>>,
    /// Spare storage swapped in as the next front.
    back: Vec<Arc<Waiter>>,
}

impl WaitSignal {
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                buffers: Mutex::new(Buffers {
                    generation: 0,
                    front: Vec::new(),
                    back: Vec::new(),
                }),
                pool: WaiterPool::new(config.pool_capacity),
                context: config.context,
            }),
        }
    }

    /// Awaitable wait. Resolves `Ok(())` on the next notify, or
    /// `Err(WaitError::Cancelled)` if `cancel` fires first.
    ///
    /// The generation is captured here, not at the first poll.
    pub fn wait(&self, cancel: Option<&CancelToken>) -> Wait {
        Suspend::new(self.wait_handle(cancel))
    }

    /// Raw suspension point for callers driving continuations by hand.
    pub fn wait_handle(&self, cancel: Option<&CancelToken>) -> WaitHandle {
        WaitHandle {
            signal: self.inner.clone(),
            token: self.generation(),
            cancel: cancel.cloned(),
            cancelled: None,
        }
    }

    /// Wake every waiter registered before this call.
    pub fn notify_all(&self) {
        let mut batch = {
            let mut buffers = self.inner.buffers.lock();
            buffers.generation += 1;
            let spare = mem::take(&mut buffers.back);
            mem::replace(&mut buffers.front, spare)
        };
        if !batch.is_empty() {
            debug!("signal notify: firing {} waiter(s)", batch.len());
        }

        for waiter in batch.drain(..) {
            // Only this batch can reach the waiter now; a cancel callback
            // that lost the race finds it gone from the front buffer.
            if !waiter.claim() {
                invariant_violation("notified waiter was already completed");
            }
            let fired = waiter.take();
            drop(fired.registration);
            if let Some(item) = fired.item {
                item.invoke();
            }
            self.inner.pool.release(waiter);
        }

        let mut buffers = self.inner.buffers.lock();
        if buffers.back.capacity() < batch.capacity() {
            buffers.back = batch;
        }
    }

    /// Number of notifies so far.
    pub fn generation(&self) -> u64 {
        self.inner.buffers.lock().generation
    }

    /// Waiters registered and not yet fired.
    pub fn waiter_count(&self) -> usize {
        self.inner.buffers.lock().front.len()
    }

    #[cfg(test)]
    fn idle_waiters(&self) -> usize {
        self.inner.pool.idle()
    }
}

impl Default for WaitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffers = self.inner.buffers.lock();
        f.debug_struct("WaitSignal")
            .field("generation", &buffers.generation)
            .field("waiters", &buffers.front.len())
            .finish()
    }
}

impl SignalInner {
    fn register(self: &Arc<Self>, handle: &mut WaitHandle, item: ContinuationItem) {
        let waiter = self.pool.acquire();
        let cancelled = handle
            .cancel
            .is_some()
            .then(|| Arc::new(AtomicBool::new(false)));

        let epoch = {
            let mut buffers = self.buffers.lock();
            if buffers.generation != handle.token {
                // Notified between capture and registration: no wakeup to miss.
                drop(buffers);
                self.pool.release(waiter);
                item.invoke();
                return;
            }
            let epoch = waiter.arm(item, cancelled.clone());
            buffers.front.push(waiter.clone());
            epoch
        };
        trace!("signal wait registered at generation {}", handle.token);
        handle.cancelled = cancelled;

        let Some(cancel) = &handle.cancel else {
            return;
        };
        let inner = self.clone();
        let target = waiter.clone();
        let registration = cancel.register(move || inner.cancel_waiter(&target, epoch));
        if let Some(registration) = registration {
            // Fired or re-armed meanwhile: the registration is stale.
            drop(waiter.attach(epoch, registration));
        }
    }

    fn cancel_waiter(&self, waiter: &Arc<Waiter>, epoch: u64) {
        let removed = {
            let mut buffers = self.buffers.lock();
            let at = buffers
                .front
                .iter()
                .position(|w| Arc::ptr_eq(w, waiter) && w.epoch() == epoch);
            at.map(|at| buffers.front.remove(at))
        };
        let Some(waiter) = removed else {
            // Already swapped out by a notify, or a stale arming.
            return;
        };
        if !waiter.claim() {
            return;
        }
        trace!("signal wait cancelled");
        let fired = waiter.take();
        if let Some(flag) = &fired.cancelled {
            flag.store(true, Ordering::Release);
        }
        drop(fired.registration);
        if let Some(item) = fired.item {
            item.invoke();
        }
        self.pool.release(waiter);
    }
}

/// A captured wait: the signal, the generation seen at capture, and an
/// optional cancel token.
pub struct WaitHandle {
    signal: Arc<SignalInner>,
    token: u64,
    cancel: Option<CancelToken>,
    /// Set when a registered wait was completed by its cancel token.
    cancelled: Option<Arc<AtomicBool>>,
}

impl WaitHandle {
    /// Generation captured by this handle.
    pub fn token(&self) -> u64 {
        self.token
    }

    fn notified(&self) -> bool {
        self.signal.buffers.lock().generation != self.token
    }

    fn cancel_raised(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

impl SuspensionPoint for WaitHandle {
    type Output = Result<(), WaitError>;

    fn is_ready(&self) -> bool {
        self.notified() || self.cancel_raised()
    }

    fn on_resume(&mut self, continuation: Continuation) {
        let signal = self.signal.clone();
        let item = ContinuationItem::capture(continuation, &*signal.context);
        signal.register(self, item);
    }

    fn on_resume_unflowed(&mut self, continuation: Continuation) {
        let signal = self.signal.clone();
        signal.register(self, ContinuationItem::bare(continuation));
    }

    fn outcome(&mut self) -> Result<(), WaitError> {
        if let Some(flag) = &self.cancelled {
            return if flag.load(Ordering::Acquire) {
                Err(WaitError::Cancelled)
            } else {
                Ok(())
            };
        }
        if !self.notified() && self.cancel_raised() {
            return Err(WaitError::Cancelled);
        }
        Ok(())
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("token", &self.token)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}
