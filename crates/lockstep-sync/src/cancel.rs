// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation.
//!
//! AtomicBool flag + callback list. Callbacks run exactly once: on the
//! thread that calls `cancel()`, or inline in `register()` when the token
//! was already cancelled. Timeouts are not built in; a host composes one
//! by calling `cancel()` from its own timer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation token. Clones share the same flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    flag: AtomicBool,
    callbacks: Mutex<Callbacks>,
}

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                flag: AtomicBool::new(false),
                callbacks: Mutex::new(Callbacks::default()),
            }),
        }
    }

    /// Set the flag and run every registered callback. Idempotent.
    pub fn cancel(&self) {
        if self.inner.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries = std::mem::take(&mut self.inner.callbacks.lock().entries);
        log::trace!("cancel token fired, {} callback(s)", entries.len());
        for (_, callback) in entries {
            callback();
        }
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Run `callback` when the token is cancelled.
    ///
    /// Returns `None` if the token is already cancelled; the callback has
    /// then already run on this thread before `register` returns.
    pub fn register<F>(&self, callback: F) -> Option<CancelRegistration>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut callbacks = self.inner.callbacks.lock();
            // Checked under the lock: `cancel` sets the flag before it
            // drains, so a callback pushed here is always drained.
            if !self.inner.flag.load(Ordering::Acquire) {
                let id = callbacks.next_id;
                callbacks.next_id += 1;
                callbacks.entries.push((id, Box::new(callback)));
                return Some(CancelRegistration {
                    token: Arc::downgrade(&self.inner),
                    id,
                });
            }
        }
        callback();
        None
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner.callbacks.lock().entries.len()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Live callback registration. Dropping it unregisters the callback; a
/// callback already running on another thread is not interrupted.
#[must_use = "dropping a registration unregisters its callback"]
pub struct CancelRegistration {
    token: Weak<TokenInner>,
    id: u64,
}

impl CancelRegistration {
    /// Unregister now. Same as dropping.
    pub fn dispose(self) {}
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        let Some(token) = self.token.upgrade() else {
            return;
        };
        let removed = {
            let mut callbacks = token.callbacks.lock();
            callbacks
                .entries
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|at| callbacks.entries.remove(at))
        };
        // Dropped outside the lock; the closure may own anything.
        drop(removed);
    }
}

impl fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRegistration")
            .field("id", &self.id)
            .finish()
    }
}
