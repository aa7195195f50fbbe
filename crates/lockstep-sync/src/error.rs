// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors raised by the sync primitives.

use thiserror::Error;

/// Outcome of a wait that did not end in a notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The wait's cancel token fired before the signal was notified.
    #[error("wait cancelled before the signal was notified")]
    Cancelled,
}

/// A primitive observed a state its own protocol rules out.
///
/// This is a bug in the primitive, not in user code. It is never returned:
/// it is the panic payload of [`invariant_violation`], so a host wrapping
/// `resume` in `catch_unwind` can tell it apart by downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("internal invariant violated: {what}")]
pub struct InvariantViolation {
    pub what: &'static str,
}

/// Log and unwind with an [`InvariantViolation`] payload.
#[cold]
pub fn invariant_violation(what: &'static str) -> ! {
    log::error!("internal invariant violated: {}", what);
    std::panic::panic_any(InvariantViolation { what })
}
