// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler configuration.

use std::fmt;
use std::sync::Arc;

use lockstep_sync::context::{self, ContextCapture};

/// Settings for [`Scheduler::with_config`](crate::Scheduler::with_config).
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Label used in log lines.
    pub name: String,
    /// Snapshot source for yield/marshal/post continuations.
    pub context: Arc<dyn ContextCapture>,
}

impl SchedulerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextCapture>) -> Self {
        self.context = context;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "lockstep".to_string(),
            context: context::no_context(),
        }
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
