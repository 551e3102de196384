// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::cancellation_token::CancellationToken;
use std::fmt::Debug;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A unit of deferred work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Injected timer capability used by time-driven operators.
///
/// Operators never sleep themselves: they ask the scheduler to run a task
/// later and keep the returned [`ScheduledTask`] to abandon it on cancel.
/// Tests plug in a virtual clock, production code a runtime-backed timer.
pub trait Scheduler: Clone + Send + Sync + Debug + 'static {
    type Instant: Copy
        + Debug
        + Ord
        + Send
        + Sync
        + Add<Duration, Output = Self::Instant>
        + Sub<Self::Instant, Output = Duration>;

    fn now(&self) -> Self::Instant;

    /// Runs `task` once after `delay` unless the returned handle is cancelled first.
    fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Handle to a task submitted with [`Scheduler::schedule_once`].
#[derive(Clone, Debug, Default)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    /// Wraps the token a scheduler checks before running the task.
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Prevents the task from running if it has not started yet.
    ///
    /// Returns `true` for the call that actually cancelled it.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token the scheduler observes.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}
