// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A virtual-time [`Scheduler`] for deterministic timer tests.

use backflow_core::scheduler::Task;
use backflow_core::{CancellationToken, ScheduledTask, Scheduler};
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::Duration;

/// Point on the virtual clock, measured from the scheduler's creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    #[must_use]
    pub const fn elapsed_since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for VirtualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    handle: ScheduledTask,
    task: Task,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    queue: Vec<Pending>,
}

/// Scheduler whose clock only moves when the test calls
/// [`advance_by`](Self::advance_by).
///
/// Tasks run on the calling thread, in due-time order, ties broken by
/// submission order.
///
/// ```rust
/// use backflow_core::Scheduler;
/// use backflow_test_utils::ManualScheduler;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// scheduler.schedule_once(
///     Duration::from_millis(100),
///     Box::new(move || flag.store(true, Ordering::SeqCst)),
/// );
///
/// scheduler.advance_by(Duration::from_millis(99));
/// assert!(!fired.load(Ordering::SeqCst));
/// scheduler.advance_by(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward, running every task that becomes due.
    ///
    /// Tasks scheduled by running tasks are picked up if they fall inside the
    /// advanced window.
    pub fn advance_by(&self, delta: Duration) {
        let target = self.clock.lock().now + delta;
        while let Some(next) = self.pop_due(target) {
            if !next.handle.is_cancelled() {
                (next.task)();
            }
        }
        let mut clock = self.clock.lock();
        if clock.now < target {
            clock.now = target;
        }
    }

    /// Runs tasks due at the current instant.
    pub fn run_due(&self) {
        self.advance_by(Duration::ZERO);
    }

    /// Number of submitted tasks that have neither run nor been cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.clock
            .lock()
            .queue
            .iter()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }

    fn pop_due(&self, target: Duration) -> Option<Pending> {
        let mut clock = self.clock.lock();
        let index = clock
            .queue
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= target)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        let next = clock.queue.swap_remove(index);
        clock.now = clock.now.max(next.due);
        Some(next)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("queued", &clock.queue.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    type Instant = VirtualInstant;

    fn now(&self) -> VirtualInstant {
        VirtualInstant(self.clock.lock().now)
    }

    fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask {
        let handle = ScheduledTask::new(CancellationToken::new());
        let mut clock = self.clock.lock();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now + delay;
        clock.queue.push(Pending {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}
