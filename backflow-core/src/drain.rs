// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Drain serialization.
//!
//! A [`DrainSerializer`] is a work counter that turns any number of concurrent
//! or re-entrant "something changed, please emit" notifications into a single
//! loop running on exactly one thread at a time. The first caller to bump the
//! counter from zero becomes the drain owner; everybody else only records that
//! another pass is needed and returns immediately.
//!
//! This is what keeps `request(n)` called from inside `on_next`, and a retry
//! that fails synchronously on resubscribe, from growing the call stack.
//!
//! ```
//! use backflow_core::DrainSerializer;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let serializer = DrainSerializer::new();
//! let passes = AtomicUsize::new(0);
//!
//! serializer.drain(|| {
//!     let pass = passes.fetch_add(1, Ordering::SeqCst);
//!     if pass < 3 {
//!         // Re-entrant notification: only schedules another pass.
//!         serializer.drain(|| unreachable!());
//!     }
//! });
//!
//! assert_eq!(passes.load(Ordering::SeqCst), 4);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

/// Re-entrancy collapsing work counter.
#[derive(Debug, Default)]
pub struct DrainSerializer {
    wip: AtomicUsize,
}

impl DrainSerializer {
    /// Creates an idle serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wip: AtomicUsize::new(0),
        }
    }

    /// Records one unit of work.
    ///
    /// Returns `true` if the caller became the drain owner and must run the
    /// loop, finishing each pass with [`leave`](Self::leave).
    #[must_use]
    pub fn try_enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Retires `missed` units of work and returns how many arrived meanwhile.
    ///
    /// A non-zero result means the owner must run another pass and retire that
    /// many units afterwards.
    #[must_use]
    pub fn leave(&self, missed: usize) -> usize {
        self.wip.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// Returns `true` while a drain loop is running or scheduled.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.wip.load(Ordering::Acquire) != 0
    }

    /// Runs `work` as the drain owner, repeating while notifications arrive.
    ///
    /// If another thread (or an outer frame of this thread) owns the loop,
    /// this only schedules one more pass of *its* work and returns.
    pub fn drain(&self, mut work: impl FnMut()) {
        if !self.try_enter() {
            return;
        }

        let mut missed = 1;
        loop {
            work();
            missed = self.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }
}
