// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Emission of a final value that must wait for downstream demand.
//!
//! Operators such as buffers and aggregations hold one last value when
//! upstream completes, but may only emit it once downstream has asked for it.
//! Completion and `request` race each other on different threads, so the
//! hand-off runs inside a [`DrainSerializer`] loop: whichever side arrives
//! second performs the emission, exactly once.

use crate::atomic_slot::AtomicSlot;
use crate::demand::{validate, Demand};
use crate::drain::DrainSerializer;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds an operator's final value until downstream demand allows emitting it.
///
/// Regular emissions must be reported with [`produced`](Self::produced) so the
/// tail only goes out against demand left over by them.
#[derive(Debug)]
pub struct DeferredTail<T> {
    demand: Demand,
    tail: AtomicSlot<T>,
    done: AtomicBool,
    finished: AtomicBool,
    serializer: DrainSerializer,
}

impl<T> DeferredTail<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            demand: Demand::new(),
            tail: AtomicSlot::new(),
            done: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            serializer: DrainSerializer::new(),
        }
    }

    /// Records downstream demand and emits the tail if it is waiting for it.
    pub fn request(&self, n: u64, finish: impl FnMut(Option<T>)) {
        if !validate(n) {
            return;
        }
        self.demand.add(n);
        self.drain(finish);
    }

    /// Records `n` items emitted ahead of the tail.
    pub fn produced(&self, n: u64) {
        self.demand.produced(n);
    }

    /// Outstanding demand not consumed by regular emissions.
    #[must_use]
    pub fn requested(&self) -> u64 {
        self.demand.get()
    }

    /// Marks upstream done with an optional final value.
    ///
    /// `finish` is eventually called exactly once: with `Some(value)` when
    /// demand for it exists, or with `None` right away when there is no value.
    pub fn complete(&self, tail: Option<T>, finish: impl FnMut(Option<T>)) {
        if let Some(tail) = tail {
            self.tail.put(tail);
        }
        self.done.store(true, Ordering::Release);
        self.drain(finish);
    }

    /// Abandons the tail; `finish` will never be called.
    pub fn cancel(&self) {
        self.finished.store(true, Ordering::Release);
        self.tail.clear();
    }

    /// Returns `true` once the tail was emitted or abandoned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn drain(&self, mut finish: impl FnMut(Option<T>)) {
        self.serializer.drain(|| {
            if self.finished.load(Ordering::Acquire) || !self.done.load(Ordering::Acquire) {
                return;
            }

            let ready = self.tail.take();
            if self.demand.get() == 0 {
                if let Some(tail) = ready {
                    self.tail.put(tail);
                    return;
                }
            }

            if !self.finished.swap(true, Ordering::AcqRel) {
                if ready.is_some() {
                    self.demand.produced(1);
                }
                finish(ready);
            }
        });
    }
}

impl<T> Default for DeferredTail<T> {
    fn default() -> Self {
        Self::new()
    }
}
