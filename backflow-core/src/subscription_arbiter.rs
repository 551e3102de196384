// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A switchable upstream handle that carries demand across switches.

use crate::atomic_slot::AtomicSlot;
use crate::demand::{add_cap, validate, UNBOUNDED};
use crate::drain::DrainSerializer;
use crate::logging::trace;
use crate::protocol::Subscription;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Presents a single [`Subscription`] downstream while the upstream behind it
/// is swapped out, e.g. on every resubscription of a retry.
///
/// The arbiter remembers how much demand downstream granted and how much of it
/// was consumed. A new upstream is immediately asked for the remainder, so no
/// item is lost or delivered beyond demand across a switch.
///
/// Requests, productions, switches and cancellation are recorded in atomic
/// "missed" fields and applied by whichever caller owns the drain loop, so a
/// switch triggered from inside an upstream call never nests.
///
/// ```
/// use backflow_core::{Subscription, SubscriptionArbiter};
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// struct Counting(AtomicU64);
///
/// impl Subscription for Counting {
///     fn request(&self, n: u64) {
///         self.0.fetch_add(n, Ordering::SeqCst);
///     }
///     fn cancel(&self) {}
/// }
///
/// let arbiter = SubscriptionArbiter::new();
/// arbiter.request(5);
/// arbiter.produced(2);
///
/// let upstream = Arc::new(Counting(AtomicU64::new(0)));
/// arbiter.set_subscription(upstream.clone());
/// assert_eq!(upstream.0.load(Ordering::SeqCst), 3);
/// ```
pub struct SubscriptionArbiter {
    /// Touched only by the drain owner.
    current: AtomicSlot<Arc<dyn Subscription>>,
    requested: AtomicU64,
    missed_subscription: AtomicSlot<Arc<dyn Subscription>>,
    missed_requested: AtomicU64,
    missed_produced: AtomicU64,
    cancelled: AtomicBool,
    serializer: DrainSerializer,
}

impl SubscriptionArbiter {
    /// Creates an arbiter with no upstream and no demand.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: AtomicSlot::new(),
            requested: AtomicU64::new(0),
            missed_subscription: AtomicSlot::new(),
            missed_requested: AtomicU64::new(0),
            missed_produced: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            serializer: DrainSerializer::new(),
        }
    }

    /// Switches to a new upstream and requests the outstanding demand from it.
    ///
    /// The previous upstream is dropped, not cancelled: callers switch only
    /// after the previous one terminated. If the arbiter is cancelled the new
    /// upstream is cancelled instead.
    pub fn set_subscription(&self, subscription: Arc<dyn Subscription>) {
        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        self.missed_subscription.put(subscription);
        self.drain();
    }

    /// Records `n` items delivered downstream by the current upstream.
    pub fn produced(&self, n: u64) {
        accumulate(&self.missed_produced, n);
        self.drain();
    }

    /// Demand granted downstream and not yet delivered.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns `true` once [`cancel`](Subscription::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn drain(&self) {
        self.serializer.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(current) = self.current.take() {
                current.cancel();
            }
            if let Some(missed) = self.missed_subscription.take() {
                missed.cancel();
            }
            return;
        }

        let missed_requested = self.missed_requested.swap(0, Ordering::AcqRel);
        let missed_produced = self.missed_produced.swap(0, Ordering::AcqRel);
        let switched = self.missed_subscription.take();

        let mut requested = self.requested.load(Ordering::Acquire);
        if requested != UNBOUNDED {
            requested = add_cap(requested, missed_requested);
            if requested != UNBOUNDED {
                requested = requested.saturating_sub(missed_produced);
            }
        }
        self.requested.store(requested, Ordering::Release);

        match switched {
            Some(next) => {
                self.current.put(next.clone());
                if requested > 0 {
                    trace!("arbiter switched upstream, re-requesting {}", requested);
                    next.request(requested);
                }
            }
            None if missed_requested > 0 => {
                if let Some(current) = self.current.take() {
                    self.current.put(current.clone());
                    current.request(missed_requested);
                }
            }
            None => {}
        }
    }
}

fn accumulate(counter: &AtomicU64, n: u64) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(add_cap(current, n))
    });
}

impl Subscription for SubscriptionArbiter {
    fn request(&self, n: u64) {
        if !validate(n) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        accumulate(&self.missed_requested, n);
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain();
    }
}

impl Default for SubscriptionArbiter {
    fn default() -> Self {
        Self::new()
    }
}
