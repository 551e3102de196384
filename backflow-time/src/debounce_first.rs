// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Leading-edge debounce.
//!
//! An item passes when at least `timeout` has elapsed since the previous
//! upstream item, whether that one passed or not. A steady burst therefore
//! lets only its first item through, and the gate reopens after a quiet
//! period of `timeout`.
//!
//! The scheduler only supplies the clock: nothing is ever delayed, and
//! terminal signals pass through at once. Dropped items are reported as
//! [`Offer::Filtered`] so the upstream can replace them without waiting for
//! new demand.

use crate::logging::trace;
use backflow_core::{
    demand, AtomicSlot, FlowError, Offer, Publisher, Scheduler, Subscriber, Subscription,
    SubscriptionCell,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Extension trait providing the `debounce_first` operator.
pub trait DebounceFirstExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Emits an item, then drops items until `timeout` passes without any.
    ///
    /// ```
    /// use backflow_core::Publisher;
    /// use backflow_test_utils::{ManualPublisher, ManualScheduler, TestSubscriber};
    /// use backflow_time::prelude::*;
    /// use std::time::Duration;
    ///
    /// let scheduler = ManualScheduler::new();
    /// let source = ManualPublisher::<i32>::new();
    /// let subscriber = TestSubscriber::<i32>::unbounded();
    /// source
    ///     .clone()
    ///     .debounce_first(Duration::from_millis(50), scheduler.clone())
    ///     .subscribe(subscriber.clone());
    ///
    /// source.emit(1);
    /// scheduler.advance_by(Duration::from_millis(30));
    /// source.emit(2);
    /// scheduler.advance_by(Duration::from_millis(50));
    /// source.emit(3);
    ///
    /// subscriber.assert_values(&[1, 3]);
    /// ```
    fn debounce_first<S: Scheduler>(self, timeout: Duration, scheduler: S) -> DebounceFirst<Self, S>;
}

impl<P, T> DebounceFirstExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn debounce_first<S: Scheduler>(self, timeout: Duration, scheduler: S) -> DebounceFirst<Self, S> {
        DebounceFirst {
            source: self,
            timeout,
            scheduler,
        }
    }
}

/// Publisher returned by [`DebounceFirstExt::debounce_first`].
#[derive(Debug, Clone)]
pub struct DebounceFirst<P, S> {
    source: P,
    timeout: Duration,
    scheduler: S,
}

impl<P, S, T> Publisher<T> for DebounceFirst<P, S>
where
    P: Publisher<T>,
    S: Scheduler,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(DebounceFirstSubscriber {
            downstream: subscriber,
            timeout: self.timeout,
            scheduler: self.scheduler.clone(),
            upstream: SubscriptionCell::new(),
            last_received: AtomicSlot::new(),
            done: AtomicBool::new(false),
        }));
    }
}

struct DebounceFirstSubscriber<T, S: Scheduler> {
    downstream: Arc<dyn Subscriber<T>>,
    timeout: Duration,
    scheduler: S,
    upstream: SubscriptionCell,
    last_received: AtomicSlot<S::Instant>,
    done: AtomicBool,
}

impl<T: Send + 'static, S: Scheduler> DebounceFirstSubscriber<T, S> {
    /// Records the arrival and reports whether the gate was open.
    fn admit(&self) -> bool {
        let now = self.scheduler.now();
        let previous = self.last_received.put(now);
        previous.map_or(true, |last| now >= last + self.timeout)
    }
}

impl<T: Send + 'static, S: Scheduler> Subscriber<T> for DebounceFirstSubscriber<T, S> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.downstream.clone().on_subscribe(self.clone());
        }
    }

    fn on_next(&self, item: T) {
        if self.try_on_next(item) == Offer::Filtered {
            self.upstream.request(1);
        }
    }

    fn try_on_next(&self, item: T) -> Offer {
        if self.done.load(Ordering::Acquire) {
            return Offer::Delivered;
        }
        if self.admit() {
            self.downstream.try_on_next(item)
        } else {
            trace!("debounced item dropped");
            Offer::Filtered
        }
    }

    fn on_error(&self, error: FlowError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.downstream.on_complete();
        }
    }
}

impl<T: Send + 'static, S: Scheduler> Subscription for DebounceFirstSubscriber<T, S> {
    fn request(&self, n: u64) {
        if demand::validate(n) {
            self.upstream.request(n);
        }
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
    }
}
