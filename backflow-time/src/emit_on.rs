// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Moving emissions onto a scheduler.
//!
//! Upstream items are prefetched into a bounded queue and handed to the
//! subscriber from a task the scheduler runs, never from the upstream
//! producer's own call stack. One drain task is in flight at a time; signals
//! that arrive while it is scheduled or running are picked up by it.
//!
//! Terminal signals keep their place: completion and errors are delivered
//! after the items queued before them.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::sources::from_iter;
//! use backflow_test_utils::{ManualScheduler, TestSubscriber};
//! use backflow_time::prelude::*;
//!
//! let scheduler = ManualScheduler::new();
//! let subscriber = TestSubscriber::<i32>::unbounded();
//! from_iter(vec![1, 2])
//!     .emit_on(scheduler.clone(), 16)
//!     .subscribe(subscriber.clone());
//!
//! assert_eq!(subscriber.item_count(), 0);
//! scheduler.run_due();
//! subscriber.assert_values(&[1, 2]);
//! subscriber.assert_complete();
//! ```

use crate::logging::{debug, trace};
use backflow_core::{
    demand, AtomicSlot, Demand, DrainSerializer, FlowError, Offer, Publisher, ScheduledTask,
    Scheduler, Subscriber, Subscription, SubscriptionCell,
};
use concurrent_queue::ConcurrentQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Extension trait providing the `emit_on` operator.
pub trait EmitOnExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Delivers every signal from a task run by `scheduler`, prefetching up to
    /// `prefetch` items from upstream.
    ///
    /// # Panics
    ///
    /// Panics if `prefetch` is zero.
    fn emit_on<S: Scheduler>(self, scheduler: S, prefetch: usize) -> EmitOn<Self, S>;
}

impl<P, T> EmitOnExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn emit_on<S: Scheduler>(self, scheduler: S, prefetch: usize) -> EmitOn<Self, S> {
        assert!(prefetch > 0, "emit_on: prefetch must be positive");
        EmitOn {
            source: self,
            scheduler,
            prefetch,
        }
    }
}

/// Publisher returned by [`EmitOnExt::emit_on`].
#[derive(Debug, Clone)]
pub struct EmitOn<P, S> {
    source: P,
    scheduler: S,
    prefetch: usize,
}

impl<P, S> EmitOn<P, S> {
    #[must_use]
    pub fn prefetch(&self) -> usize {
        self.prefetch
    }
}

impl<P, S, T> Publisher<T> for EmitOn<P, S>
where
    P: Publisher<T>,
    S: Scheduler,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let engine = Arc::new_cyclic(|me| EmitOnEngine {
            me: me.clone(),
            downstream: subscriber,
            scheduler: self.scheduler.clone(),
            upstream: SubscriptionCell::new(),
            queue: ConcurrentQueue::bounded(self.prefetch),
            prefetch: self.prefetch,
            limit: self.prefetch - self.prefetch / 4,
            consumed: AtomicUsize::new(0),
            error: AtomicSlot::new(),
            task: AtomicSlot::new(),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            upstream_done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        self.source.subscribe(engine);
    }
}

struct EmitOnEngine<T, S> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    scheduler: S,
    upstream: SubscriptionCell,
    queue: ConcurrentQueue<T>,
    prefetch: usize,
    limit: usize,
    consumed: AtomicUsize,
    error: AtomicSlot<FlowError>,
    /// Handle of the drain task last handed to the scheduler.
    task: AtomicSlot<ScheduledTask>,
    demand: Demand,
    serializer: DrainSerializer,
    upstream_done: AtomicBool,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl<T: Send + 'static, S: Scheduler> EmitOnEngine<T, S> {
    /// Records a change; the first change since the last drain schedules one.
    fn schedule(&self) {
        if !self.serializer.try_enter() {
            return;
        }
        let me = self.me.clone();
        let task = self.scheduler.schedule_once(
            Duration::ZERO,
            Box::new(move || {
                if let Some(engine) = me.upgrade() {
                    engine.run();
                }
            }),
        );
        self.task.put(task);
        trace!("emit_on drain scheduled");
    }

    /// Body of the scheduled task.
    fn run(&self) {
        let mut missed = 1;
        loop {
            self.drain_pass();
            missed = self.serializer.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn drain_pass(&self) {
        loop {
            if self.terminated.load(Ordering::Acquire) {
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                while self.queue.pop().is_ok() {}
                return;
            }

            let done = self.upstream_done.load(Ordering::Acquire);
            if self.queue.is_empty() {
                if done {
                    self.terminate();
                }
                return;
            }
            if self.demand.get() == 0 {
                return;
            }
            let Ok(item) = self.queue.pop() else {
                return;
            };
            if self.downstream.try_on_next(item) == Offer::Delivered {
                self.demand.produced(1);
            }
            self.replenish();
        }
    }

    fn replenish(&self) {
        let consumed = self.consumed.load(Ordering::Relaxed) + 1;
        if consumed == self.limit {
            self.consumed.store(0, Ordering::Relaxed);
            if !self.upstream_done.load(Ordering::Acquire) {
                self.upstream.request(self.limit as u64);
            }
        } else {
            self.consumed.store(consumed, Ordering::Relaxed);
        }
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.error.take() {
            Some(error) => self.downstream.on_error(error),
            None => self.downstream.on_complete(),
        }
    }
}

impl<T: Send + 'static, S: Scheduler> Subscriber<T> for EmitOnEngine<T, S> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set_once(subscription) {
            return;
        }
        self.downstream.clone().on_subscribe(self.clone());
        self.upstream.request(self.prefetch as u64);
    }

    fn on_next(&self, item: T) {
        if self.upstream_done.load(Ordering::Acquire) {
            debug!("upstream item after termination dropped");
            return;
        }
        if self.queue.push(item).is_err() {
            self.upstream.cancel();
            self.error.put(FlowError::protocol_violation(
                "upstream emitted more items than requested",
            ));
            self.upstream_done.store(true, Ordering::Release);
        }
        self.schedule();
    }

    fn on_error(&self, error: FlowError) {
        if self.upstream_done.load(Ordering::Acquire) {
            debug!("upstream error after termination dropped: {}", error);
            return;
        }
        // Stored before the done flag so the drain task sees it with the flag.
        self.error.put(error);
        self.upstream_done.store(true, Ordering::Release);
        self.schedule();
    }

    fn on_complete(&self) {
        self.upstream_done.store(true, Ordering::Release);
        self.schedule();
    }
}

impl<T: Send + 'static, S: Scheduler> Subscription for EmitOnEngine<T, S> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.demand.add(n);
        self.schedule();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        if let Some(task) = self.task.take() {
            if task.cancel() {
                debug!("emit_on drain task released");
            }
        }
        while self.queue.pop().is_ok() {}
    }
}
