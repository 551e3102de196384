// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Re-timing of emissions so consecutive items are spaced apart.
//!
//! Every upstream item is scheduled for `max(arrival, previous + between)`,
//! the first one for `arrival + initial_delay`. Items waiting for their slot
//! sit in an unbounded queue; demand is passed straight through to the
//! upstream, so the queue never holds more than the subscriber asked for.
//!
//! Completion is delivered after the last item. An error is delivered at once,
//! discarding the queued items, unless `delay_error` is set, in which case it
//! is queued like completion.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::sources::from_iter;
//! use backflow_test_utils::{ManualScheduler, TestSubscriber};
//! use backflow_time::prelude::*;
//! use std::time::Duration;
//!
//! let scheduler = ManualScheduler::new();
//! let subscriber = TestSubscriber::<i32>::unbounded();
//! from_iter(vec![1, 2, 3])
//!     .spanout(Duration::ZERO, Duration::from_millis(100), scheduler.clone(), false)
//!     .subscribe(subscriber.clone());
//!
//! scheduler.run_due();
//! subscriber.assert_values(&[1]);
//! scheduler.advance_by(Duration::from_millis(200));
//! subscriber.assert_values(&[1, 2, 3]);
//! subscriber.assert_complete();
//! ```

use crate::logging::{debug, trace};
use backflow_core::{
    demand, AtomicSlot, DrainSerializer, FlowError, Publisher, ScheduledTask, Scheduler,
    Subscriber, Subscription, SubscriptionCell,
};
use concurrent_queue::ConcurrentQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Extension trait providing the `spanout` operator.
pub trait SpanoutExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Delays items so that they are at least `between_delay` apart, the
    /// first one by `initial_delay`.
    fn spanout<S: Scheduler>(
        self,
        initial_delay: Duration,
        between_delay: Duration,
        scheduler: S,
        delay_error: bool,
    ) -> Spanout<Self, S>;
}

impl<P, T> SpanoutExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn spanout<S: Scheduler>(
        self,
        initial_delay: Duration,
        between_delay: Duration,
        scheduler: S,
        delay_error: bool,
    ) -> Spanout<Self, S> {
        Spanout {
            source: self,
            initial_delay,
            between_delay,
            scheduler,
            delay_error,
        }
    }
}

/// Publisher returned by [`SpanoutExt::spanout`].
#[derive(Debug, Clone)]
pub struct Spanout<P, S> {
    source: P,
    initial_delay: Duration,
    between_delay: Duration,
    scheduler: S,
    delay_error: bool,
}

impl<P, S, T> Publisher<T> for Spanout<P, S>
where
    P: Publisher<T>,
    S: Scheduler,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let engine = Arc::new_cyclic(|me| SpanoutEngine {
            me: me.clone(),
            downstream: subscriber,
            scheduler: self.scheduler.clone(),
            initial_delay: self.initial_delay,
            between_delay: self.between_delay,
            delay_error: self.delay_error,
            upstream: SubscriptionCell::new(),
            queue: ConcurrentQueue::unbounded(),
            head: AtomicSlot::new(),
            last_due: AtomicSlot::new(),
            armed: AtomicU64::new(NOT_ARMED),
            next_timer: AtomicU64::new(NOT_ARMED + 1),
            timer: AtomicSlot::new(),
            urgent: AtomicSlot::new(),
            serializer: DrainSerializer::new(),
            upstream_done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        self.source.subscribe(engine);
    }
}

enum Signal<T> {
    Item(T),
    Error(FlowError),
    Complete,
}

const NOT_ARMED: u64 = 0;

struct SpanoutEngine<T, S: Scheduler> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    scheduler: S,
    initial_delay: Duration,
    between_delay: Duration,
    delay_error: bool,
    upstream: SubscriptionCell,
    queue: ConcurrentQueue<(S::Instant, Signal<T>)>,
    /// Queue head popped by the drain owner and waiting for its due time.
    head: AtomicSlot<(S::Instant, Signal<T>)>,
    /// Due time of the last spaced signal; producer side only.
    last_due: AtomicSlot<S::Instant>,
    /// Id of the single armed timer, due for the head of the queue.
    armed: AtomicU64,
    next_timer: AtomicU64,
    timer: AtomicSlot<ScheduledTask>,
    /// An error that bypasses the queue.
    urgent: AtomicSlot<FlowError>,
    serializer: DrainSerializer,
    upstream_done: AtomicBool,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl<T: Send + 'static, S: Scheduler> SpanoutEngine<T, S> {
    /// Queues `signal` for the next free slot.
    fn enqueue(&self, signal: Signal<T>, spaced: bool) {
        let now = self.scheduler.now();
        let last_due = self.last_due.take();
        let due = match last_due {
            None if spaced => now + self.initial_delay,
            None => now,
            Some(last) if spaced => (last + self.between_delay).max(now),
            Some(last) => last.max(now),
        };
        if spaced {
            self.last_due.put(due);
        } else if let Some(last) = last_due {
            self.last_due.put(last);
        }
        // The queue is unbounded and never closed.
        let _ = self.queue.push((due, signal));
        self.drain();
    }

    fn drain(&self) {
        self.serializer.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        loop {
            if self.terminated.load(Ordering::Acquire) {
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                self.clear();
                return;
            }

            if let Some(error) = self.urgent.take() {
                self.clear();
                self.terminated.store(true, Ordering::Release);
                self.downstream.on_error(error);
                return;
            }

            let Some((due, signal)) = self.head.take().or_else(|| self.queue.pop().ok()) else {
                return;
            };
            let now = self.scheduler.now();
            if due > now {
                self.head.put((due, signal));
                if self.armed.load(Ordering::Acquire) == NOT_ARMED {
                    let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
                    self.armed.store(id, Ordering::Release);
                    self.arm(id, due - now);
                }
                return;
            }

            match signal {
                Signal::Item(item) => {
                    trace!("spanout item released");
                    self.downstream.on_next(item);
                }
                Signal::Error(error) => {
                    self.terminated.store(true, Ordering::Release);
                    self.downstream.on_error(error);
                    return;
                }
                Signal::Complete => {
                    self.terminated.store(true, Ordering::Release);
                    self.downstream.on_complete();
                    return;
                }
            }
        }
    }

    /// Schedules the wake-up for the queue head. Only the drain owner arms.
    fn arm(&self, id: u64, delay: Duration) {
        let me = self.me.clone();
        let timer = self.scheduler.schedule_once(
            delay,
            Box::new(move || {
                if let Some(engine) = me.upgrade() {
                    engine.on_timer(id);
                }
            }),
        );
        // The timer may already have fired on another thread.
        if self.armed.load(Ordering::Acquire) == id {
            self.timer.put(timer);
        }
    }

    fn on_timer(&self, id: u64) {
        if self
            .armed
            .compare_exchange(id, NOT_ARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.timer.clear();
        }
        self.drain();
    }

    /// Drops queued signals and releases the pending timer.
    fn clear(&self) {
        while self.queue.pop().is_ok() {}
        self.head.clear();
        self.armed.store(NOT_ARMED, Ordering::Release);
        if let Some(timer) = self.timer.take() {
            if timer.cancel() {
                debug!("spanout timer released");
            }
        }
    }
}

impl<T: Send + 'static, S: Scheduler> Subscriber<T> for SpanoutEngine<T, S> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.downstream.clone().on_subscribe(self.clone());
        }
    }

    fn on_next(&self, item: T) {
        if self.upstream_done.load(Ordering::Acquire) {
            return;
        }
        self.enqueue(Signal::Item(item), true);
    }

    fn on_error(&self, error: FlowError) {
        if self.upstream_done.swap(true, Ordering::AcqRel) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        if self.delay_error {
            self.enqueue(Signal::Error(error), false);
        } else {
            self.urgent.put(error);
            self.drain();
        }
    }

    fn on_complete(&self) {
        if self.upstream_done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.enqueue(Signal::Complete, false);
    }
}

impl<T: Send + 'static, S: Scheduler> Subscription for SpanoutEngine<T, S> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        self.drain();
    }
}
