// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A buffered, single-subscriber relay.
//!
//! The producer side pushes items with [`UnicastProcessor::emit`] at any time,
//! whether or not a subscriber is attached yet; items are queued until the
//! subscriber requests them. Window operators hand each one out as a
//! [`Segment`].

use crate::logging::{debug, warn};
use backflow_core::protocol::fail_empty;
use backflow_core::{
    demand, AtomicSlot, Demand, DrainSerializer, FlowError, Offer, Publisher, Subscriber,
    Subscription,
};
use concurrent_queue::ConcurrentQueue;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type TerminateHook = Box<dyn FnOnce() + Send>;

pub struct UnicastProcessor<T> {
    queue: ConcurrentQueue<T>,
    capacity_hint: usize,
    /// Moved out by the drain owner for the length of a pass.
    downstream: AtomicSlot<Arc<dyn Subscriber<T>>>,
    subscribed: AtomicBool,
    demand: Demand,
    serializer: DrainSerializer,
    done: AtomicBool,
    error: AtomicSlot<FlowError>,
    cancelled: AtomicBool,
    terminated: AtomicBool,
    on_terminate: AtomicSlot<TerminateHook>,
}

impl<T: Send + 'static> UnicastProcessor<T> {
    /// Creates a processor whose buffer is expected to hold about `capacity_hint` items.
    pub fn new(capacity_hint: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: ConcurrentQueue::unbounded(),
            capacity_hint,
            downstream: AtomicSlot::new(),
            subscribed: AtomicBool::new(false),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            done: AtomicBool::new(false),
            error: AtomicSlot::new(),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            on_terminate: AtomicSlot::new(),
        })
    }

    /// Like [`new`](Self::new), running `hook` exactly once when the processor
    /// is completed, failed or cancelled by its subscriber.
    pub fn with_on_terminate(capacity_hint: usize, hook: impl FnOnce() + Send + 'static) -> Arc<Self> {
        let processor = Self::new(capacity_hint);
        processor.on_terminate.put(Box::new(hook));
        processor
    }

    #[must_use]
    pub fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    /// Publisher view of this processor.
    #[must_use]
    pub fn segment(self: &Arc<Self>) -> Segment<T> {
        Segment(self.clone())
    }

    /// Queues `item` for the subscriber. Ignored after termination or cancel.
    pub fn emit(&self, item: T) {
        if self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire) {
            debug!("item pushed into a closed processor dropped");
            return;
        }
        // The queue is unbounded and never closed, so push cannot fail.
        let _ = self.queue.push(item);
        self.drain();
    }

    pub fn complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.run_on_terminate();
        self.drain();
    }

    pub fn error(&self, error: FlowError) {
        if self.done.load(Ordering::Acquire) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        self.error.put(error);
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.run_on_terminate();
        self.drain();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Number of buffered, not yet delivered items.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    fn attach(self: &Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            warn!("unicast processor allows a single subscriber");
            fail_empty(
                subscriber,
                FlowError::protocol_violation("unicast processor allows only one subscriber"),
            );
            return;
        }
        subscriber.clone().on_subscribe(self.clone());
        // The next drain pass drops it again if the handshake cancelled.
        self.downstream.put(subscriber);
        self.drain();
    }

    fn run_on_terminate(&self) {
        if let Some(hook) = self.on_terminate.take() {
            hook();
        }
    }

    fn drain(&self) {
        self.serializer.drain(|| {
            let Some(downstream) = self.downstream.take() else {
                if self.cancelled.load(Ordering::Acquire) {
                    while self.queue.pop().is_ok() {}
                }
                return;
            };
            if self.emit_ready(&downstream) {
                self.downstream.put(downstream);
            }
        });
    }

    /// Runs one pass; returns `false` once the subscriber must be released.
    fn emit_ready(&self, downstream: &Arc<dyn Subscriber<T>>) -> bool {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                while self.queue.pop().is_ok() {}
                return false;
            }

            let done = self.done.load(Ordering::Acquire);
            let empty = self.queue.is_empty();
            if done && empty {
                self.finish(downstream);
                return false;
            }
            if empty || self.demand.get() == 0 {
                return true;
            }

            if let Ok(item) = self.queue.pop() {
                if downstream.try_on_next(item) == Offer::Delivered {
                    self.demand.produced(1);
                }
            }
        }
    }

    fn finish(&self, downstream: &Arc<dyn Subscriber<T>>) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.error.take() {
            Some(error) => downstream.on_error(error),
            None => downstream.on_complete(),
        }
    }
}

impl<T: Send + 'static> Subscription for UnicastProcessor<T> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.demand.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.run_on_terminate();
        self.drain();
    }
}

impl<T> fmt::Debug for UnicastProcessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnicastProcessor")
            .field("buffered", &self.queue.len())
            .field("done", &self.done.load(Ordering::Relaxed))
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A window emitted by the segmentation engine.
///
/// Accepts a single subscriber; items delivered before subscription are
/// buffered.
pub struct Segment<T>(Arc<UnicastProcessor<T>>);

impl<T> Clone for Segment<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Segment").field(&self.0).finish()
    }
}

impl<T: Send + 'static> Segment<T> {
    /// Items buffered in this segment and not yet delivered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.0.buffered()
    }
}

impl<T: Send + 'static> Publisher<T> for Segment<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.0.attach(subscriber);
    }
}
