// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! One-at-a-time asynchronous mapping.
//!
//! Every upstream item is mapped to an inner publisher and only the first item
//! that publisher emits counts; the inner publisher is cancelled right after
//! it. Inner publishers run strictly one after another, in upstream order, so
//! the output keeps the order of the input. An inner publisher that completes
//! empty produces nothing for its upstream item.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::TestSubscriber;
//!
//! let subscriber = TestSubscriber::<i32>::unbounded();
//! from_iter(vec![1, 2])
//!     .map_async_with(|_: &i32| Ok(from_iter(vec![10, 20])), |outer, inner| Ok(outer * 100 + inner))
//!     .subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[110, 210]);
//! subscriber.assert_complete();
//! ```
//!
//! Upstream items are prefetched into a buffer of `buffer_size` entries
//! (128 by default) while they wait for their turn.

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::logging::{debug, trace};
use backflow_core::{
    demand, AtomicSlot, Demand, DrainSerializer, Flow, FlowError, Offer, Publisher, Result,
    Subscriber, Subscription, SubscriptionCell,
};
use concurrent_queue::ConcurrentQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

type AsyncMapper<T, U> = Arc<dyn Fn(&T) -> Result<Flow<U>> + Send + Sync>;
type Combiner<T, U, R> = Arc<dyn Fn(T, U) -> Result<Option<R>> + Send + Sync>;

/// Extension trait providing the one-at-a-time async mapping operators.
pub trait MapAsyncExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Emits the first item of the publisher each upstream item maps to.
    fn map_async<R, Q, F>(self, mapper: F) -> MapAsync<Self, T, R, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static;

    /// Combines each upstream item with the first item of its inner publisher.
    fn map_async_with<U, R, Q, F, C>(self, mapper: F, combiner: C) -> MapAsync<Self, T, U, R>
    where
        U: Send + 'static,
        R: Send + 'static,
        Q: Publisher<U> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
        C: Fn(T, U) -> Result<R> + Send + Sync + 'static;

    /// Keeps the upstream items whose inner publisher first emits `true`.
    fn filter_async<Q, F>(self, predicate: F) -> MapAsync<Self, T, bool, T>
    where
        Q: Publisher<bool> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static;
}

impl<P, T> MapAsyncExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn map_async<R, Q, F>(self, mapper: F) -> MapAsync<Self, T, R, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
    {
        MapAsync::new(
            self,
            erase(mapper),
            Arc::new(|_: T, inner: R| -> Result<Option<R>> { Ok(Some(inner)) }),
        )
    }

    fn map_async_with<U, R, Q, F, C>(self, mapper: F, combiner: C) -> MapAsync<Self, T, U, R>
    where
        U: Send + 'static,
        R: Send + 'static,
        Q: Publisher<U> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
        C: Fn(T, U) -> Result<R> + Send + Sync + 'static,
    {
        MapAsync::new(
            self,
            erase(mapper),
            Arc::new(move |outer: T, inner: U| combiner(outer, inner).map(Some)),
        )
    }

    fn filter_async<Q, F>(self, predicate: F) -> MapAsync<Self, T, bool, T>
    where
        Q: Publisher<bool> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
    {
        MapAsync::new(
            self,
            erase(predicate),
            Arc::new(|outer: T, keep: bool| -> Result<Option<T>> { Ok(keep.then_some(outer)) }),
        )
    }
}

fn erase<T, U, Q, F>(mapper: F) -> AsyncMapper<T, U>
where
    Q: Publisher<U> + 'static,
    F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
{
    Arc::new(move |item: &T| mapper(item).map(|inner| Arc::new(inner) as Flow<U>))
}

/// Publisher returned by the [`MapAsyncExt`] methods.
pub struct MapAsync<P, T, U, R> {
    source: P,
    mapper: AsyncMapper<T, U>,
    combiner: Combiner<T, U, R>,
    buffer_size: usize,
}

impl<P, T, U, R> MapAsync<P, T, U, R> {
    fn new(source: P, mapper: AsyncMapper<T, U>, combiner: Combiner<T, U, R>) -> Self {
        Self {
            source,
            mapper,
            combiner,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Sets how many upstream items are prefetched while waiting for their turn.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "map_async: buffer_size must be positive");
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl<P, T, U, R> Publisher<R> for MapAsync<P, T, U, R>
where
    P: Publisher<T>,
    T: Send + 'static,
    U: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let engine = Arc::new_cyclic(|me| AsyncMapEngine {
            me: me.clone(),
            downstream: subscriber,
            mapper: self.mapper.clone(),
            combiner: self.combiner.clone(),
            upstream: SubscriptionCell::new(),
            queue: ConcurrentQueue::bounded(self.buffer_size),
            prefetch: self.buffer_size,
            limit: self.buffer_size - self.buffer_size / 4,
            consumed: AtomicUsize::new(0),
            inner: AtomicSlot::new(),
            outer: AtomicSlot::new(),
            ready: AtomicSlot::new(),
            error: AtomicSlot::new(),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            upstream_done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        self.source.subscribe(engine);
    }
}

trait InnerParent: Send + Sync {
    fn signal(&self);
}

struct AsyncMapEngine<T, U, R> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<R>>,
    mapper: AsyncMapper<T, U>,
    combiner: Combiner<T, U, R>,
    upstream: SubscriptionCell,
    /// Upstream items waiting for their turn.
    queue: ConcurrentQueue<T>,
    prefetch: usize,
    limit: usize,
    consumed: AtomicUsize,
    /// The running inner subscriber and the upstream item it was mapped from.
    inner: AtomicSlot<Arc<FirstSubscriber<U>>>,
    outer: AtomicSlot<T>,
    /// A combined result waiting for downstream demand.
    ready: AtomicSlot<R>,
    error: AtomicSlot<FlowError>,
    demand: Demand,
    serializer: DrainSerializer,
    upstream_done: AtomicBool,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl<T, U, R> AsyncMapEngine<T, U, R>
where
    T: Send + 'static,
    U: Send + 'static,
    R: Send + 'static,
{
    fn drain(&self) {
        self.serializer.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        loop {
            if self.terminated.load(Ordering::Acquire) {
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                self.teardown();
                return;
            }
            if let Some(error) = self.error.take() {
                self.fail(error);
                return;
            }

            if let Some(result) = self.ready.take() {
                if self.demand.get() == 0 {
                    self.ready.put(result);
                    return;
                }
                if self.downstream.try_on_next(result) == Offer::Delivered {
                    self.demand.produced(1);
                }
                continue;
            }

            if let Some(inner) = self.inner.take() {
                if !inner.is_done() {
                    self.inner.put(inner);
                    return;
                }
                if let Some(error) = inner.error.take() {
                    self.fail(error);
                    return;
                }
                let Some(outer) = self.outer.take() else {
                    continue;
                };
                if let Some(value) = inner.value.take() {
                    match (self.combiner)(outer, value) {
                        Ok(Some(result)) => {
                            self.ready.put(result);
                        }
                        Ok(None) => trace!("async result filtered out"),
                        Err(error) => {
                            self.fail(error);
                            return;
                        }
                    }
                }
                continue;
            }

            match self.queue.pop() {
                Ok(item) => {
                    self.replenish();
                    if let Err(error) = self.start(item) {
                        debug!("async mapper failed: {}", error);
                        self.fail(error);
                        return;
                    }
                }
                Err(_) => {
                    if self.upstream_done.load(Ordering::Acquire) {
                        self.terminate(None);
                    }
                    return;
                }
            }
        }
    }

    fn start(&self, item: T) -> Result<()> {
        let publisher = (self.mapper)(&item)?;
        let parent: Weak<dyn InnerParent> = self.me.clone();
        let inner = Arc::new(FirstSubscriber::new(parent));
        self.outer.put(item);
        self.inner.put(inner.clone());
        // A synchronous inner signals back here; the serializer re-runs the pass.
        publisher.subscribe(inner);
        Ok(())
    }

    /// Asks upstream for more once `limit` queued items have been taken.
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

    fn fail(&self, error: FlowError) {
        self.upstream.cancel();
        self.teardown();
        self.terminate(Some(error));
    }

    fn teardown(&self) {
        if let Some(inner) = self.inner.take() {
            inner.cancel();
        }
        self.outer.clear();
        self.ready.clear();
        while self.queue.pop().is_ok() {}
    }

    fn terminate(&self, error: Option<FlowError>) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        match error {
            Some(error) => self.downstream.on_error(error),
            None => self.downstream.on_complete(),
        }
    }
}

impl<T, U, R> InnerParent for AsyncMapEngine<T, U, R>
where
    T: Send + 'static,
    U: Send + 'static,
    R: Send + 'static,
{
    fn signal(&self) {
        self.drain();
    }
}

impl<T, U, R> Subscriber<T> for AsyncMapEngine<T, U, R>
where
    T: Send + 'static,
    U: Send + 'static,
    R: Send + 'static,
{
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
            self.upstream_done.store(true, Ordering::Release);
            self.error.put(FlowError::protocol_violation(
                "upstream emitted more items than requested",
            ));
        }
        self.drain();
    }

    fn on_error(&self, error: FlowError) {
        if self.upstream_done.swap(true, Ordering::AcqRel) {
            debug!("upstream error after termination dropped: {}", error);
            return;
        }
        self.error.put(error);
        self.drain();
    }

    fn on_complete(&self) {
        self.upstream_done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<T, U, R> Subscription for AsyncMapEngine<T, U, R>
where
    T: Send + 'static,
    U: Send + 'static,
    R: Send + 'static,
{
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
        self.upstream.cancel();
        self.drain();
    }
}

/// Takes the first item of an inner publisher and cancels it.
struct FirstSubscriber<U> {
    parent: Weak<dyn InnerParent>,
    upstream: SubscriptionCell,
    value: AtomicSlot<U>,
    error: AtomicSlot<FlowError>,
    done: AtomicBool,
}

impl<U: Send + 'static> FirstSubscriber<U> {
    fn new(parent: Weak<dyn InnerParent>) -> Self {
        Self {
            parent,
            upstream: SubscriptionCell::new(),
            value: AtomicSlot::new(),
            error: AtomicSlot::new(),
            done: AtomicBool::new(false),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
    }

    fn finish(&self) {
        if let Some(parent) = self.parent.upgrade() {
            parent.signal();
        }
    }
}

impl<U: Send + 'static> Subscriber<U> for FirstSubscriber<U> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.upstream.request(1);
        }
    }

    fn on_next(&self, item: U) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        // The value is stored before `done` flips so the drain owner sees both.
        self.value.put(item);
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        self.finish();
    }

    fn on_error(&self, error: FlowError) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        self.error.put(error);
        if !self.done.swap(true, Ordering::AcqRel) {
            self.finish();
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.finish();
        }
    }
}
