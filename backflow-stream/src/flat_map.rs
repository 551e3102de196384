// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bounded-concurrency merge of inner publishers.
//!
//! Every upstream item is mapped to an inner publisher. Up to
//! `max_concurrency` inner publishers run at once, each in its own slot with a
//! prefetch buffer, and their items are relayed into a single output under the
//! subscriber's demand.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::TestSubscriber;
//!
//! let subscriber = TestSubscriber::<i64>::unbounded();
//! from_iter(vec![1_i64, 10, 100])
//!     .flat_map(|x: i64| Ok(from_iter(vec![x, x + 1])))
//!     .subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[1, 2, 10, 11, 100, 101]);
//! subscriber.assert_complete();
//! ```
//!
//! # Slots and overflow
//!
//! With [`Overflow::Backpressure`] the upstream is asked for `max_concurrency`
//! items up front and for one more each time a slot frees up, so an upstream
//! item never waits long for a slot. With [`Overflow::SwitchOldest`] the
//! upstream is unbounded and a new item evicts the oldest active inner
//! publisher, discarding what it had buffered.
//!
//! # Ordering
//!
//! Only the order within one inner publisher is preserved.
//! [`DrainOrder::DepthFirst`] empties one slot as far as demand allows before
//! moving to the next; [`DrainOrder::RoundRobin`] takes one item per slot per
//! pass.
//!
//! # Errors
//!
//! By default the first failure (upstream, mapper or inner) cancels everything
//! and is delivered immediately. With `delay_error` every failure is collected
//! and delivered after all sequences have finished: a single error as is,
//! several as [`FlowError::Composite`].

use crate::config::{DrainOrder, FlatMapConfig, Overflow};
use crate::logging::{debug, trace};
use backflow_core::{
    demand, AtomicSlot, Demand, DrainSerializer, Flow, FlowError, Offer, Publisher, Result,
    Subscriber, Subscription, SubscriptionCell, UNBOUNDED,
};
use concurrent_queue::ConcurrentQueue;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Type-erased mapper from an upstream item to an inner publisher.
pub type Mapper<T, R> = Arc<dyn Fn(T) -> Result<Flow<R>> + Send + Sync>;

/// Extension trait providing the merge operators.
pub trait FlatMapExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Merges the mapped inner publishers depth-first, up to 32 at a time.
    fn flat_map<R, Q, F>(self, mapper: F) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static;

    /// Merges the mapped inner publishers as configured.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    fn flat_map_with_config<R, Q, F>(self, mapper: F, config: FlatMapConfig) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static;

    /// Keeps at most `max_active` inner publishers, cancelling the oldest one
    /// when a new upstream item arrives.
    ///
    /// # Panics
    ///
    /// Panics if `max_active` is zero.
    fn switch_flat_map<R, Q, F>(self, mapper: F, max_active: usize) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static;

    /// Like [`flat_map`](Self::flat_map), combining every inner item with the
    /// upstream item it was mapped from.
    fn flat_map_with<U, R, Q, F, C>(self, mapper: F, combiner: C) -> FlatMap<Self, T, R>
    where
        T: Sync,
        U: Send + 'static,
        R: Send + 'static,
        Q: Publisher<U> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
        C: Fn(&T, U) -> Result<R> + Send + Sync + 'static;
}

impl<P, T> FlatMapExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn flat_map<R, Q, F>(self, mapper: F) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
    {
        FlatMap::new(self, erase(mapper), FlatMapConfig::sync())
    }

    fn flat_map_with_config<R, Q, F>(self, mapper: F, config: FlatMapConfig) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
    {
        if let Err(error) = config.validate() {
            panic!("flat_map_with_config: {error}");
        }
        FlatMap::new(self, erase(mapper), config)
    }

    fn switch_flat_map<R, Q, F>(self, mapper: F, max_active: usize) -> FlatMap<Self, T, R>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
    {
        assert!(max_active >= 1, "switch_flat_map: max_active must be at least 1");
        FlatMap::new(self, erase(mapper), FlatMapConfig::switching(max_active))
    }

    fn flat_map_with<U, R, Q, F, C>(self, mapper: F, combiner: C) -> FlatMap<Self, T, R>
    where
        T: Sync,
        U: Send + 'static,
        R: Send + 'static,
        Q: Publisher<U> + 'static,
        F: Fn(&T) -> Result<Q> + Send + Sync + 'static,
        C: Fn(&T, U) -> Result<R> + Send + Sync + 'static,
    {
        let combiner = Arc::new(combiner);
        let mapper: Mapper<T, R> = Arc::new(move |item: T| {
            let inner = mapper(&item)?;
            Ok(Arc::new(Combined {
                inner,
                outer: Arc::new(item),
                combiner: combiner.clone(),
                _item: PhantomData::<fn() -> U>,
            }) as Flow<R>)
        });
        FlatMap::new(self, mapper, FlatMapConfig::sync())
    }
}

fn erase<T, R, Q, F>(mapper: F) -> Mapper<T, R>
where
    Q: Publisher<R> + 'static,
    F: Fn(T) -> Result<Q> + Send + Sync + 'static,
{
    Arc::new(move |item: T| mapper(item).map(|inner| Arc::new(inner) as Flow<R>))
}

/// Publisher returned by the [`FlatMapExt`] methods.
pub struct FlatMap<P, T, R> {
    source: P,
    mapper: Mapper<T, R>,
    config: FlatMapConfig,
}

impl<P, T, R> FlatMap<P, T, R> {
    fn new(source: P, mapper: Mapper<T, R>, config: FlatMapConfig) -> Self {
        Self {
            source,
            mapper,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlatMapConfig {
        &self.config
    }
}

impl<P, T, R> Publisher<R> for FlatMap<P, T, R>
where
    P: Publisher<T>,
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let config = self.config;
        let pending = match config.overflow() {
            Overflow::Backpressure => ConcurrentQueue::bounded(config.max_concurrency()),
            Overflow::SwitchOldest => ConcurrentQueue::unbounded(),
        };
        let engine = Arc::new_cyclic(|me| MergeEngine {
            me: me.clone(),
            downstream: subscriber,
            mapper: self.mapper.clone(),
            config,
            upstream: SubscriptionCell::new(),
            pending,
            slots: AtomicSlot::with((0..config.max_concurrency()).map(|_| None).collect()),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            upstream_done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            errors: ConcurrentQueue::unbounded(),
            next_seq: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
        });
        self.source.subscribe(engine);
    }
}

trait MergeParent<R>: Send + Sync {
    fn signal(&self);

    fn inner_failed(&self, error: FlowError);
}

type Slot<R> = Option<Arc<InnerSubscriber<R>>>;

struct MergeEngine<T, R> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<R>>,
    mapper: Mapper<T, R>,
    config: FlatMapConfig,
    upstream: SubscriptionCell,
    /// Upstream items waiting for a free slot.
    pending: ConcurrentQueue<T>,
    /// The drain owner moves the slot table out for the length of a pass.
    slots: AtomicSlot<Vec<Slot<R>>>,
    demand: Demand,
    serializer: DrainSerializer,
    upstream_done: AtomicBool,
    cancelled: AtomicBool,
    terminated: AtomicBool,
    failed: AtomicBool,
    errors: ConcurrentQueue<FlowError>,
    next_seq: AtomicU64,
    cursor: AtomicUsize,
}

impl<T, R> MergeEngine<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn drain(&self) {
        self.serializer.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        let mut slots = self.slots.take().unwrap_or_default();
        self.run_pass(&mut slots);
        self.slots.put(slots);
    }

    fn run_pass(&self, slots: &mut Vec<Slot<R>>) {
        loop {
            if self.terminated.load(Ordering::Acquire) {
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                self.teardown(slots);
                return;
            }
            if self.fails_fast() {
                self.upstream.cancel();
                self.teardown(slots);
                self.terminate();
                return;
            }

            let claimed = self.claim_slots(slots);
            let emitted = self.emit_ready(slots);
            let released = self.release_finished(slots);

            if self.is_exhausted(slots) {
                self.terminate();
                return;
            }
            if !(claimed || emitted || released) {
                return;
            }
        }
    }

    fn fails_fast(&self) -> bool {
        !self.config.delay_error() && self.failed.load(Ordering::Acquire)
    }

    fn record_error(&self, error: FlowError) {
        // The error queue is unbounded and never closed.
        let _ = self.errors.push(error);
        self.failed.store(true, Ordering::Release);
    }

    fn claim_slots(&self, slots: &mut [Slot<R>]) -> bool {
        let mut claimed = false;
        while !self.pending.is_empty() && !self.fails_fast() {
            let Some(index) = self.free_slot(slots) else {
                break;
            };
            let Ok(item) = self.pending.pop() else {
                break;
            };
            claimed = true;

            match (self.mapper)(item) {
                Ok(publisher) => {
                    let parent: Weak<dyn MergeParent<R>> = self.me.clone();
                    let inner = Arc::new(InnerSubscriber::new(
                        parent,
                        self.next_seq.fetch_add(1, Ordering::Relaxed),
                        self.config.prefetch(),
                        self.config.replenish_threshold(),
                    ));
                    slots[index] = Some(inner.clone());
                    trace!("merge slot {} claimed", index);
                    publisher.subscribe(inner);
                }
                Err(error) => {
                    debug!("mapper failed: {}", error);
                    self.upstream.cancel();
                    self.upstream_done.store(true, Ordering::Release);
                    while self.pending.pop().is_ok() {}
                    self.record_error(error);
                    break;
                }
            }
        }
        claimed
    }

    fn free_slot(&self, slots: &mut [Slot<R>]) -> Option<usize> {
        if let Some(index) = slots.iter().position(Option::is_none) {
            return Some(index);
        }
        match self.config.overflow() {
            Overflow::Backpressure => None,
            Overflow::SwitchOldest => {
                let index = slots
                    .iter()
                    .enumerate()
                    .filter_map(|(index, slot)| slot.as_ref().map(|inner| (index, inner.seq)))
                    .min_by_key(|&(_, seq)| seq)
                    .map(|(index, _)| index)?;
                let inner = slots[index].take()?;
                trace!("merge slot {} evicted", index);
                inner.cancel();
                Some(index)
            }
        }
    }

    fn emit_ready(&self, slots: &[Slot<R>]) -> bool {
        match self.config.drain_order() {
            DrainOrder::DepthFirst => self.emit_depth_first(slots),
            DrainOrder::RoundRobin => self.emit_round_robin(slots),
        }
    }

    fn emit_depth_first(&self, slots: &[Slot<R>]) -> bool {
        let mut emitted = false;
        for inner in slots.iter().flatten() {
            while self.can_emit() {
                match inner.poll() {
                    Some(item) => {
                        self.deliver(item);
                        emitted = true;
                    }
                    None => break,
                }
            }
        }
        emitted
    }

    fn emit_round_robin(&self, slots: &[Slot<R>]) -> bool {
        let count = slots.len();
        let mut emitted = false;
        loop {
            let start = self.cursor.load(Ordering::Relaxed);
            let mut progressed = false;
            for offset in 0..count {
                if !self.can_emit() {
                    return emitted;
                }
                let index = (start + offset) % count;
                let Some(inner) = &slots[index] else {
                    continue;
                };
                if let Some(item) = inner.poll() {
                    self.deliver(item);
                    self.cursor.store((index + 1) % count, Ordering::Relaxed);
                    progressed = true;
                    emitted = true;
                }
            }
            if !progressed {
                return emitted;
            }
        }
    }

    fn can_emit(&self) -> bool {
        self.demand.get() > 0 && !self.cancelled.load(Ordering::Acquire) && !self.fails_fast()
    }

    fn deliver(&self, item: R) {
        if self.downstream.try_on_next(item) == Offer::Delivered {
            self.demand.produced(1);
        }
    }

    fn release_finished(&self, slots: &mut [Slot<R>]) -> bool {
        let mut released = 0_u64;
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|inner| inner.is_finished()) {
                *slot = None;
                trace!("merge slot {} released", index);
                released += 1;
            }
        }

        if released > 0
            && self.config.overflow() == Overflow::Backpressure
            && !self.upstream_done.load(Ordering::Acquire)
        {
            self.upstream.request(released);
        }
        released > 0
    }

    fn is_exhausted(&self, slots: &[Slot<R>]) -> bool {
        self.upstream_done.load(Ordering::Acquire)
            && self.pending.is_empty()
            && slots.iter().all(Option::is_none)
    }

    fn teardown(&self, slots: &mut Vec<Slot<R>>) {
        for inner in mem::take(slots).into_iter().flatten() {
            inner.cancel();
        }
        while self.pending.pop().is_ok() {}
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let errors: Vec<FlowError> = std::iter::from_fn(|| self.errors.pop().ok()).collect();
        if errors.is_empty() {
            self.downstream.on_complete();
        } else {
            self.downstream.on_error(FlowError::from_errors(errors));
        }
    }
}

impl<T, R> MergeParent<R> for MergeEngine<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn signal(&self) {
        self.drain();
    }

    fn inner_failed(&self, error: FlowError) {
        self.record_error(error);
        self.drain();
    }
}

impl<T, R> Subscriber<T> for MergeEngine<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set_once(subscription) {
            return;
        }
        self.downstream.clone().on_subscribe(self.clone());
        let initial = match self.config.overflow() {
            Overflow::Backpressure => self.config.max_concurrency() as u64,
            Overflow::SwitchOldest => UNBOUNDED,
        };
        self.upstream.request(initial);
    }

    fn on_next(&self, item: T) {
        if self.upstream_done.load(Ordering::Acquire) {
            debug!("upstream item after termination dropped");
            return;
        }
        if self.pending.push(item).is_err() {
            self.upstream.cancel();
            self.upstream_done.store(true, Ordering::Release);
            self.record_error(FlowError::protocol_violation(
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
        self.record_error(error);
        self.drain();
    }

    fn on_complete(&self) {
        self.upstream_done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<T, R> Subscription for MergeEngine<T, R>
where
    T: Send + 'static,
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

/// Consumer of one inner publisher, buffering up to `prefetch` items.
struct InnerSubscriber<R> {
    parent: Weak<dyn MergeParent<R>>,
    seq: u64,
    queue: ConcurrentQueue<R>,
    upstream: SubscriptionCell,
    done: AtomicBool,
    prefetch: usize,
    limit: usize,
    consumed: AtomicUsize,
}

impl<R: Send + 'static> InnerSubscriber<R> {
    fn new(parent: Weak<dyn MergeParent<R>>, seq: u64, prefetch: usize, limit: usize) -> Self {
        Self {
            parent,
            seq,
            queue: ConcurrentQueue::bounded(prefetch),
            upstream: SubscriptionCell::new(),
            done: AtomicBool::new(false),
            prefetch,
            limit,
            consumed: AtomicUsize::new(0),
        }
    }

    /// Takes the next buffered item, replenishing upstream every `limit` items.
    fn poll(&self) -> Option<R> {
        let item = self.queue.pop().ok()?;
        let consumed = self.consumed.load(Ordering::Relaxed) + 1;
        if consumed == self.limit {
            self.consumed.store(0, Ordering::Relaxed);
            if !self.done.load(Ordering::Acquire) {
                self.upstream.request(self.limit as u64);
            }
        } else {
            self.consumed.store(consumed, Ordering::Relaxed);
        }
        Some(item)
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire) && self.queue.is_empty()
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
        while self.queue.pop().is_ok() {}
    }

    fn parent(&self) -> Option<Arc<dyn MergeParent<R>>> {
        self.parent.upgrade()
    }
}

impl<R: Send + 'static> Subscriber<R> for InnerSubscriber<R> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.upstream.request(self.prefetch as u64);
        }
    }

    fn on_next(&self, item: R) {
        if self.upstream.is_cancelled() || self.done.load(Ordering::Acquire) {
            return;
        }
        if self.queue.push(item).is_err() {
            self.upstream.cancel();
            self.done.store(true, Ordering::Release);
            if let Some(parent) = self.parent() {
                parent.inner_failed(FlowError::protocol_violation(
                    "inner publisher emitted more items than requested",
                ));
            }
            return;
        }
        if let Some(parent) = self.parent() {
            parent.signal();
        }
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(parent) = self.parent() {
            parent.inner_failed(error);
        }
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(parent) = self.parent() {
            parent.signal();
        }
    }
}

/// Inner publisher pairing each item with the upstream item it came from.
struct Combined<T, U, Q, C> {
    inner: Q,
    outer: Arc<T>,
    combiner: Arc<C>,
    _item: PhantomData<fn() -> U>,
}

impl<T, U, R, Q, C> Publisher<R> for Combined<T, U, Q, C>
where
    T: Send + Sync + 'static,
    U: Send + 'static,
    R: Send + 'static,
    Q: Publisher<U>,
    C: Fn(&T, U) -> Result<R> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        self.inner.subscribe(Arc::new(CombineSubscriber {
            downstream: subscriber,
            outer: self.outer.clone(),
            combiner: self.combiner.clone(),
            upstream: SubscriptionCell::new(),
            done: AtomicBool::new(false),
        }));
    }
}

struct CombineSubscriber<T, R, C> {
    downstream: Arc<dyn Subscriber<R>>,
    outer: Arc<T>,
    combiner: Arc<C>,
    upstream: SubscriptionCell,
    done: AtomicBool,
}

impl<T, R, C> CombineSubscriber<T, R, C> {
    fn fail(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        self.downstream.on_error(error);
    }
}

impl<T, U, R, C> Subscriber<U> for CombineSubscriber<T, R, C>
where
    T: Send + Sync + 'static,
    U: Send + 'static,
    R: Send + 'static,
    C: Fn(&T, U) -> Result<R> + Send + Sync + 'static,
{
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription.clone()) {
            self.downstream.clone().on_subscribe(subscription);
        }
    }

    fn on_next(&self, item: U) {
        if self.try_on_next(item) == Offer::Filtered {
            self.upstream.request(1);
        }
    }

    fn try_on_next(&self, item: U) -> Offer {
        if self.done.load(Ordering::Acquire) {
            return Offer::Delivered;
        }
        match (self.combiner)(&self.outer, item) {
            Ok(combined) => self.downstream.try_on_next(combined),
            Err(error) => {
                self.fail(error);
                Offer::Delivered
            }
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
