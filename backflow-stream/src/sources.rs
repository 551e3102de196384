// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Cold publishers built from values.
//!
//! Every source emits synchronously on the thread that requests, never beyond
//! demand, and restarts from scratch for each subscriber. Emission runs inside
//! a [`DrainSerializer`] loop, so a subscriber that requests from within
//! `on_next` does not recurse.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::sources::from_iter;
//! use backflow_test_utils::TestSubscriber;
//!
//! let source = from_iter(vec![1, 2, 3]);
//! let subscriber = TestSubscriber::<i32>::new(2);
//! source.subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[1, 2]);
//! subscriber.request(5);
//! subscriber.assert_values(&[1, 2, 3]);
//! subscriber.assert_complete();
//! ```

use backflow_core::protocol::{complete_empty, fail_empty};
use backflow_core::{
    demand, AtomicSlot, Demand, DrainSerializer, FlowError, Offer, Publisher, Result,
    Subscriber, Subscription,
};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Emits the items of a cloneable iterable, then completes.
#[derive(Debug, Clone)]
pub struct FromIter<I> {
    items: I,
}

/// Creates a publisher replaying `items` for each subscriber.
pub fn from_iter<I>(items: I) -> FromIter<I>
where
    I: IntoIterator + Clone + Send + Sync,
{
    FromIter { items }
}

/// Emits `count` consecutive integers starting at `start`.
pub fn range(start: i64, count: u64) -> FromIter<Range<i64>> {
    let end = i64::try_from(count)
        .ok()
        .and_then(|count| start.checked_add(count))
        .unwrap_or(i64::MAX);
    from_iter(start..end)
}

/// Emits a single value, then completes.
pub fn just<T: Clone + Send + Sync>(value: T) -> FromIter<[T; 1]> {
    from_iter([value])
}

impl<I> Publisher<I::Item> for FromIter<I>
where
    I: IntoIterator + Clone + Send + Sync,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<I::Item>>) {
        let subscription = Arc::new(IterSubscription {
            downstream: subscriber.clone(),
            iter: AtomicSlot::with(self.items.clone().into_iter()),
            lookahead: AtomicSlot::new(),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription.clone());
        subscription.drain();
    }
}

struct IterSubscription<I: Iterator> {
    downstream: Arc<dyn Subscriber<I::Item>>,
    /// Both slots are touched only by the drain owner.
    iter: AtomicSlot<I>,
    lookahead: AtomicSlot<I::Item>,
    demand: Demand,
    serializer: DrainSerializer,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl<I> IterSubscription<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    fn drain(&self) {
        self.serializer.drain(|| self.emit_available());
    }

    fn pull(&self) -> Option<I::Item> {
        let mut iter = self.iter.take()?;
        let item = iter.next();
        self.iter.put(iter);
        item
    }

    fn emit_available(&self) {
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.finished.load(Ordering::Acquire) {
                return;
            }

            let next = self.lookahead.take().or_else(|| self.pull());

            match next {
                Some(item) if self.demand.get() == 0 => {
                    self.lookahead.put(item);
                    return;
                }
                Some(item) => {
                    if self.downstream.try_on_next(item) == Offer::Delivered {
                        self.demand.produced(1);
                    }
                }
                None => {
                    self.finished.store(true, Ordering::Release);
                    self.downstream.on_complete();
                    return;
                }
            }
        }
    }
}

impl<I> Subscription for IterSubscription<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.demand.add(n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Completes immediately after the handshake.
pub struct Empty<T> {
    _marker: PhantomData<fn() -> T>,
}

pub fn empty<T>() -> Empty<T> {
    Empty {
        _marker: PhantomData,
    }
}

impl<T> Publisher<T> for Empty<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        complete_empty(subscriber);
    }
}

/// Fails every subscriber with a clone of the same error.
pub struct Fail<T> {
    error: FlowError,
    _marker: PhantomData<fn() -> T>,
}

pub fn fail<T>(error: FlowError) -> Fail<T> {
    Fail {
        error,
        _marker: PhantomData,
    }
}

impl<T> Publisher<T> for Fail<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        fail_empty(subscriber, self.error.clone());
    }
}

/// Builds a fresh publisher per subscriber.
///
/// A factory error is delivered to that subscriber as its terminal signal.
pub struct Defer<F> {
    factory: F,
}

pub fn defer<F, P>(factory: F) -> Defer<F>
where
    F: Fn() -> Result<P> + Send + Sync,
{
    Defer { factory }
}

impl<F, P, T> Publisher<T> for Defer<F>
where
    F: Fn() -> Result<P> + Send + Sync,
    P: Publisher<T>,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        match (self.factory)() {
            Ok(publisher) => publisher.subscribe(subscriber),
            Err(error) => fail_empty(subscriber, error),
        }
    }
}
