// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Smallest or largest item of a finite sequence.
//!
//! The whole upstream is consumed without backpressure; the result is emitted
//! once the upstream completes and the subscriber has requested it. Among
//! equal items the first one wins. An empty upstream completes without a
//! value.

use crate::logging::debug;
use backflow_core::{
    demand, AtomicSlot, DeferredTail, FlowError, Publisher, Subscriber, Subscription,
    SubscriptionCell, UNBOUNDED,
};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Comparator<T> = Arc<dyn Fn(&T, &T) -> CmpOrdering + Send + Sync>;

/// Extension trait providing the min/max aggregations.
pub trait MinMaxExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    fn min(self) -> MinMax<Self, T>
    where
        T: Ord;

    fn max(self) -> MinMax<Self, T>
    where
        T: Ord;

    fn min_by<F>(self, compare: F) -> MinMax<Self, T>
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static;

    fn max_by<F>(self, compare: F) -> MinMax<Self, T>
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static;
}

impl<P, T> MinMaxExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn min(self) -> MinMax<Self, T>
    where
        T: Ord,
    {
        MinMax::new(self, Arc::new(T::cmp), Extremum::Min)
    }

    fn max(self) -> MinMax<Self, T>
    where
        T: Ord,
    {
        MinMax::new(self, Arc::new(T::cmp), Extremum::Max)
    }

    fn min_by<F>(self, compare: F) -> MinMax<Self, T>
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
    {
        MinMax::new(self, Arc::new(compare), Extremum::Min)
    }

    fn max_by<F>(self, compare: F) -> MinMax<Self, T>
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
    {
        MinMax::new(self, Arc::new(compare), Extremum::Max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    Min,
    Max,
}

impl Extremum {
    /// The ordering of `current` against a candidate that makes the candidate win.
    const fn replaced_when(self) -> CmpOrdering {
        match self {
            Self::Min => CmpOrdering::Greater,
            Self::Max => CmpOrdering::Less,
        }
    }
}

/// Publisher returned by the [`MinMaxExt`] methods.
pub struct MinMax<P, T> {
    source: P,
    compare: Comparator<T>,
    extremum: Extremum,
}

impl<P, T> MinMax<P, T> {
    fn new(source: P, compare: Comparator<T>, extremum: Extremum) -> Self {
        Self {
            source,
            compare,
            extremum,
        }
    }
}

impl<P, T> Publisher<T> for MinMax<P, T>
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(MinMaxSubscriber {
            downstream: subscriber,
            compare: self.compare.clone(),
            extremum: self.extremum,
            upstream: SubscriptionCell::new(),
            current: AtomicSlot::new(),
            done: AtomicBool::new(false),
            tail: DeferredTail::new(),
        }));
    }
}

struct MinMaxSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    compare: Comparator<T>,
    extremum: Extremum,
    upstream: SubscriptionCell,
    current: AtomicSlot<T>,
    done: AtomicBool,
    tail: DeferredTail<T>,
}

impl<T: Send + 'static> MinMaxSubscriber<T> {
    fn finish(&self, result: Option<T>) {
        if let Some(result) = result {
            self.downstream.on_next(result);
        }
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Subscriber<T> for MinMaxSubscriber<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.downstream.clone().on_subscribe(self.clone());
            self.upstream.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let kept = match self.current.take() {
            Some(held) if (self.compare)(&held, &item) != self.extremum.replaced_when() => held,
            _ => item,
        };
        self.current.put(kept);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        self.tail.cancel();
        self.current.clear();
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let result = self.current.take();
        self.tail.complete(result, |result| self.finish(result));
    }
}

impl<T: Send + 'static> Subscription for MinMaxSubscriber<T> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.tail.request(n, |result| self.finish(result));
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.tail.cancel();
        self.upstream.cancel();
    }
}
