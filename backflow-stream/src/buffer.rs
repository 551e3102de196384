// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Predicate-driven buffering into `Vec` chunks.
//!
//! The buffer operators cut the upstream at the same boundaries as the
//! [`window`](crate::window) operators, but collect each segment into a `Vec`
//! and emit it once it is closed.
//!
//! | Operator | Boundary item goes to |
//! |----------|-----------------------|
//! | [`buffer_while`](BufferExt::buffer_while) | the next chunk (predicate `false` is the boundary) |
//! | [`buffer_until`](BufferExt::buffer_until) | the closing chunk |
//! | [`buffer_split`](BufferExt::buffer_split) | nowhere: it is dropped |
//!
//! With `buffer_split`, consecutive delimiters produce empty chunks. A trailing
//! non-empty chunk is emitted on completion, once the subscriber has demand for
//! it.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::TestSubscriber;
//!
//! let chunks = TestSubscriber::<Vec<i32>>::unbounded();
//! from_iter(vec![1, 2, 3, 4, 5])
//!     .buffer_split(|x: &i32| Ok(*x == 3))
//!     .subscribe(chunks.clone());
//!
//! chunks.assert_values(&[vec![1, 2], vec![4, 5]]);
//! chunks.assert_complete();
//! ```

use crate::boundary::{boundary, negated, Boundary, BoundaryMode};
use crate::config::BufferConfig;
use crate::logging::debug;
use backflow_core::{
    demand, AtomicSlot, DeferredTail, FlowError, Offer, Publisher, Result, Subscriber,
    Subscription, SubscriptionCell,
};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Extension trait providing the predicate-driven buffer operators.
pub trait BufferExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Collects items while `predicate` holds; a failing item starts the next chunk.
    fn buffer_while<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// Collects items up to and including one that satisfies `predicate`.
    fn buffer_until<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// Collects items between delimiters that satisfy `predicate`.
    fn buffer_split<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// General form, with `boundary` firing on the items that end a chunk.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    fn buffer_when<F>(self, boundary: F, mode: BoundaryMode, config: BufferConfig) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;
}

impl<P, T> BufferExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn buffer_while<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Buffer::new(self, negated(predicate), BoundaryMode::Before, BufferConfig::new())
    }

    fn buffer_until<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Buffer::new(self, boundary(predicate), BoundaryMode::After, BufferConfig::new())
    }

    fn buffer_split<F>(self, predicate: F) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Buffer::new(self, boundary(predicate), BoundaryMode::Split, BufferConfig::new())
    }

    fn buffer_when<F>(self, predicate: F, mode: BoundaryMode, config: BufferConfig) -> Buffer<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        if let Err(error) = config.validate() {
            panic!("buffer_when: {error}");
        }
        Buffer::new(self, boundary(predicate), mode, config)
    }
}

/// Publisher returned by the [`BufferExt`] methods.
pub struct Buffer<P, T> {
    source: P,
    boundary: Boundary<T>,
    mode: BoundaryMode,
    capacity_hint: usize,
}

impl<P, T> Buffer<P, T> {
    fn new(source: P, boundary: Boundary<T>, mode: BoundaryMode, config: BufferConfig) -> Self {
        Self {
            source,
            boundary,
            mode,
            capacity_hint: config.capacity_hint(),
        }
    }
}

impl<P, T> Publisher<Vec<T>> for Buffer<P, T>
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Vec<T>>>) {
        let engine = Arc::new(BufferEngine {
            downstream: subscriber,
            boundary: self.boundary.clone(),
            mode: self.mode,
            capacity_hint: self.capacity_hint,
            upstream: SubscriptionCell::new(),
            chunk: AtomicSlot::new(),
            done: AtomicBool::new(false),
            tail: DeferredTail::new(),
        });
        self.source.subscribe(engine);
    }
}

struct BufferEngine<T> {
    downstream: Arc<dyn Subscriber<Vec<T>>>,
    boundary: Boundary<T>,
    mode: BoundaryMode,
    capacity_hint: usize,
    upstream: SubscriptionCell,
    /// Chunk being filled; empty until the first item arrives.
    chunk: AtomicSlot<Vec<T>>,
    done: AtomicBool,
    tail: DeferredTail<Vec<T>>,
}

impl<T: Send + 'static> BufferEngine<T> {
    fn fresh_chunk(&self) -> Vec<T> {
        Vec::with_capacity(self.capacity_hint)
    }

    fn offer(&self, item: T) -> Offer {
        if self.done.load(Ordering::Acquire) {
            debug!("item after termination dropped");
            return Offer::Delivered;
        }

        let is_boundary = match (self.boundary)(&item) {
            Ok(is_boundary) => is_boundary,
            Err(error) => {
                self.fail(error, true);
                return Offer::Delivered;
            }
        };

        let mut chunk = self.chunk.take().unwrap_or_else(|| self.fresh_chunk());
        let ready = match (self.mode, is_boundary) {
            (_, false) => {
                chunk.push(item);
                None
            }
            (BoundaryMode::Before, true) if chunk.is_empty() => {
                chunk.push(item);
                None
            }
            (BoundaryMode::Before, true) => {
                let mut next = self.fresh_chunk();
                next.push(item);
                Some(mem::replace(&mut chunk, next))
            }
            (BoundaryMode::After, true) => {
                chunk.push(item);
                Some(mem::replace(&mut chunk, self.fresh_chunk()))
            }
            (BoundaryMode::Split, true) => Some(mem::replace(&mut chunk, self.fresh_chunk())),
        };
        self.chunk.put(chunk);

        match ready {
            Some(chunk) => {
                let offer = self.downstream.try_on_next(chunk);
                if offer == Offer::Delivered {
                    self.tail.produced(1);
                }
                offer
            }
            None => Offer::Filtered,
        }
    }

    fn fail(&self, error: FlowError, cancel_upstream: bool) {
        if self.done.swap(true, Ordering::AcqRel) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        if cancel_upstream {
            self.upstream.cancel();
        }
        self.tail.cancel();
        self.chunk.clear();
        self.downstream.on_error(error);
    }

    fn finish(&self, last: Option<Vec<T>>) {
        if let Some(chunk) = last {
            self.downstream.on_next(chunk);
        }
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Subscriber<T> for BufferEngine<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.downstream.clone().on_subscribe(self.clone());
        }
    }

    fn on_next(&self, item: T) {
        if self.offer(item) == Offer::Filtered {
            self.upstream.request(1);
        }
    }

    fn try_on_next(&self, item: T) -> Offer {
        self.offer(item)
    }

    fn on_error(&self, error: FlowError) {
        self.fail(error, false);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let last = self.chunk.take().filter(|chunk| !chunk.is_empty());
        self.tail.complete(last, |last| self.finish(last));
    }
}

impl<T: Send + 'static> Subscription for BufferEngine<T> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.tail.request(n, |last| self.finish(last));
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.tail.cancel();
        self.upstream.cancel();
    }
}
