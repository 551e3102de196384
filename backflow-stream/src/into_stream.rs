// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bridge from a [`Publisher`] to a [`futures::Stream`].
//!
//! The stream subscribes when it is created, keeps at most `prefetch` items
//! buffered and asks for more as the task consumes them. Errors surface as
//! [`StreamItem::Error`], after which the stream ends. Dropping the stream
//! cancels the subscription.
//!
//! ```
//! use backflow_stream::prelude::*;
//! use futures::StreamExt;
//!
//! # futures::executor::block_on(async {
//! let items: Vec<i64> = range(1, 4)
//!     .into_stream(2)
//!     .map(StreamItem::unwrap)
//!     .collect()
//!     .await;
//! assert_eq!(items, vec![1, 2, 3, 4]);
//! # });
//! ```

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::logging::debug;
use backflow_core::{
    AtomicSlot, FlowError, Publisher, StreamItem, Subscriber, Subscription, SubscriptionCell,
};
use concurrent_queue::ConcurrentQueue;
use futures::task::AtomicWaker;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Extension trait converting any publisher into an async stream.
pub trait IntoStreamExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Subscribes and returns a stream buffering up to `prefetch` items.
    ///
    /// # Panics
    ///
    /// Panics if `prefetch` is zero.
    fn into_stream(self, prefetch: usize) -> SubscriberStream<T>;

    /// [`into_stream`](Self::into_stream) with the default buffer size.
    fn to_stream(self) -> SubscriberStream<T> {
        self.into_stream(DEFAULT_BUFFER_SIZE)
    }
}

impl<P, T> IntoStreamExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn into_stream(self, prefetch: usize) -> SubscriberStream<T> {
        assert!(prefetch >= 1, "into_stream: prefetch must be at least 1");
        let shared = Arc::new(Shared {
            queue: ConcurrentQueue::bounded(prefetch),
            prefetch,
            limit: prefetch - prefetch / 4,
            consumed: AtomicUsize::new(0),
            error: AtomicSlot::new(),
            done: AtomicBool::new(false),
            waker: AtomicWaker::new(),
            upstream: SubscriptionCell::new(),
        });
        self.subscribe(shared.clone());
        SubscriberStream {
            shared,
            finished: false,
        }
    }
}

struct Shared<T> {
    queue: ConcurrentQueue<T>,
    prefetch: usize,
    limit: usize,
    consumed: AtomicUsize,
    error: AtomicSlot<FlowError>,
    done: AtomicBool,
    waker: AtomicWaker,
    upstream: SubscriptionCell,
}

impl<T: Send + 'static> Subscriber<T> for Shared<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if self.upstream.set_once(subscription) {
            self.upstream.request(self.prefetch as u64);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        if self.queue.push(item).is_err() {
            self.upstream.cancel();
            self.on_error(FlowError::protocol_violation(
                "publisher emitted more items than requested",
            ));
            return;
        }
        self.waker.wake();
    }

    fn on_error(&self, error: FlowError) {
        if self.done.load(Ordering::Acquire) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        self.error.put(error);
        self.done.store(true, Ordering::Release);
        self.waker.wake();
    }

    fn on_complete(&self) {
        self.done.store(true, Ordering::Release);
        self.waker.wake();
    }
}

/// Stream returned by [`IntoStreamExt::into_stream`].
pub struct SubscriberStream<T> {
    shared: Arc<Shared<T>>,
    finished: bool,
}

impl<T> SubscriberStream<T> {
    fn replenish(&self) {
        let shared = &self.shared;
        let consumed = shared.consumed.load(Ordering::Relaxed) + 1;
        if consumed == shared.limit {
            shared.consumed.store(0, Ordering::Relaxed);
            shared.upstream.request(shared.limit as u64);
        } else {
            shared.consumed.store(consumed, Ordering::Relaxed);
        }
    }
}

impl<T> Stream for SubscriberStream<T> {
    type Item = StreamItem<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            let done = this.shared.done.load(Ordering::Acquire);
            if let Ok(item) = this.shared.queue.pop() {
                this.replenish();
                return Poll::Ready(Some(StreamItem::Value(item)));
            }
            if done {
                this.finished = true;
                let error = this.shared.error.take();
                return Poll::Ready(error.map(StreamItem::Error));
            }
            this.shared.waker.register(cx.waker());
            if this.shared.queue.is_empty() && !this.shared.done.load(Ordering::Acquire) {
                return Poll::Pending;
            }
        }
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.upstream.cancel();
        }
    }
}
