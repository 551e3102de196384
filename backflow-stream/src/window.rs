// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Predicate-driven windowing.
//!
//! A window operator splits its upstream into a sequence of [`Segment`]s, each
//! a publisher of its own. A new segment is emitted when an item arrives and no
//! segment is open; the open segment closes when the boundary test fires.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::TestSubscriber;
//!
//! let windows = TestSubscriber::<Segment<i32>>::unbounded();
//! from_iter(vec![1, 2, 3, 4, 5])
//!     .window_until(|x: &i32| Ok(*x == 3))
//!     .subscribe(windows.clone());
//!
//! let mut contents = Vec::new();
//! for segment in windows.take_values() {
//!     let items = TestSubscriber::<i32>::unbounded();
//!     segment.subscribe(items.clone());
//!     contents.push(items.take_values());
//! }
//! assert_eq!(contents, vec![vec![1, 2, 3], vec![4, 5]]);
//! ```
//!
//! # Demand
//!
//! Outer demand counts segments and goes straight upstream. An item that does
//! not open a segment consumes no outer demand: it is reported as
//! [`Offer::Filtered`] to producers that understand the conditional path, and
//! replenished with `request(1)` otherwise. Each segment buffers what its own
//! subscriber has not requested yet.
//!
//! # Cancellation
//!
//! Cancelling the outer subscription does not cut off segments already handed
//! out. The upstream is cancelled once the outer link and every emitted
//! segment have terminated or been cancelled.

use crate::boundary::{boundary, negated, Boundary, BoundaryMode};
use crate::config::WindowConfig;
use crate::logging::{debug, trace};
use crate::unicast_processor::{Segment, UnicastProcessor};
use backflow_core::{
    demand, AtomicSlot, DeferredTail, FlowError, Offer, Publisher, Result, Subscriber,
    Subscription, SubscriptionCell,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Extension trait providing the predicate-driven window operators.
pub trait WindowExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Opens a new segment whenever `predicate` returns `false`.
    ///
    /// The item that fails the predicate starts the next segment.
    fn window_while<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// Closes the open segment after an item that satisfies `predicate`.
    fn window_until<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// Closes the open segment on an item that satisfies `predicate`, dropping that item.
    fn window_split<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;

    /// General form: `boundary` fires on the items that end a segment, and
    /// `mode` decides where those items go.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    fn window_when<F>(self, boundary: F, mode: BoundaryMode, config: WindowConfig) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static;
}

impl<P, T> WindowExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn window_while<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Window::new(self, negated(predicate), BoundaryMode::Before, WindowConfig::new())
    }

    fn window_until<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Window::new(self, boundary(predicate), BoundaryMode::After, WindowConfig::new())
    }

    fn window_split<F>(self, predicate: F) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Window::new(self, boundary(predicate), BoundaryMode::Split, WindowConfig::new())
    }

    fn window_when<F>(self, predicate: F, mode: BoundaryMode, config: WindowConfig) -> Window<Self, T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        if let Err(error) = config.validate() {
            panic!("window_when: {error}");
        }
        Window::new(self, boundary(predicate), mode, config)
    }
}

/// Publisher returned by the [`WindowExt`] methods.
pub struct Window<P, T> {
    source: P,
    boundary: Boundary<T>,
    mode: BoundaryMode,
    config: WindowConfig,
}

impl<P, T> Window<P, T> {
    fn new(source: P, boundary: Boundary<T>, mode: BoundaryMode, config: WindowConfig) -> Self {
        Self {
            source,
            boundary,
            mode,
            config,
        }
    }
}

impl<P, T> Publisher<Segment<T>> for Window<P, T>
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Segment<T>>>) {
        let engine = Arc::new_cyclic(|me| WindowEngine {
            me: me.clone(),
            downstream: subscriber,
            boundary: self.boundary.clone(),
            mode: self.mode,
            buffer_size: self.config.buffer_size(),
            upstream: SubscriptionCell::new(),
            current: AtomicSlot::new(),
            pending: AtomicSlot::new(),
            refs: AtomicUsize::new(1),
            outer_cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            tail: DeferredTail::new(),
        });
        self.source.subscribe(engine);
    }
}

struct WindowEngine<T> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<Segment<T>>>,
    boundary: Boundary<T>,
    mode: BoundaryMode,
    buffer_size: usize,
    upstream: SubscriptionCell,
    /// Open segment, if any.
    current: AtomicSlot<Arc<UnicastProcessor<T>>>,
    /// BEFORE-mode boundary item held back for the next segment.
    pending: AtomicSlot<T>,
    /// Outer link plus every emitted, unterminated segment.
    refs: AtomicUsize,
    outer_cancelled: AtomicBool,
    done: AtomicBool,
    /// Carries the look-ahead item left over on completion.
    tail: DeferredTail<T>,
}

impl<T: Send + 'static> WindowEngine<T> {
    fn open_segment(&self) -> Arc<UnicastProcessor<T>> {
        self.refs.fetch_add(1, Ordering::AcqRel);
        let me = self.me.clone();
        let segment = UnicastProcessor::with_on_terminate(self.buffer_size, move || {
            if let Some(engine) = me.upgrade() {
                engine.release();
            }
        });
        trace!("window segment opened");
        self.downstream.on_next(segment.segment());
        segment
    }

    fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("last window reference released, cancelling upstream");
            self.upstream.cancel();
        }
    }

    fn offer(&self, item: T) -> Offer {
        if self.done.load(Ordering::Acquire) {
            debug!("item after termination dropped");
            return Offer::Delivered;
        }

        let open = self.current.take();
        let pending = self.pending.take();

        let mut emitted = false;
        let mut fresh = false;
        let segment = match open {
            Some(segment) => segment,
            None => {
                if self.outer_cancelled.load(Ordering::Acquire) {
                    return Offer::Delivered;
                }
                emitted = true;
                self.tail.produced(1);
                let segment = self.open_segment();
                match pending {
                    Some(pending) => segment.emit(pending),
                    None => fresh = true,
                }
                segment
            }
        };

        let is_boundary = match (self.boundary)(&item) {
            Ok(is_boundary) => is_boundary,
            Err(error) => {
                self.fail_on_predicate(&segment, error);
                return Offer::Delivered;
            }
        };

        // A fresh, empty segment never closes on its opening item in BEFORE mode.
        if !is_boundary || (self.mode == BoundaryMode::Before && fresh) {
            segment.emit(item);
            self.current.put(segment);
        } else {
            match self.mode {
                BoundaryMode::After => {
                    segment.emit(item);
                    segment.complete();
                }
                BoundaryMode::Before => {
                    segment.complete();
                    self.pending.put(item);
                }
                BoundaryMode::Split => segment.complete(),
            }
        }

        if emitted {
            Offer::Delivered
        } else {
            Offer::Filtered
        }
    }

    fn fail_on_predicate(&self, segment: &UnicastProcessor<T>, error: FlowError) {
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
        self.tail.cancel();
        segment.error(error.clone());
        self.downstream.on_error(error);
    }

    fn finish(&self, last: Option<T>) {
        if let Some(item) = last {
            let segment = self.open_segment();
            segment.emit(item);
            segment.complete();
        }
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Subscriber<T> for WindowEngine<T> {
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
        if self.done.swap(true, Ordering::AcqRel) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        self.tail.cancel();
        self.pending.clear();
        if let Some(segment) = self.current.take() {
            segment.error(error.clone());
        }
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = self.pending.take();
        if let Some(segment) = self.current.take() {
            segment.complete();
        }
        self.tail.complete(pending, |last| self.finish(last));
    }
}

impl<T: Send + 'static> Subscription for WindowEngine<T> {
    fn request(&self, n: u64) {
        if !demand::validate(n) {
            return;
        }
        self.tail.request(n, |last| self.finish(last));
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if self.outer_cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tail.cancel();
        self.release();
    }
}
