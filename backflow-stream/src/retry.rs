// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Conditional resubscription on error.
//!
//! When the upstream fails, the retry predicate decides whether to subscribe
//! to it again. The subscriber sees one continuous sequence: the handshake
//! happens once, and demand left over from a failed run carries over to the
//! next, so no item is lost or delivered beyond demand.
//!
//! A source that fails synchronously on every subscription is resubscribed in
//! a loop, never recursively, so a long run of immediate failures keeps a flat
//! call stack.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::{ScriptedPublisher, TestSubscriber};
//!
//! let source = ScriptedPublisher::failing_times(2, vec![1, 2, 3]);
//! let subscriber = TestSubscriber::<i32>::unbounded();
//! source.clone().retry(5).subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[1, 2, 3]);
//! subscriber.assert_complete();
//! assert_eq!(source.subscribe_count(), 3);
//! ```

use crate::logging::debug;
use backflow_core::{
    DrainSerializer, Flow, FlowError, Offer, Publisher, Result, Subscriber, Subscription,
    SubscriptionArbiter,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Decides whether a failed run is retried. An `Err` is a predicate fault.
pub type RetryPredicate = Arc<dyn Fn(&FlowError) -> Result<bool> + Send + Sync>;

type PredicateFactory = Arc<dyn Fn() -> RetryPredicate + Send + Sync>;

/// Extension trait providing the retry operators.
pub trait RetryExt<T>: Publisher<T> + Sized + 'static
where
    T: Send + 'static,
{
    /// Resubscribes to the upstream while `predicate` approves its errors.
    ///
    /// A rejected error is delivered as is. If the predicate itself fails, the
    /// subscriber receives a composite of the upstream error and the fault.
    fn retry_while<F>(self, predicate: F) -> Retry<T>
    where
        F: Fn(&FlowError) -> Result<bool> + Send + Sync + 'static;

    /// Resubscribes up to `times` times per subscriber.
    fn retry(self, times: u64) -> Retry<T>;
}

impl<P, T> RetryExt<T> for P
where
    P: Publisher<T> + 'static,
    T: Send + 'static,
{
    fn retry_while<F>(self, predicate: F) -> Retry<T>
    where
        F: Fn(&FlowError) -> Result<bool> + Send + Sync + 'static,
    {
        let predicate: RetryPredicate = Arc::new(predicate);
        Retry {
            source: Arc::new(self),
            predicate: Arc::new(move || predicate.clone()),
        }
    }

    fn retry(self, times: u64) -> Retry<T> {
        Retry {
            source: Arc::new(self),
            predicate: Arc::new(move || {
                let remaining = AtomicU64::new(times);
                Arc::new(move |_: &FlowError| {
                    Ok(remaining
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                            left.checked_sub(1)
                        })
                        .is_ok())
                })
            }),
        }
    }
}

/// Publisher returned by the [`RetryExt`] methods.
pub struct Retry<T> {
    source: Flow<T>,
    predicate: PredicateFactory,
}

impl<T: Send + 'static> Publisher<T> for Retry<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let retry = Arc::new_cyclic(|me| RetrySubscriber {
            me: me.clone(),
            downstream: subscriber,
            source: self.source.clone(),
            predicate: (self.predicate)(),
            arbiter: SubscriptionArbiter::new(),
            produced: AtomicU64::new(0),
            serializer: DrainSerializer::new(),
            handshake_done: AtomicBool::new(false),
            active: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        retry.resubscribe();
    }
}

struct RetrySubscriber<T> {
    me: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    source: Flow<T>,
    predicate: RetryPredicate,
    arbiter: SubscriptionArbiter,
    /// Items delivered by the current run, settled against the arbiter on resubscribe.
    produced: AtomicU64,
    serializer: DrainSerializer,
    handshake_done: AtomicBool,
    active: AtomicBool,
    done: AtomicBool,
}

impl<T: Send + 'static> RetrySubscriber<T> {
    fn resubscribe(&self) {
        self.active.store(false, Ordering::Release);
        self.serializer.drain(|| {
            if self.arbiter.is_cancelled() || self.done.load(Ordering::Acquire) {
                return;
            }
            if self.active.swap(true, Ordering::AcqRel) {
                return;
            }
            let produced = self.produced.swap(0, Ordering::AcqRel);
            if produced > 0 {
                self.arbiter.produced(produced);
            }
            if let Some(me) = self.me.upgrade() {
                self.source.subscribe(me);
            }
        });
    }

    fn terminate(&self, error: FlowError) {
        self.done.store(true, Ordering::Release);
        self.downstream.on_error(error);
    }
}

impl<T: Send + 'static> Subscriber<T> for RetrySubscriber<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        self.arbiter.set_subscription(subscription);
        if !self.handshake_done.swap(true, Ordering::AcqRel) {
            self.downstream.clone().on_subscribe(self.clone());
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        self.produced.fetch_add(1, Ordering::AcqRel);
        self.downstream.on_next(item);
    }

    fn try_on_next(&self, item: T) -> Offer {
        if self.done.load(Ordering::Acquire) {
            return Offer::Delivered;
        }
        let offer = self.downstream.try_on_next(item);
        if offer == Offer::Delivered {
            self.produced.fetch_add(1, Ordering::AcqRel);
        }
        offer
    }

    fn on_error(&self, error: FlowError) {
        if self.done.load(Ordering::Acquire) {
            debug!("error after termination dropped: {}", error);
            return;
        }
        match (self.predicate)(&error) {
            Ok(true) => {
                debug!("retrying after error: {}", error);
                self.resubscribe();
            }
            Ok(false) => self.terminate(error),
            Err(fault) => self.terminate(FlowError::composite(error, fault)),
        }
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Subscription for RetrySubscriber<T> {
    fn request(&self, n: u64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
    }
}
