// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Enforcement of the protocol rules against an untrusted producer.

use crate::demand::{validate, Demand};
use crate::logging::{debug, warn};
use crate::protocol::{EmptySubscription, Offer, Subscriber, Subscription};
use crate::subscription_cell::SubscriptionCell;
use backflow_error::FlowError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sits between a producer that may break the protocol and a consumer that
/// relies on it.
///
/// - A second `on_subscribe` is answered by cancelling the extra handle.
/// - Items beyond the requested demand are dropped.
/// - Signals after a terminal signal or after `cancel` are dropped.
///
/// Dropped signals are logged, never forwarded.
pub struct ProtocolGuard<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: SubscriptionCell,
    demand: Demand,
    handshake_done: AtomicBool,
    stopped: AtomicBool,
}

impl<T> ProtocolGuard<T> {
    #[must_use]
    pub fn new(downstream: Arc<dyn Subscriber<T>>) -> Arc<Self> {
        Arc::new(Self {
            downstream,
            upstream: SubscriptionCell::new(),
            demand: Demand::new(),
            handshake_done: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Reserves one unit of demand for an incoming item, or explains why not.
    fn admit(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            debug!("item after terminal signal or cancel dropped");
            return false;
        }
        if !self.demand.try_consume() {
            warn!("item beyond requested demand dropped");
            return false;
        }
        true
    }

    fn terminate(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("terminal signal after terminal signal or cancel dropped");
            return false;
        }
        if !self.handshake_done.swap(true, Ordering::AcqRel) {
            self.downstream
                .clone()
                .on_subscribe(Arc::new(EmptySubscription));
        }
        true
    }
}

impl<T: Send + 'static> Subscriber<T> for ProtocolGuard<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set_once(subscription) {
            return;
        }
        if self.handshake_done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.downstream.clone().on_subscribe(self);
    }

    fn on_next(&self, item: T) {
        if self.admit() {
            self.downstream.on_next(item);
        }
    }

    fn try_on_next(&self, item: T) -> Offer {
        // A dropped item still counts against the producer so it stops emitting.
        if !self.admit() {
            return Offer::Delivered;
        }
        let offer = self.downstream.try_on_next(item);
        if offer == Offer::Filtered {
            self.demand.add(1);
        }
        offer
    }

    fn on_error(&self, error: FlowError) {
        if self.terminate() {
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if self.terminate() {
            self.downstream.on_complete();
        }
    }
}

impl<T: Send + 'static> Subscription for ProtocolGuard<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.demand.add(n);
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.stopped.store(true, Ordering::Release);
        self.upstream.cancel();
    }
}
