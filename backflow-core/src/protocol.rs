// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The push-based backpressure protocol.
//!
//! A [`Publisher`] is subscribed with a [`Subscriber`]. The subscriber first
//! receives exactly one [`Subscription`] through
//! [`on_subscribe`](Subscriber::on_subscribe), then at most as many items as it
//! has [`request`](Subscription::request)ed, then at most one terminal signal
//! ([`on_error`](Subscriber::on_error) xor
//! [`on_complete`](Subscriber::on_complete)).
//!
//! Control signals (`request`, `cancel`) travel upstream, data and terminal
//! signals travel downstream. Signals from a single producer are serial, but
//! `request` and `cancel` may arrive concurrently from any thread and even
//! re-entrantly from inside `on_next`.
//!
//! # Example
//!
//! ```
//! use backflow_core::{AtomicSlot, FlowError, Publisher, Subscriber, Subscription};
//! use std::sync::Arc;
//!
//! struct Single(i32);
//!
//! struct SingleSubscription {
//!     value: AtomicSlot<i32>,
//!     downstream: Arc<dyn Subscriber<i32>>,
//! }
//!
//! impl Subscription for SingleSubscription {
//!     fn request(&self, _n: u64) {
//!         if let Some(value) = self.value.take() {
//!             self.downstream.on_next(value);
//!             self.downstream.on_complete();
//!         }
//!     }
//!
//!     fn cancel(&self) {
//!         self.value.clear();
//!     }
//! }
//!
//! impl Publisher<i32> for Single {
//!     fn subscribe(&self, subscriber: Arc<dyn Subscriber<i32>>) {
//!         let subscription = Arc::new(SingleSubscription {
//!             value: AtomicSlot::with(self.0),
//!             downstream: subscriber.clone(),
//!         });
//!         subscriber.on_subscribe(subscription);
//!     }
//! }
//!
//! struct Printer;
//!
//! impl Subscriber<i32> for Printer {
//!     fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
//!         subscription.request(1);
//!     }
//!     fn on_next(&self, item: i32) {
//!         assert_eq!(item, 7);
//!     }
//!     fn on_error(&self, _error: FlowError) {}
//!     fn on_complete(&self) {}
//! }
//!
//! Single(7).subscribe(Arc::new(Printer));
//! ```

use backflow_error::FlowError;
use std::sync::Arc;

/// Outcome of a conditional delivery through [`Subscriber::try_on_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The item consumed one unit of demand.
    Delivered,
    /// The item was absorbed without consuming demand; the producer may emit
    /// another item without waiting for a new request.
    Filtered,
}

impl Offer {
    /// Returns `true` if the offer consumed a unit of demand.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Handle shared between a producer and its consumer.
///
/// Both methods must be thread-safe and may be called re-entrantly from within
/// the consumer's own callbacks. `cancel` is idempotent.
pub trait Subscription: Send + Sync {
    /// Grants `n` more items of demand. `u64::MAX` means unbounded.
    ///
    /// Requesting zero items is protocol misuse and is ignored.
    fn request(&self, n: u64);

    /// Stops the producer. Signals already in flight may still arrive.
    fn cancel(&self);
}

/// Consumer side of the protocol.
pub trait Subscriber<T>: Send + Sync {
    /// Receives the subscription handle. Called exactly once, before any other signal.
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>);

    /// Receives the next item. Never called beyond the requested demand.
    fn on_next(&self, item: T);

    /// Conditional fast path: offers an item and reports whether it consumed demand.
    ///
    /// Producers that understand [`Offer::Filtered`] call this instead of
    /// [`on_next`](Self::on_next) and do not count filtered items against the
    /// outstanding demand. The default implementation delivers the item.
    fn try_on_next(&self, item: T) -> Offer {
        self.on_next(item);
        Offer::Delivered
    }

    /// Terminates the sequence with an error.
    fn on_error(&self, error: FlowError);

    /// Terminates the sequence normally.
    fn on_complete(&self);
}

/// Producer side of the protocol.
pub trait Publisher<T>: Send + Sync {
    /// Attaches a subscriber. Each call starts an independent run of the sequence.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// A type-erased, shareable publisher.
pub type Flow<T> = Arc<dyn Publisher<T>>;

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        (**self).subscribe(subscriber);
    }
}

/// A subscription that ignores every signal.
///
/// Handed to subscribers of sequences that terminate without ever emitting,
/// so the handshake still happens exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

/// Completes `subscriber` immediately after the handshake.
pub fn complete_empty<T>(subscriber: Arc<dyn Subscriber<T>>) {
    subscriber.clone().on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_complete();
}

/// Fails `subscriber` immediately after the handshake.
pub fn fail_empty<T>(subscriber: Arc<dyn Subscriber<T>>, error: FlowError) {
    subscriber.clone().on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_error(error);
}
