// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use backflow_core::{FlowError, Offer, Publisher, Subscriber, Subscription};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Tracker {
    requested: AtomicU64,
    cancels: AtomicUsize,
    cancelled: AtomicBool,
}

impl Subscription for Tracker {
    fn request(&self, n: u64) {
        let _ = self
            .requested
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| {
                Some(r.saturating_add(n))
            });
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A hot publisher driven imperatively by the test.
///
/// The test pushes items with [`emit`](Self::emit) and observes the demand
/// and cancellation the operator under test sends back. Emission does not
/// check demand: tests use it to check how operators react to their own
/// requests.
///
/// ```rust
/// use backflow_core::Publisher;
/// use backflow_test_utils::{ManualPublisher, TestSubscriber};
///
/// let source = ManualPublisher::<i32>::new();
/// let subscriber = TestSubscriber::<i32>::new(2);
/// source.subscribe(subscriber.clone());
///
/// assert_eq!(source.requested(), 2);
/// source.emit(1);
/// source.complete();
/// assert_eq!(subscriber.values(), vec![1]);
/// ```
pub struct ManualPublisher<T> {
    downstream: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    tracker: Mutex<Arc<Tracker>>,
    subscriptions: AtomicUsize,
}

impl<T: Send + 'static> ManualPublisher<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            downstream: Mutex::new(None),
            tracker: Mutex::new(Arc::new(Tracker::default())),
            subscriptions: AtomicUsize::new(0),
        })
    }

    fn current(&self) -> Option<Arc<dyn Subscriber<T>>> {
        self.downstream.lock().clone()
    }

    /// Delivers `item` through plain `on_next`.
    pub fn emit(&self, item: T) {
        if let Some(downstream) = self.current() {
            downstream.on_next(item);
        }
    }

    /// Delivers `item` through the conditional path and reports the outcome.
    pub fn offer(&self, item: T) -> Option<Offer> {
        self.current().map(|downstream| downstream.try_on_next(item))
    }

    pub fn complete(&self) {
        if let Some(downstream) = self.current() {
            downstream.on_complete();
        }
    }

    pub fn error(&self, error: FlowError) {
        if let Some(downstream) = self.current() {
            downstream.on_error(error);
        }
    }

    /// Total demand requested by the current subscriber (saturating).
    pub fn requested(&self) -> u64 {
        self.tracker.lock().requested.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.lock().cancelled.load(Ordering::SeqCst)
    }

    /// How many times `cancel` reached the current subscription.
    pub fn cancel_count(&self) -> usize {
        self.tracker.lock().cancels.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn has_subscriber(&self) -> bool {
        self.downstream.lock().is_some()
    }
}

impl<T: Send + 'static> Publisher<T> for ManualPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let tracker = Arc::new(Tracker::default());
        *self.tracker.lock() = tracker.clone();
        *self.downstream.lock() = Some(subscriber.clone());
        subscriber.on_subscribe(tracker);
    }
}
