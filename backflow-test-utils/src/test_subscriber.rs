// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use backflow_core::{FlowError, Subscriber, Subscription, UNBOUNDED};
use event_listener::Event;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A subscriber that records every signal it receives.
///
/// Demand is driven from the test: an initial request on subscribe, an
/// optional re-entrant request after each item, and explicit
/// [`request`](Self::request) calls.
///
/// ```rust
/// use backflow_test_utils::TestSubscriber;
/// use std::sync::Arc;
///
/// let subscriber = TestSubscriber::<i32>::new(0);
/// assert_eq!(subscriber.subscribe_count(), 0);
/// assert!(subscriber.values().is_empty());
/// ```
pub struct TestSubscriber<T> {
    initial_request: u64,
    request_per_item: u64,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    subscribes: AtomicUsize,
    items: Mutex<Vec<T>>,
    errors: Mutex<Vec<FlowError>>,
    completions: AtomicUsize,
    terminated: Event,
}

impl<T> TestSubscriber<T> {
    /// Requests `initial_request` items on subscribe (zero means none).
    pub fn new(initial_request: u64) -> Arc<Self> {
        Self::with_request_per_item(initial_request, 0)
    }

    /// Requests everything up front.
    pub fn unbounded() -> Arc<Self> {
        Self::new(UNBOUNDED)
    }

    /// Also requests `per_item` more from inside every `on_next`.
    pub fn with_request_per_item(initial_request: u64, per_item: u64) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            request_per_item: per_item,
            subscription: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
            items: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            terminated: Event::new(),
        })
    }

    pub fn request(&self, n: u64) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.request(n);
        }
    }

    pub fn cancel(&self) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    /// Removes and returns everything received so far.
    pub fn take_values(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn errors(&self) -> Vec<FlowError> {
        self.errors.lock().clone()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completions() > 0
    }

    pub fn is_terminated(&self) -> bool {
        self.completions() + self.errors.lock().len() > 0
    }

    /// Number of terminal signals received; anything but 0 or 1 is a bug.
    pub fn terminal_count(&self) -> usize {
        self.completions() + self.errors.lock().len()
    }

    /// Asserts exactly one completion and no error.
    ///
    /// # Panics
    ///
    /// Panics when the sequence did not complete cleanly.
    pub fn assert_complete(&self) {
        let errors = self.errors();
        assert!(errors.is_empty(), "expected no error, got {errors:?}");
        assert_eq!(self.completions(), 1, "expected exactly one completion");
    }

    /// Asserts exactly one error and no completion, returning the error.
    ///
    /// # Panics
    ///
    /// Panics when the sequence did not fail exactly once.
    pub fn assert_error(&self) -> FlowError {
        let errors = self.errors();
        assert_eq!(self.completions(), 0, "expected no completion");
        assert_eq!(errors.len(), 1, "expected exactly one error, got {errors:?}");
        errors[0].clone()
    }

    /// # Panics
    ///
    /// Panics when any terminal signal was received.
    pub fn assert_not_terminated(&self) {
        assert_eq!(self.terminal_count(), 0, "expected no terminal signal");
    }

    /// Waits until a terminal signal arrives or `timeout` elapses.
    pub async fn wait_terminated(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_terminated() {
                return true;
            }
            let listener = self.terminated.listen();
            if self.is_terminated() {
                return true;
            }
            if tokio::time::timeout_at(deadline, listener).await.is_err() {
                return self.is_terminated();
            }
        }
    }
}

impl<T: Clone> TestSubscriber<T> {
    pub fn values(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

impl<T: Clone + PartialEq + Debug> TestSubscriber<T> {
    /// # Panics
    ///
    /// Panics when the received items differ from `expected`.
    pub fn assert_values(&self, expected: &[T]) {
        assert_eq!(self.values(), expected);
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(self: Arc<Self>, subscription: Arc<dyn Subscription>) {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.subscription.lock() = Some(subscription.clone());
        if self.initial_request > 0 {
            subscription.request(self.initial_request);
        }
    }

    fn on_next(&self, item: T) {
        self.items.lock().push(item);
        if self.request_per_item > 0 {
            self.request(self.request_per_item);
        }
    }

    fn on_error(&self, error: FlowError) {
        self.errors.lock().push(error);
        self.terminated.notify(usize::MAX);
    }

    fn on_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.terminated.notify(usize::MAX);
    }
}
