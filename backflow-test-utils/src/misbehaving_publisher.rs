// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use backflow_core::{FlowError, Publisher, Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FlagOnCancel {
    cancelled: AtomicBool,
}

impl Subscription for FlagOnCancel {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A publisher that breaks every rule of the protocol.
///
/// On subscribe it hands out two subscriptions, pushes all items without
/// waiting for demand, completes, then keeps signalling: one more item and
/// an error.
pub struct MisbehavingPublisher<T> {
    items: Vec<T>,
    second_handle: Arc<FlagOnCancel>,
}

impl<T: Clone + Send + Sync + 'static> MisbehavingPublisher<T> {
    pub fn new(items: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            items,
            second_handle: Arc::new(FlagOnCancel::default()),
        })
    }

    /// Returns `true` if the duplicate subscription was cancelled by the consumer.
    pub fn duplicate_cancelled(&self) -> bool {
        self.second_handle.cancelled.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for MisbehavingPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber
            .clone()
            .on_subscribe(Arc::new(FlagOnCancel::default()));
        subscriber.clone().on_subscribe(self.second_handle.clone());

        for item in &self.items {
            subscriber.on_next(item.clone());
        }
        subscriber.on_complete();

        if let Some(first) = self.items.first() {
            subscriber.on_next(first.clone());
        }
        subscriber.on_error(FlowError::stream_error("signal after completion"));
    }
}
