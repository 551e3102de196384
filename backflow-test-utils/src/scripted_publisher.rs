// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Cold publishers that replay a different script on every subscription.
//!
//! Useful for retry tests: the first runs emit a few items and fail, a later
//! run completes.

use backflow_core::{
    Demand, DrainSerializer, FlowError, Offer, Publisher, Subscriber, Subscription,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// How a scripted run ends once its items are drained.
#[derive(Debug, Clone)]
pub enum Ending {
    Complete,
    Error(FlowError),
    /// Never terminates; the run stays open until cancelled.
    Never,
}

/// Items emitted by one subscription, followed by its ending.
#[derive(Debug, Clone)]
pub struct Script<T> {
    pub items: Vec<T>,
    pub ending: Ending,
}

impl<T> Script<T> {
    pub fn completing(items: Vec<T>) -> Self {
        Self {
            items,
            ending: Ending::Complete,
        }
    }

    pub fn failing(items: Vec<T>, error: FlowError) -> Self {
        Self {
            items,
            ending: Ending::Error(error),
        }
    }

    pub fn open(items: Vec<T>) -> Self {
        Self {
            items,
            ending: Ending::Never,
        }
    }
}

/// Replays `scripts[k]` on the k-th subscription; the last script repeats.
///
/// Emission is synchronous and demand-driven: items go out from inside
/// `request`, so a failure on resubscribe happens on the caller's stack.
pub struct ScriptedPublisher<T> {
    scripts: Vec<Script<T>>,
    subscriptions: AtomicUsize,
    cancellations: Arc<AtomicUsize>,
}

impl<T: Clone + Send + Sync + 'static> ScriptedPublisher<T> {
    /// # Panics
    ///
    /// Panics if `scripts` is empty.
    pub fn new(scripts: Vec<Script<T>>) -> Arc<Self> {
        assert!(!scripts.is_empty(), "at least one script required");
        Arc::new(Self {
            scripts,
            subscriptions: AtomicUsize::new(0),
            cancellations: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Fails `failures` times without emitting, then emits `items` and completes.
    pub fn failing_times(failures: usize, items: Vec<T>) -> Arc<Self> {
        let mut scripts: Vec<Script<T>> = (0..failures)
            .map(|attempt| {
                Script::failing(
                    Vec::new(),
                    FlowError::stream_error(format!("attempt {attempt} failed")),
                )
            })
            .collect();
        scripts.push(Script::completing(items));
        Self::new(scripts)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for ScriptedPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let attempt = self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let script = &self.scripts[attempt.min(self.scripts.len() - 1)];
        let run = Arc::new(ScriptRun {
            downstream: subscriber.clone(),
            items: Mutex::new(script.items.iter().cloned().collect()),
            ending: Mutex::new(Some(script.ending.clone())),
            demand: Demand::new(),
            serializer: DrainSerializer::new(),
            cancelled: AtomicBool::new(false),
            cancellations: self.cancellations.clone(),
        });
        subscriber.on_subscribe(run.clone());
        run.drain();
    }
}

struct ScriptRun<T> {
    downstream: Arc<dyn Subscriber<T>>,
    items: Mutex<VecDeque<T>>,
    ending: Mutex<Option<Ending>>,
    demand: Demand,
    serializer: DrainSerializer,
    cancelled: AtomicBool,
    cancellations: Arc<AtomicUsize>,
}

impl<T: Send + 'static> ScriptRun<T> {
    fn drain(&self) {
        self.serializer.drain(|| loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            let exhausted = self.items.lock().is_empty();
            if exhausted {
                let ending = self.ending.lock().take();
                match ending {
                    Some(Ending::Complete) => self.downstream.on_complete(),
                    Some(Ending::Error(error)) => self.downstream.on_error(error),
                    Some(Ending::Never) | None => {}
                }
                return;
            }
            if self.demand.get() == 0 {
                return;
            }
            let Some(item) = self.items.lock().pop_front() else {
                return;
            };
            if self.downstream.try_on_next(item) == Offer::Delivered {
                self.demand.produced(1);
            }
        });
    }
}

impl<T: Send + 'static> Subscription for ScriptRun<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.demand.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
        }
    }
}
